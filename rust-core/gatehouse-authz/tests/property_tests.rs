// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for permission resolution

use std::collections::BTreeSet;
use std::sync::Arc;

use gatehouse_authz::{satisfies, AuthorizationContext, Principal, Resolver, Role, RoleRegistry, ADMIN};
use gatehouse_storage::{DocumentStore, InMemoryBackend, KvDocumentStore};
use proptest::prelude::*;

/// Generate arbitrary permission tokens (never `admin`)
fn arb_token() -> impl Strategy<Value = String> {
    ("(read|create|update|delete)", "[a-z]{3,8}").prop_map(|(action, entity)| format!("{}:{}", action, entity))
}

fn arb_tokens(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_token(), 0..max)
}

fn context(roles: Vec<Role>) -> AuthorizationContext {
    AuthorizationContext::new(Some(Principal::new("p", roles.clone())), roles)
}

proptest! {
    #[test]
    fn test_satisfies_is_monotonic(
        held in arb_tokens(8),
        extra in arb_tokens(8),
        required in arb_tokens(4)
    ) {
        let held: BTreeSet<String> = held.into_iter().collect();
        let mut grown = held.clone();
        grown.extend(extra);

        if satisfies(&held, &required) {
            prop_assert!(satisfies(&grown, &required));
        }
    }

    #[test]
    fn test_adding_roles_never_revokes(
        base in arb_tokens(6),
        extra in arb_tokens(6),
        required in arb_tokens(4)
    ) {
        let before = context(vec![Role::global("r1", "base", base.clone())]);
        let after = context(vec![
            Role::global("r1", "base", base),
            Role::global("r2", "extra", extra),
        ]);

        if before.allowed(&required) {
            prop_assert!(after.allowed(&required));
        }
    }

    #[test]
    fn test_admin_satisfies_every_requirement(
        others in arb_tokens(4),
        required in arb_tokens(6)
    ) {
        let mut tokens = others;
        tokens.push(ADMIN.to_string());
        let ctx = context(vec![Role::global("root", "root", tokens)]);
        prop_assert!(ctx.allowed(&required));
    }

    #[test]
    fn test_own_grant_never_authorizes_changes_to_itself(
        grant in arb_tokens(6),
        changed in arb_tokens(4)
    ) {
        // One role only: every token the guard could rely on comes from it.
        let ctx = context(vec![Role::global("r", "only", grant)]);
        prop_assert_eq!(ctx.has_permission(&changed, Some("r")), changed.is_empty());
    }

    #[test]
    fn test_independent_grant_authorizes_changes(
        grant in arb_tokens(6),
        changed in arb_tokens(4)
    ) {
        let ctx = context(vec![
            Role::global("r", "edited", grant),
            Role::global("s", "other", changed.clone()),
        ]);
        prop_assert!(ctx.has_permission(&changed, Some("r")));
    }

    #[test]
    fn test_scoped_role_only_applies_to_its_resource(
        token in arb_token(),
        resource in "[a-z0-9]{6}",
        other in "[a-z0-9]{7}"
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store: Arc<dyn DocumentStore> = Arc::new(KvDocumentStore::new(InMemoryBackend::new()));
            let registry = RoleRegistry::new(store);
            let role = registry.create("scoped", Some(resource.as_str()), [token.clone()]).await.unwrap();
            let principal = Principal::new("u", vec![role]);
            let resolver = Resolver::new(registry);

            let on_resource = resolver.resolve(Some(&principal), Some(resource.as_str())).await.unwrap();
            let elsewhere = resolver.resolve(Some(&principal), Some(other.as_str())).await.unwrap();

            prop_assert!(on_resource.allowed(&[token.as_str()]));
            prop_assert!(!elsewhere.allowed(&[token.as_str()]));

            Ok(())
        })?;
    }
}
