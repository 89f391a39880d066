// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for output projection

use gatehouse_authz::{AuthorizationContext, Principal, Role};
use gatehouse_engine::{builtin, ModelRegistry, Projector};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

const TOKENS: [&str; 5] = ["admin", "read:role", "read:user", "read:record", "update:role"];

/// Generate a context holding an arbitrary subset of the known tokens
fn arb_context() -> impl Strategy<Value = AuthorizationContext> {
    prop_oneof![
        Just(AuthorizationContext::anonymous()),
        prop::sample::subsequence(TOKENS.to_vec(), 0..TOKENS.len()).prop_map(|tokens| {
            let roles = vec![Role::global("r", "r", tokens)];
            AuthorizationContext::new(Some(Principal::new("p", roles.clone())), roles)
        }),
    ]
}

/// Generate a populated record document with arbitrary extra fields
fn arb_record() -> impl Strategy<Value = Map<String, Value>> {
    (
        "[a-f0-9]{8}",
        prop::collection::vec("[a-z]{3,6}", 0..3),
        prop::collection::btree_map("[a-z]{4,8}", "[a-z0-9]{0,6}", 0..4),
    )
        .prop_map(|(id, role_names, extra)| {
            let roles: Vec<Value> = role_names
                .iter()
                .enumerate()
                .map(|(i, name)| json!({"_id": format!("r{}", i), "name": name, "permissions": [], "secret": 1}))
                .collect();
            let mut record = json!({
                "_id": id,
                "createdAt": 0,
                "creator": {"_id": "u1", "roles": roles, "password": "x"},
                "content": "c1",
                "model": "role",
                "action": "POST",
                "value": "{}",
                "reason": ""
            })
            .as_object()
            .cloned()
            .unwrap();
            for (key, value) in extra {
                record.entry(key).or_insert(Value::String(value));
            }
            record
        })
}

proptest! {
    #[test]
    fn test_projection_is_idempotent(ctx in arb_context(), record in arb_record()) {
        let models = builtin::register(ModelRegistry::builder()).build().unwrap();
        let projector = Projector::new(&models);
        let descriptor = models.get("record").unwrap();

        let once = projector.project(&record, descriptor, &ctx);
        let twice = projector.project(&once, descriptor, &ctx);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_projection_never_emits_undeclared_fields(ctx in arb_context(), record in arb_record()) {
        let models = builtin::register(ModelRegistry::builder()).build().unwrap();
        let projector = Projector::new(&models);
        let descriptor = models.get("record").unwrap();

        let out = projector.project(&record, descriptor, &ctx);
        for key in out.keys() {
            prop_assert!(descriptor.visibility.iter().any(|(field, _)| field == key));
        }
        let creator = &out["creator"];
        prop_assert!(creator.get("password").is_none());
        if let Some(roles) = creator.get("roles").and_then(Value::as_array) {
            for role in roles {
                prop_assert!(role.get("secret").is_none());
            }
        }
    }

    #[test]
    fn test_more_permissions_never_hide_fields(record in arb_record(), extra in prop::sample::select(TOKENS.to_vec())) {
        let models = builtin::register(ModelRegistry::builder()).build().unwrap();
        let projector = Projector::new(&models);
        let user = models.get("user").unwrap();
        let creator = record["creator"].as_object().cloned().unwrap();

        let base = AuthorizationContext::anonymous();
        let roles = vec![Role::global("r", "r", [extra])];
        let grown = AuthorizationContext::new(Some(Principal::new("p", roles.clone())), roles);

        let before = projector.project(&creator, user, &base);
        let after = projector.project(&creator, user, &grown);
        for key in before.keys() {
            prop_assert!(after.contains_key(key));
        }
    }
}
