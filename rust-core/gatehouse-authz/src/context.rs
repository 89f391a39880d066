// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Per-operation authorization contexts.
//!
//! [`Resolver::resolve`] turns a principal (or its absence) and the id the
//! operation targets into an [`AuthorizationContext`]. The context is built
//! fresh for every operation, owned by it, and dropped with it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{AuthzError, AuthzResult};
use crate::permission::{PermissionSet, ADMIN};
use crate::role::{Role, RoleRegistry};

/// An authenticated identity with every role assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    /// Assigned roles without a resource binding.
    pub fn global_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|role| role.is_global())
    }

    pub fn holds_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|role| role.id == role_id)
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The principal of one operation together with the roles in effect for it.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationContext {
    principal: Option<Principal>,
    effective_roles: Vec<Role>,
}

impl AuthorizationContext {
    /// Context of an anonymous caller. Only empty requirements pass.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context with an explicit effective role set.
    pub fn new(principal: Option<Principal>, effective_roles: Vec<Role>) -> Self {
        Self {
            principal,
            effective_roles,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn principal_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn effective_roles(&self) -> &[Role] {
        &self.effective_roles
    }

    /// Union of every effective role's permissions.
    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::from_roles(&self.effective_roles)
    }

    /// Whether the effective permissions satisfy `required`.
    pub fn allowed<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.permissions().satisfies(required)
    }

    /// Escalation guard for changes to role `excluded_role_id`.
    ///
    /// Tokens in `changed` that are granted by the excluded role itself do not
    /// count as held, so a role's current grant can never authorize adding to
    /// or removing from that same grant. The role's other tokens still count.
    pub fn has_permission<S: AsRef<str>>(&self, changed: &[S], excluded_role_id: Option<&str>) -> bool {
        if changed.is_empty() {
            return true;
        }

        let held: BTreeSet<&str> = self
            .effective_roles
            .iter()
            .flat_map(|role| {
                let excluded = Some(role.id.as_str()) == excluded_role_id;
                role.permissions
                    .iter()
                    .map(String::as_str)
                    .filter(move |token| {
                        !excluded || !changed.iter().any(|c| c.as_ref() == *token)
                    })
            })
            .collect();

        held.contains(ADMIN) || changed.iter().all(|token| held.contains(token.as_ref()))
    }

    /// Fail unless `required` is satisfied.
    pub fn require<S: AsRef<str>>(&self, required: &[S]) -> AuthzResult<()> {
        if self.allowed(required) {
            return Ok(());
        }
        let missing = join(required);
        match self.principal_id() {
            None => {
                warn!(required = %missing, "Anonymous access denied");
                Err(AuthzError::Unauthenticated)
            }
            Some(principal) => {
                warn!(principal = %principal, required = %missing, "Access denied");
                Err(AuthzError::forbidden(format!("requires {}", missing)))
            }
        }
    }

    /// Fail unless [`has_permission`](Self::has_permission) holds.
    pub fn require_permission<S: AsRef<str>>(
        &self,
        changed: &[S],
        excluded_role_id: Option<&str>,
    ) -> AuthzResult<()> {
        if self.has_permission(changed, excluded_role_id) {
            return Ok(());
        }
        let changed = join(changed);
        match self.principal_id() {
            None => Err(AuthzError::Unauthenticated),
            Some(principal) => {
                warn!(
                    principal = %principal,
                    changed = %changed,
                    role = ?excluded_role_id,
                    "Permission change denied"
                );
                Err(AuthzError::forbidden(format!(
                    "cannot grant or revoke {}",
                    changed
                )))
            }
        }
    }

    /// The tokens among `candidates` this context satisfies.
    pub fn held_permissions<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let permissions = self.permissions();
        let mut held: Vec<String> = candidates
            .into_iter()
            .filter(|token| permissions.satisfies(&[*token]))
            .map(str::to_string)
            .collect();
        held.sort();
        held.dedup();
        held
    }
}

fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Builds authorization contexts from principals and target ids.
#[derive(Clone, Debug)]
pub struct Resolver {
    roles: RoleRegistry,
}

impl Resolver {
    pub fn new(roles: RoleRegistry) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// Effective roles = the principal's global roles, plus the roles bound to
    /// `target_id` that the principal is assigned.
    ///
    /// Scoped roles are read from the store, not from the principal, so a
    /// binding changed since authentication takes effect immediately.
    #[instrument(skip(self, principal), fields(principal = ?principal.map(|p| &p.id)))]
    pub async fn resolve(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
    ) -> AuthzResult<AuthorizationContext> {
        let Some(principal) = principal else {
            return Ok(AuthorizationContext::anonymous());
        };

        let mut effective: Vec<Role> = principal.global_roles().cloned().collect();

        if let Some(target_id) = target_id {
            for role in self.roles.find_scoped_to(target_id).await? {
                if principal.holds_role(&role.id) && !effective.iter().any(|r| r.id == role.id) {
                    effective.push(role);
                }
            }
        }

        debug!(
            roles = effective.len(),
            target = ?target_id,
            "Authorization context resolved"
        );
        Ok(AuthorizationContext::new(Some(principal.clone()), effective))
    }
}
