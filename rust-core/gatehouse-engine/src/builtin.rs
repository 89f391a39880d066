// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Built-in models: roles, principals (`user`) and audit records.
//!
//! The role and user hooks carry the anti-escalation rules. Neither lets a
//! caller hand out, or take away, a permission it cannot justify from a
//! source other than the grant being changed.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_audit::{AuditAction, DEFAULT_COLLECTION as RECORDS_COLLECTION};
use gatehouse_authz::{
    Action, AuthorizationContext, EntityPermissions, PermissionSet, Role, ADMIN,
    PRINCIPALS_COLLECTION, ROLES_COLLECTION, ROLES_FIELD,
};
use gatehouse_storage::Document;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::engine::Services;
use crate::error::{EngineError, EngineResult};
use crate::hooks::ModelHooks;
use crate::model::{ModelDescriptor, ModelRegistryBuilder};

pub const ROLE: &str = "role";
pub const USER: &str = "user";
pub const RECORD: &str = "record";

/// Register the role, user and record models.
pub fn register(builder: ModelRegistryBuilder) -> ModelRegistryBuilder {
    builder
        .register(role_model())
        .register(user_model())
        .register(record_model())
}

pub fn role_model() -> ModelDescriptor {
    ModelDescriptor::builder(ROLE, ROLES_COLLECTION)
        .permissions(EntityPermissions::crud(ROLE))
        .editable("name")
        .editable("resource")
        .editable("permissions")
        .id_param("role_id")
        .visible("_id")
        .visible("name")
        .visible("resource")
        .visible("permissions")
        .hooks(Arc::new(RoleHooks))
        .build()
}

pub fn user_model() -> ModelDescriptor {
    let read_role = gatehouse_authz::token(Action::Read, ROLE);
    ModelDescriptor::builder(USER, PRINCIPALS_COLLECTION)
        .permissions(EntityPermissions::only(USER, &[Action::Read, Action::Update]))
        .editable(ROLES_FIELD)
        .id_param("user_id")
        .visible("_id")
        .visible_to(ROLES_FIELD, &[read_role.as_str()])
        .relation(ROLES_FIELD, ROLE)
        .hooks(Arc::new(UserHooks))
        .build()
}

pub fn record_model() -> ModelDescriptor {
    let mut builder = ModelDescriptor::builder(RECORD, RECORDS_COLLECTION)
        .permissions(EntityPermissions::only(RECORD, &[Action::Read]))
        .id_param("record_id")
        .relation("creator", USER);
    for field in ["_id", "createdAt", "creator", "content", "model", "action", "value", "reason"] {
        builder = builder.visible(field);
    }
    builder.build()
}

/// String entries of an array field in a request body. `None` when the
/// field is absent.
fn string_set(body: &Map<String, Value>, field: &str) -> EngineResult<Option<BTreeSet<String>>> {
    match body.get(field) {
        None => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| EngineError::Forbidden(format!("'{}' must list strings", field)))
            })
            .collect::<EngineResult<BTreeSet<_>>>()
            .map(Some),
        Some(_) => Err(EngineError::Forbidden(format!("'{}' must be an array", field))),
    }
}

/// The `resource` binding in a role body. `None` when absent, `Some(None)`
/// for a global binding (null or empty string).
fn resource_binding(body: &Map<String, Value>) -> EngineResult<Option<Option<String>>> {
    match body.get("resource") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(resource)) if resource.is_empty() => Ok(Some(None)),
        Some(Value::String(resource)) => Ok(Some(Some(resource.clone()))),
        Some(_) => Err(EngineError::Forbidden(
            "'resource' must be a string or null".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Escalation guard for role writes and cascade for role deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleHooks;

#[async_trait]
impl ModelHooks for RoleHooks {
    /// The permissions that change must be justified without the edited
    /// role's own grant. On create that is every requested permission. On
    /// update it is the symmetric difference, unless the role moves to a
    /// different resource: then everything it will grant counts as changed.
    async fn before_write(
        &self,
        services: &Services,
        ctx: &AuthorizationContext,
        id: Option<&str>,
        body: &Map<String, Value>,
    ) -> EngineResult<()> {
        if body.get("name").is_some_and(|name| !name.is_string()) {
            return Err(EngineError::Forbidden("'name' must be a string".to_string()));
        }
        let binding = resource_binding(body)?;
        let requested = string_set(body, "permissions")?;

        let changed: Vec<String> = match id {
            None => requested.unwrap_or_default().into_iter().collect(),
            Some(id) => {
                if binding.is_none() && requested.is_none() {
                    return Ok(());
                }
                let current = services
                    .roles
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(ROLE, id))?;
                let rebound =
                    binding.is_some_and(|resource| resource.as_deref() != current.scope());
                match requested {
                    Some(requested) if rebound => {
                        current.permissions.union(&requested).cloned().collect()
                    }
                    Some(requested) => current
                        .permissions
                        .symmetric_difference(&requested)
                        .cloned()
                        .collect(),
                    None if rebound => current.permissions.iter().cloned().collect(),
                    None => Vec::new(),
                }
            }
        };

        ctx.require_permission(&changed, id)?;
        Ok(())
    }

    /// Deleting a role revokes everything it grants, which needs the same
    /// justification as revoking the permissions one by one.
    async fn before_delete(
        &self,
        services: &Services,
        ctx: &AuthorizationContext,
        id: &str,
    ) -> EngineResult<()> {
        let role = services
            .roles
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(ROLE, id))?;
        let granted: Vec<&str> = role.permissions.iter().map(String::as_str).collect();
        ctx.require_permission(&granted, Some(id))?;
        Ok(())
    }

    async fn after_delete(&self, services: &Services, ctx: &AuthorizationContext, removed: &Document) {
        let cleanup = match services.roles.remove_references(removed.id()).await {
            Ok(cleanup) => cleanup,
            Err(err) => {
                warn!(role = %removed.id(), error = %err, "Role reference cleanup failed");
                return;
            }
        };

        for principal in &cleanup.updated {
            services
                .audit
                .record(ctx.principal_id(), USER, AuditAction::Update, principal, "")
                .await;
        }
        if cleanup.is_complete() {
            info!(role = %removed.id(), principals = cleanup.updated.len(), "Role references removed");
        } else {
            warn!(
                role = %removed.id(),
                stale = cleanup.failed.len(),
                "Role deleted with stale references"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

/// Guard on changes to a principal's role list.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserHooks;

#[async_trait]
impl ModelHooks for UserHooks {
    /// Every permission carried by an added or removed role must be held by
    /// the caller. When callers edit themselves, only the roles they keep
    /// count, so nobody can trade a role in for a stronger one.
    async fn before_write(
        &self,
        services: &Services,
        ctx: &AuthorizationContext,
        id: Option<&str>,
        body: &Map<String, Value>,
    ) -> EngineResult<()> {
        let Some(id) = id else {
            return Ok(());
        };
        let Some(requested) = string_set(body, ROLES_FIELD)? else {
            return Ok(());
        };
        let Some(caller) = ctx.principal_id() else {
            return Err(EngineError::Unauthenticated);
        };

        let current = services
            .store
            .find_one(services.roles.principals_collection(), id)
            .await?
            .ok_or_else(|| EngineError::not_found(USER, id))?;

        let mut current_roles: Vec<Role> = Vec::new();
        if let Some(Value::Array(ids)) = current.fields().get(ROLES_FIELD) {
            for role_id in ids.iter().filter_map(Value::as_str) {
                if let Some(role) = services.roles.find_by_id(role_id).await? {
                    current_roles.push(role);
                }
            }
        }

        let mut changed = PermissionSet::new();
        for role_id in &requested {
            if current_roles.iter().any(|role| &role.id == role_id) {
                continue;
            }
            let added = services
                .roles
                .find_by_id(role_id)
                .await?
                .ok_or_else(|| EngineError::not_found(ROLE, role_id))?;
            changed.extend(added.permissions);
        }
        for removed in current_roles.iter().filter(|role| !requested.contains(&role.id)) {
            changed.extend(removed.permissions.iter().cloned());
        }

        let reference = if caller == id {
            PermissionSet::from_roles(current_roles.iter().filter(|role| requested.contains(&role.id)))
        } else {
            ctx.permissions()
        };

        if reference.contains(ADMIN) {
            return Ok(());
        }
        let missing: Vec<&str> = changed.iter().filter(|token| !reference.contains(token)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            warn!(principal = %caller, target = %id, missing = ?missing, "Role assignment denied");
            Err(EngineError::Forbidden(format!(
                "cannot assign or revoke {}",
                missing.join(", ")
            )))
        }
    }
}
