// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Roles and the role registry.
//!
//! A role bundles permission tokens. A role without a `resource` is global;
//! a role bound to a resource id grants its permissions only to operations
//! targeting that id. Roles live in the document store (`roles`
//! collection) and principals reference them by id from the `roles` array of
//! their own document (`users` collection).

use std::collections::BTreeSet;
use std::sync::Arc;

use gatehouse_storage::{Document, DocumentStore, Filter, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::context::Principal;
use crate::error::{AuthzError, AuthzResult};

/// Collection holding roles.
pub const ROLES_COLLECTION: &str = "roles";

/// Collection holding principals.
pub const PRINCIPALS_COLLECTION: &str = "users";

/// Field of a principal document listing its role ids.
pub const ROLES_FIELD: &str = "roles";

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A named bundle of permission tokens, optionally scoped to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Role {
    /// A role granting `permissions` everywhere.
    pub fn global<I, S>(id: impl Into<String>, name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            resource: None,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// A role granting `permissions` only for operations targeting `resource`.
    pub fn scoped<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        resource: impl Into<String>,
        permissions: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: Some(resource.into()),
            ..Self::global(id, name, permissions)
        }
    }

    /// The resource this role is bound to. An empty binding counts as none.
    pub fn scope(&self) -> Option<&str> {
        self.resource.as_deref().filter(|resource| !resource.is_empty())
    }

    pub fn is_global(&self) -> bool {
        self.scope().is_none()
    }

    /// Decode a stored role document.
    pub fn from_document(document: &Document) -> AuthzResult<Self> {
        serde_json::from_value(document.to_value()).map_err(|err| {
            AuthzError::Storage(StorageError::CorruptedData(format!(
                "role '{}' is malformed: {}",
                document.id(),
                err
            )))
        })
    }
}

/// Fields that [`RoleRegistry::update`] overwrites. `None` leaves a field
/// untouched; `resource: Some(None)` makes the role global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub resource: Option<Option<String>>,
    pub permissions: Option<BTreeSet<String>>,
}

impl RoleChanges {
    fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(name) = self.name {
            fields.insert("name".to_string(), Value::String(name));
        }
        if let Some(resource) = self.resource {
            fields.insert(
                "resource".to_string(),
                resource.map(Value::String).unwrap_or(Value::Null),
            );
        }
        if let Some(permissions) = self.permissions {
            fields.insert(
                "permissions".to_string(),
                Value::Array(permissions.into_iter().map(Value::String).collect()),
            );
        }
        fields
    }
}

/// Outcome of removing a role id from every principal referencing it.
#[derive(Debug, Default)]
pub struct ReferenceCleanup {
    /// Principal documents after the reference was removed.
    pub updated: Vec<Document>,
    /// Principals that still reference the role, with the reason.
    pub failed: Vec<(String, StorageError)>,
}

impl ReferenceCleanup {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Role persistence over a [`DocumentStore`].
///
/// Holds no state besides the store handle; every call goes to the store.
#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn DocumentStore>,
    roles: String,
    principals: String,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collections(store, ROLES_COLLECTION, PRINCIPALS_COLLECTION)
    }

    pub fn with_collections(
        store: Arc<dyn DocumentStore>,
        roles: impl Into<String>,
        principals: impl Into<String>,
    ) -> Self {
        Self {
            store,
            roles: roles.into(),
            principals: principals.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn roles_collection(&self) -> &str {
        &self.roles
    }

    pub fn principals_collection(&self) -> &str {
        &self.principals
    }

    pub async fn find_by_id(&self, id: &str) -> AuthzResult<Option<Role>> {
        match self.store.find_one(&self.roles, id).await? {
            Some(document) => Ok(Some(Role::from_document(&document)?)),
            None => Ok(None),
        }
    }

    pub async fn find_all(&self) -> AuthzResult<Vec<Role>> {
        self.find(&Filter::all()).await
    }

    /// Roles bound to `resource_id`.
    pub async fn find_scoped_to(&self, resource_id: &str) -> AuthzResult<Vec<Role>> {
        self.find(&Filter::all().eq("resource", resource_id)).await
    }

    /// Matching roles. Malformed role documents are skipped with a warning so
    /// one bad document cannot block resolution for a whole resource.
    async fn find(&self, filter: &Filter) -> AuthzResult<Vec<Role>> {
        let documents = self.store.find(&self.roles, filter).await?;
        Ok(documents
            .iter()
            .filter_map(|document| match Role::from_document(document) {
                Ok(role) => Some(role),
                Err(err) => {
                    warn!(role = %document.id(), error = %err, "Skipping malformed role");
                    None
                }
            })
            .collect())
    }

    #[instrument(skip(self, permissions))]
    pub async fn create<I, S>(
        &self,
        name: &str,
        resource: Option<&str>,
        permissions: I,
    ) -> AuthzResult<Role>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let changes = RoleChanges {
            name: Some(name.to_string()),
            resource: Some(resource.map(str::to_string)),
            permissions: Some(permissions.into_iter().map(Into::into).collect()),
        };
        let document = self.store.insert(&self.roles, changes.into_fields()).await?;
        info!(role = %document.id(), "Role created");
        Role::from_document(&document)
    }

    /// Overwrite the supplied fields. `None` when the role does not exist.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: &str, changes: RoleChanges) -> AuthzResult<Option<Role>> {
        match self
            .store
            .update_set(&self.roles, id, changes.into_fields())
            .await?
        {
            Some(document) => {
                info!(role = %id, "Role updated");
                Ok(Some(Role::from_document(&document)?))
            }
            None => Ok(None),
        }
    }

    /// Remove a role, then remove every reference to it.
    ///
    /// The reference cleanup never reverses the deletion; incomplete cleanup
    /// is reported in the returned [`ReferenceCleanup`].
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> AuthzResult<Option<(Role, ReferenceCleanup)>> {
        let Some(document) = self.store.remove(&self.roles, id).await? else {
            return Ok(None);
        };
        info!(role = %id, "Role deleted");
        let role = Role::from_document(&document)?;
        let cleanup = self.remove_references(id).await?;
        Ok(Some((role, cleanup)))
    }

    /// Remove `role_id` from the role list of every principal holding it.
    ///
    /// Principals are updated one at a time. A failed update is logged and
    /// recorded in the result; the remaining principals are still processed.
    #[instrument(skip(self))]
    pub async fn remove_references(&self, role_id: &str) -> AuthzResult<ReferenceCleanup> {
        let holders = self
            .store
            .find(&self.principals, &Filter::all().eq(ROLES_FIELD, role_id))
            .await?;

        let mut cleanup = ReferenceCleanup::default();
        for holder in holders {
            let remaining: Vec<Value> = match holder.fields().get(ROLES_FIELD) {
                Some(Value::Array(ids)) => ids
                    .iter()
                    .filter(|id| id.as_str() != Some(role_id))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            let mut set = Map::new();
            set.insert(ROLES_FIELD.to_string(), Value::Array(remaining));

            match self.store.update_set(&self.principals, holder.id(), set).await {
                Ok(Some(updated)) => cleanup.updated.push(updated),
                // Removed concurrently; nothing left to clean.
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        role = %role_id,
                        principal = %holder.id(),
                        error = %err,
                        "Failed to remove role reference"
                    );
                    cleanup.failed.push((holder.id().to_string(), err));
                }
            }
        }

        debug!(
            role = %role_id,
            updated = cleanup.updated.len(),
            failed = cleanup.failed.len(),
            "Role references removed"
        );
        Ok(cleanup)
    }

    /// Read a principal and materialize its roles.
    ///
    /// Role ids that no longer resolve, or resolve to a malformed role, are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn load_principal(&self, principal_id: &str) -> AuthzResult<Option<Principal>> {
        let Some(document) = self.store.find_one(&self.principals, principal_id).await? else {
            return Ok(None);
        };

        let mut roles = Vec::new();
        if let Some(Value::Array(ids)) = document.fields().get(ROLES_FIELD) {
            for id in ids.iter().filter_map(Value::as_str) {
                match self.find_by_id(id).await {
                    Ok(Some(role)) => roles.push(role),
                    Ok(None) => debug!(principal = %principal_id, role = %id, "Skipping dangling role"),
                    Err(AuthzError::Storage(StorageError::CorruptedData(reason))) => {
                        warn!(
                            principal = %principal_id,
                            role = %id,
                            reason = %reason,
                            "Skipping malformed role"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(Some(Principal::new(principal_id, roles)))
    }
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("roles", &self.roles)
            .field("principals", &self.principals)
            .finish()
    }
}
