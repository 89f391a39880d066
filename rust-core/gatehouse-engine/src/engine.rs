// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! The generic CRUD engine.
//!
//! [`Engine::controller`] yields a [`Controller`] for one registered model.
//! Every controller operation follows the same pass:
//!
//! 1. Resolve the caller's authorization context (with the target id for
//!    single-document operations, so resource-scoped roles apply).
//! 2. Require the permission the model declares for the action.
//! 3. Run the model's hook, if any.
//! 4. For writes: keep only the editable fields the caller may set, then
//!    check the model's unique field groups.
//! 5. Call the store.
//! 6. Record the mutation in the audit trail (best-effort).
//! 7. Populate relations and project the result through the visibility
//!    rules.
//!
//! Nothing is retained between operations.

use std::sync::Arc;

use gatehouse_audit::{AuditAction, AuditRecorder};
use gatehouse_authz::{Action, AuthorizationContext, Principal, Resolver, RoleRegistry, ADMIN};
use gatehouse_storage::{Document, DocumentStore, Filter};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::{EngineError, EngineResult};
use crate::model::{ModelDescriptor, ModelRegistry};
use crate::projection::Projector;

/// A projected document as returned to callers.
pub type Projection = Map<String, Value>;

/// Collaborators shared by the engine and the model hooks.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub roles: RoleRegistry,
    pub audit: AuditRecorder,
}

impl Services {
    /// Default role registry and audit recorder over one store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            roles: RoleRegistry::new(Arc::clone(&store)),
            audit: AuditRecorder::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn with_audit(mut self, audit: AuditRecorder) -> Self {
        self.audit = audit;
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("roles", &self.roles)
            .field("audit", &self.audit)
            .finish()
    }
}

/// Serves every model of a [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct Engine {
    models: Arc<ModelRegistry>,
    services: Services,
    resolver: Resolver,
}

impl Engine {
    pub fn new(models: Arc<ModelRegistry>, services: Services) -> Self {
        let resolver = Resolver::new(services.roles.clone());
        Self {
            models,
            services,
            resolver,
        }
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Controller for `entity_type`.
    pub fn controller(&self, entity_type: &str) -> EngineResult<Controller<'_>> {
        let model = self
            .models
            .get(entity_type)
            .ok_or_else(|| EngineError::UnknownModel(entity_type.to_string()))?;
        Ok(Controller { engine: self, model })
    }

    /// Controller for the model stored in `collection`.
    pub fn controller_for_collection(&self, collection: &str) -> EngineResult<Controller<'_>> {
        let model = self
            .models
            .by_collection(collection)
            .ok_or_else(|| EngineError::UnknownModel(collection.to_string()))?;
        Ok(Controller { engine: self, model })
    }

    /// Load a principal and its roles by id, for authenticators.
    pub async fn load_principal(&self, principal_id: &str) -> EngineResult<Option<Principal>> {
        Ok(self.services.roles.load_principal(principal_id).await?)
    }

    /// Every token the caller holds among `admin` and the tokens declared by
    /// the registered models.
    #[instrument(skip(self, principal), fields(principal = ?principal.map(|p| &p.id)))]
    pub async fn permissions(&self, principal: Option<&Principal>) -> EngineResult<Vec<String>> {
        if principal.is_none() {
            return Err(EngineError::Unauthenticated);
        }
        let ctx = self.resolver.resolve(principal, None).await?;

        let mut candidates = vec![ADMIN];
        for model in self.models.iter() {
            candidates.extend(model.permissions.tokens());
        }
        Ok(ctx.held_permissions(candidates))
    }
}

/// CRUD operations for one model.
#[derive(Debug, Clone, Copy)]
pub struct Controller<'a> {
    engine: &'a Engine,
    model: &'a Arc<ModelDescriptor>,
}

impl<'a> Controller<'a> {
    pub fn model(&self) -> &ModelDescriptor {
        self.model
    }

    /// Every document matching `filter`.
    #[instrument(skip(self, principal, filter), fields(model = %self.model.entity_type))]
    pub async fn list(
        &self,
        principal: Option<&Principal>,
        filter: &Filter,
    ) -> EngineResult<Vec<Projection>> {
        let ctx = self.authorize(principal, None, Action::Read).await?;

        let documents = self.store().find(&self.model.collection, filter).await?;
        let mut out = Vec::with_capacity(documents.len());
        for document in documents {
            out.push(self.present(document, &ctx).await?);
        }
        debug!(count = out.len(), "Listed documents");
        Ok(out)
    }

    #[instrument(skip(self, principal, body), fields(model = %self.model.entity_type))]
    pub async fn create(
        &self,
        principal: Option<&Principal>,
        body: &Map<String, Value>,
    ) -> EngineResult<Projection> {
        let ctx = self.authorize(principal, None, Action::Create).await?;
        if let Some(hooks) = &self.model.hooks {
            hooks.before_write(self.services(), &ctx, None, body).await?;
        }

        let values = self.write_set(body, &ctx);
        self.verify_uniqueness(&values, None).await?;

        let document = self.store().insert(&self.model.collection, values).await?;
        info!(id = %document.id(), principal = ?ctx.principal_id(), "Document created");
        self.audit(&ctx, AuditAction::Create, &document).await;

        self.present(document, &ctx).await
    }

    #[instrument(skip(self, principal), fields(model = %self.model.entity_type))]
    pub async fn read(&self, principal: Option<&Principal>, id: &str) -> EngineResult<Projection> {
        let ctx = self.authorize(principal, Some(id), Action::Read).await?;

        let document = self
            .store()
            .find_one(&self.model.collection, id)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.model.entity_type, id))?;
        self.present(document, &ctx).await
    }

    /// Overwrite the supplied fields the caller may write.
    ///
    /// Fields the caller may not write are dropped, not rejected.
    #[instrument(skip(self, principal, body), fields(model = %self.model.entity_type))]
    pub async fn update(
        &self,
        principal: Option<&Principal>,
        id: &str,
        body: &Map<String, Value>,
    ) -> EngineResult<Projection> {
        let ctx = self.authorize(principal, Some(id), Action::Update).await?;
        if let Some(hooks) = &self.model.hooks {
            hooks.before_write(self.services(), &ctx, Some(id), body).await?;
        }

        let current = self
            .store()
            .find_one(&self.model.collection, id)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.model.entity_type, id))?;

        let values = self.write_set(body, &ctx);
        let mut merged = current.fields().clone();
        merged.extend(values.clone());
        self.verify_uniqueness(&merged, Some(id)).await?;

        let document = self
            .store()
            .update_set(&self.model.collection, id, values)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.model.entity_type, id))?;
        info!(id = %id, principal = ?ctx.principal_id(), "Document updated");
        self.audit(&ctx, AuditAction::Update, &document).await;

        self.present(document, &ctx).await
    }

    /// Remove a document and return its final state.
    #[instrument(skip(self, principal), fields(model = %self.model.entity_type))]
    pub async fn delete(&self, principal: Option<&Principal>, id: &str) -> EngineResult<Projection> {
        let ctx = self.authorize(principal, Some(id), Action::Delete).await?;
        if let Some(hooks) = &self.model.hooks {
            hooks.before_delete(self.services(), &ctx, id).await?;
        }

        let removed = self
            .store()
            .remove(&self.model.collection, id)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.model.entity_type, id))?;
        info!(id = %id, principal = ?ctx.principal_id(), "Document deleted");
        self.audit(&ctx, AuditAction::Delete, &removed).await;

        if let Some(hooks) = &self.model.hooks {
            hooks.after_delete(self.services(), &ctx, &removed).await;
        }

        self.present(removed, &ctx).await
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn services(&self) -> &'a Services {
        &self.engine.services
    }

    fn store(&self) -> &'a Arc<dyn DocumentStore> {
        &self.engine.services.store
    }

    async fn authorize(
        &self,
        principal: Option<&Principal>,
        target_id: Option<&str>,
        action: Action,
    ) -> EngineResult<AuthorizationContext> {
        let required = self
            .model
            .permissions
            .required(action)
            .ok_or_else(|| EngineError::MethodNotAllowed {
                entity: self.model.entity_type.clone(),
                action,
            })?;
        let ctx = self.engine.resolver.resolve(principal, target_id).await?;
        ctx.require(&required)?;
        Ok(ctx)
    }

    /// Supplied editable fields whose gate passes.
    fn write_set(&self, body: &Map<String, Value>, ctx: &AuthorizationContext) -> Map<String, Value> {
        let mut values = Map::new();
        for property in &self.model.editable {
            let Some(value) = body.get(&property.name) else {
                continue;
            };
            if property.gate.allows(ctx) {
                values.insert(property.name.clone(), value.clone());
            } else {
                debug!(field = %property.name, "Dropping field the caller may not write");
            }
        }
        values
    }

    /// Fail with `Conflict` if another document already holds the values of
    /// any unique group. Groups with a missing value are skipped.
    ///
    /// Check and write are separate store calls; concurrent writers can both
    /// pass the check.
    async fn verify_uniqueness(
        &self,
        values: &Map<String, Value>,
        self_id: Option<&str>,
    ) -> EngineResult<()> {
        for group in &self.model.unique {
            if group.is_empty() {
                continue;
            }
            let conditions: Option<Filter> = group
                .iter()
                .map(|field| values.get(field).map(|value| (field.clone(), value.clone())))
                .collect();
            let Some(filter) = conditions else {
                continue;
            };

            let matches = self.store().find(&self.model.collection, &filter).await?;
            if matches.iter().any(|doc| Some(doc.id()) != self_id) {
                return Err(EngineError::Conflict(format!(
                    "{} with the same {} already exists",
                    self.model.entity_type,
                    group.join(", ")
                )));
            }
        }
        Ok(())
    }

    async fn audit(&self, ctx: &AuthorizationContext, action: AuditAction, document: &Document) {
        self.services()
            .audit
            .record(
                ctx.principal_id(),
                &self.model.entity_type,
                action,
                document,
                "",
            )
            .await;
    }

    async fn present(
        &self,
        document: Document,
        ctx: &AuthorizationContext,
    ) -> EngineResult<Projection> {
        let populations = self.engine.models.population(self.model);
        let document = if populations.is_empty() {
            document
        } else {
            self.store().populate(document, &populations).await?
        };
        Ok(Projector::new(&self.engine.models).project_document(&document, self.model, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_authz::{EntityPermissions, Role};
    use gatehouse_storage::{InMemoryBackend, KvDocumentStore};
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn engine() -> Engine {
        let models = ModelRegistry::builder()
            .register(
                ModelDescriptor::builder("tag", "tags")
                    .permissions(EntityPermissions::crud("tag"))
                    .editable("label")
                    .editable_gated("color", &["paint:tag"])
                    .unique(&["label"])
                    .visible("_id")
                    .visible("label")
                    .visible("color")
                    .build(),
            )
            .register(
                ModelDescriptor::builder("note", "notes")
                    .permissions(EntityPermissions::only("note", &[Action::Read]))
                    .visible("_id")
                    .build(),
            )
            .build()
            .unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(KvDocumentStore::new(InMemoryBackend::new()));
        Engine::new(Arc::new(models), Services::new(store))
    }

    fn principal(tokens: &[&str]) -> Principal {
        Principal::new("p1", vec![Role::global("r", "r", tokens.iter().copied())])
    }

    #[tokio::test]
    async fn test_unknown_model_and_undeclared_action() {
        let engine = engine();
        assert!(matches!(engine.controller("ghost"), Err(EngineError::UnknownModel(_))));

        let notes = engine.controller_for_collection("notes").unwrap();
        let err = notes
            .delete(Some(&principal(&[ADMIN])), "n1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MethodNotAllowed { .. }));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_write_set_drops_gated_fields() {
        let engine = engine();
        let tags = engine.controller("tag").unwrap();
        let writer = principal(&["create:tag", "update:tag"]);

        let created = tags
            .create(Some(&writer), &fields(json!({"label": "a", "color": "red", "extra": 1})))
            .await
            .unwrap();
        assert_eq!(created.get("label"), Some(&json!("a")));
        assert!(created.get("color").is_none());
        assert!(created.get("extra").is_none());

        let id = created["_id"].as_str().unwrap().to_string();
        let painter = principal(&["update:tag", "paint:tag"]);
        let painted = tags
            .update(Some(&painter), &id, &fields(json!({"color": "blue"})))
            .await
            .unwrap();
        assert_eq!(painted.get("color"), Some(&json!("blue")));

        let unchanged = tags
            .update(Some(&writer), &id, &fields(json!({"color": "green"})))
            .await
            .unwrap();
        assert_eq!(unchanged.get("color"), Some(&json!("blue")));
    }

    #[tokio::test]
    async fn test_uniqueness_on_update_excludes_self() {
        let engine = engine();
        let tags = engine.controller("tag").unwrap();
        let admin = principal(&[ADMIN]);

        let a = tags.create(Some(&admin), &fields(json!({"label": "a"}))).await.unwrap();
        tags.create(Some(&admin), &fields(json!({"label": "b"}))).await.unwrap();
        let a_id = a["_id"].as_str().unwrap();

        // Re-saving its own label is fine.
        tags.update(Some(&admin), a_id, &fields(json!({"label": "a"})))
            .await
            .unwrap();
        let err = tags
            .update(Some(&admin), a_id, &fields(json!({"label": "b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        // A body without the unique field never conflicts.
        tags.create(Some(&admin), &fields(json!({}))).await.unwrap();
        tags.create(Some(&admin), &fields(json!({}))).await.unwrap();
    }

    #[tokio::test]
    async fn test_not_found() {
        let engine = engine();
        let tags = engine.controller("tag").unwrap();
        let admin = principal(&[ADMIN]);

        for err in [
            tags.read(Some(&admin), "nope").await.unwrap_err(),
            tags.update(Some(&admin), "nope", &Map::new()).await.unwrap_err(),
            tags.delete(Some(&admin), "nope").await.unwrap_err(),
        ] {
            assert!(matches!(err, EngineError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_authorization_precedes_store() {
        let engine = engine();
        let tags = engine.controller("tag").unwrap();

        // Missing document, but the caller is rejected first.
        let anon = tags.read(None, "nope").await.unwrap_err();
        assert!(matches!(anon, EngineError::Unauthenticated));
        let reader = tags
            .delete(Some(&principal(&["read:tag"])), "nope")
            .await
            .unwrap_err();
        assert!(matches!(reader, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_permissions_listing() {
        let engine = engine();
        assert!(matches!(
            engine.permissions(None).await,
            Err(EngineError::Unauthenticated)
        ));

        let held = engine
            .permissions(Some(&principal(&["read:tag", "read:note", "paint:tag"])))
            .await
            .unwrap();
        // paint:tag is held but is not an action token of any model.
        assert_eq!(held, vec!["read:note".to_string(), "read:tag".to_string()]);

        let all = engine.permissions(Some(&principal(&[ADMIN]))).await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.contains(&ADMIN.to_string()));
    }
}
