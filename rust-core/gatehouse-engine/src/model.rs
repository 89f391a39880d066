// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Model descriptors and the startup model registry.
//!
//! A [`ModelDescriptor`] tells the engine everything it needs to serve one
//! entity type: where its documents live, which permission each action
//! requires, which fields callers may write and under which gate, which field
//! groups must be unique, which fields callers may read, and which fields
//! reference other models. Descriptors are collected into a
//! [`ModelRegistry`], validated once, and never mutated afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gatehouse_authz::{AuthorizationContext, EntityPermissions};
use gatehouse_storage::Population;
use thiserror::Error;

use crate::hooks::ModelHooks;

/// Request-dependent gate evaluated against the caller's context.
pub type Strategy = Arc<dyn Fn(&AuthorizationContext) -> bool + Send + Sync>;

/// Errors found while assembling the model registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model '{0}' is registered twice")]
    DuplicateModel(String),

    #[error("Collection '{collection}' is used by both '{first}' and '{second}'")]
    DuplicateCollection {
        collection: String,
        first: String,
        second: String,
    },

    #[error("Relation '{entity}.{field}' targets unknown model '{target}'")]
    UnknownRelationTarget {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Relations form a cycle through model '{0}'")]
    RelationCycle(String),
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

/// Read rule for one field.
#[derive(Clone)]
pub enum Visibility {
    /// Visible when the caller satisfies every listed token. Empty = public.
    Permissions(Vec<String>),
    /// Visible when the strategy returns true.
    Strategy(Strategy),
}

impl Visibility {
    pub fn public() -> Self {
        Visibility::Permissions(Vec::new())
    }

    pub fn allows(&self, ctx: &AuthorizationContext) -> bool {
        match self {
            Visibility::Permissions(required) => ctx.allowed(required),
            Visibility::Strategy(strategy) => strategy(ctx),
        }
    }
}

impl std::fmt::Debug for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Permissions(required) => f.debug_tuple("Permissions").field(required).finish(),
            Visibility::Strategy(_) => f.write_str("Strategy(..)"),
        }
    }
}

/// Write rule for one field.
#[derive(Clone)]
pub enum WriteGate {
    Open,
    Permissions(Vec<String>),
    Strategy(Strategy),
}

impl WriteGate {
    pub fn allows(&self, ctx: &AuthorizationContext) -> bool {
        match self {
            WriteGate::Open => true,
            WriteGate::Permissions(required) => ctx.allowed(required),
            WriteGate::Strategy(strategy) => strategy(ctx),
        }
    }
}

impl std::fmt::Debug for WriteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteGate::Open => f.write_str("Open"),
            WriteGate::Permissions(required) => f.debug_tuple("Permissions").field(required).finish(),
            WriteGate::Strategy(_) => f.write_str("Strategy(..)"),
        }
    }
}

/// A field callers may write, and the gate guarding it.
#[derive(Debug, Clone)]
pub struct EditableProperty {
    pub name: String,
    pub gate: WriteGate,
}

/// A field holding the id, or an array of ids, of documents of another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub field: String,
    pub target_entity: String,
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Everything the engine knows about one entity type.
#[derive(Clone)]
pub struct ModelDescriptor {
    pub entity_type: String,
    pub collection: String,
    pub permissions: EntityPermissions,
    pub editable: Vec<EditableProperty>,
    /// Groups of fields whose combined values must be unique.
    pub unique: Vec<Vec<String>>,
    /// Name of the path parameter carrying a document id.
    pub id_param: String,
    /// Readable fields. Anything not listed is never emitted.
    pub visibility: Vec<(String, Visibility)>,
    pub relations: Vec<Relation>,
    pub hooks: Option<Arc<dyn ModelHooks>>,
}

impl ModelDescriptor {
    pub fn builder(entity_type: &str, collection: &str) -> ModelDescriptorBuilder {
        ModelDescriptorBuilder {
            descriptor: ModelDescriptor {
                entity_type: entity_type.to_string(),
                collection: collection.to_string(),
                permissions: EntityPermissions::default(),
                editable: Vec::new(),
                unique: Vec::new(),
                id_param: format!("{}_id", entity_type),
                visibility: Vec::new(),
                relations: Vec::new(),
                hooks: None,
            },
        }
    }

    pub fn relation(&self, field: &str) -> Option<&Relation> {
        self.relations.iter().find(|relation| relation.field == field)
    }
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("entity_type", &self.entity_type)
            .field("collection", &self.collection)
            .field("permissions", &self.permissions)
            .field("editable", &self.editable)
            .field("unique", &self.unique)
            .field("id_param", &self.id_param)
            .field("visibility", &self.visibility)
            .field("relations", &self.relations)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Fluent construction of a [`ModelDescriptor`].
pub struct ModelDescriptorBuilder {
    descriptor: ModelDescriptor,
}

impl ModelDescriptorBuilder {
    pub fn permissions(mut self, permissions: EntityPermissions) -> Self {
        self.descriptor.permissions = permissions;
        self
    }

    /// Writable by anyone allowed to perform the action.
    pub fn editable(mut self, name: &str) -> Self {
        self.descriptor.editable.push(EditableProperty {
            name: name.to_string(),
            gate: WriteGate::Open,
        });
        self
    }

    /// Writable only by callers holding `required`; silently dropped otherwise.
    pub fn editable_gated(mut self, name: &str, required: &[&str]) -> Self {
        self.descriptor.editable.push(EditableProperty {
            name: name.to_string(),
            gate: WriteGate::Permissions(required.iter().map(|t| t.to_string()).collect()),
        });
        self
    }

    pub fn editable_when<F>(mut self, name: &str, strategy: F) -> Self
    where
        F: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        self.descriptor.editable.push(EditableProperty {
            name: name.to_string(),
            gate: WriteGate::Strategy(Arc::new(strategy)),
        });
        self
    }

    pub fn unique(mut self, group: &[&str]) -> Self {
        self.descriptor
            .unique
            .push(group.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn id_param(mut self, id_param: &str) -> Self {
        self.descriptor.id_param = id_param.to_string();
        self
    }

    /// Readable by everyone.
    pub fn visible(self, field: &str) -> Self {
        self.visible_to(field, &[])
    }

    pub fn visible_to(mut self, field: &str, required: &[&str]) -> Self {
        self.descriptor.visibility.push((
            field.to_string(),
            Visibility::Permissions(required.iter().map(|t| t.to_string()).collect()),
        ));
        self
    }

    pub fn visible_when<F>(mut self, field: &str, strategy: F) -> Self
    where
        F: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        self.descriptor
            .visibility
            .push((field.to_string(), Visibility::Strategy(Arc::new(strategy))));
        self
    }

    pub fn relation(mut self, field: &str, target_entity: &str) -> Self {
        self.descriptor.relations.push(Relation {
            field: field.to_string(),
            target_entity: target_entity.to_string(),
        });
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.descriptor.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> ModelDescriptor {
        self.descriptor
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The immutable set of models served by one engine.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Arc<ModelDescriptor>>,
    by_entity: HashMap<String, usize>,
    by_collection: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<ModelDescriptor>> {
        self.by_entity.get(entity_type).map(|&i| &self.models[i])
    }

    pub fn by_collection(&self, collection: &str) -> Option<&Arc<ModelDescriptor>> {
        self.by_collection.get(collection).map(|&i| &self.models[i])
    }

    /// Models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Population spec for a model's relations, nested through the
    /// relations of each target model.
    pub fn population(&self, descriptor: &ModelDescriptor) -> Vec<Population> {
        descriptor
            .relations
            .iter()
            .filter_map(|relation| {
                let target = self.get(&relation.target_entity)?;
                Some(
                    Population::new(relation.field.clone(), target.collection.clone())
                        .with_nested(self.population(target)),
                )
            })
            .collect()
    }
}

/// Collects descriptors and validates them as a whole.
#[derive(Default)]
pub struct ModelRegistryBuilder {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistryBuilder {
    pub fn register(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.push(descriptor);
        self
    }

    pub fn build(self) -> Result<ModelRegistry, ModelError> {
        let mut registry = ModelRegistry::default();

        for descriptor in self.models {
            let index = registry.models.len();
            if registry.by_entity.contains_key(&descriptor.entity_type) {
                return Err(ModelError::DuplicateModel(descriptor.entity_type));
            }
            if let Some(&other) = registry.by_collection.get(&descriptor.collection) {
                return Err(ModelError::DuplicateCollection {
                    collection: descriptor.collection.clone(),
                    first: registry.models[other].entity_type.clone(),
                    second: descriptor.entity_type,
                });
            }
            registry
                .by_entity
                .insert(descriptor.entity_type.clone(), index);
            registry
                .by_collection
                .insert(descriptor.collection.clone(), index);
            registry.models.push(Arc::new(descriptor));
        }

        for descriptor in &registry.models {
            for relation in &descriptor.relations {
                if registry.get(&relation.target_entity).is_none() {
                    return Err(ModelError::UnknownRelationTarget {
                        entity: descriptor.entity_type.clone(),
                        field: relation.field.clone(),
                        target: relation.target_entity.clone(),
                    });
                }
            }
        }

        let mut done = HashSet::new();
        for descriptor in &registry.models {
            check_acyclic(&registry, &descriptor.entity_type, &mut Vec::new(), &mut done)?;
        }

        Ok(registry)
    }
}

/// Depth-first walk over relation targets; `path` holds the models on the
/// current branch.
fn check_acyclic(
    registry: &ModelRegistry,
    entity: &str,
    path: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<(), ModelError> {
    if done.contains(entity) {
        return Ok(());
    }
    if path.iter().any(|e| e == entity) {
        return Err(ModelError::RelationCycle(entity.to_string()));
    }
    path.push(entity.to_string());
    if let Some(descriptor) = registry.get(entity) {
        for relation in &descriptor.relations {
            check_acyclic(registry, &relation.target_entity, path, done)?;
        }
    }
    path.pop();
    done.insert(entity.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_authz::{Action, Principal, Role};

    fn model(entity: &str, collection: &str) -> ModelDescriptorBuilder {
        ModelDescriptor::builder(entity, collection).permissions(EntityPermissions::crud(entity))
    }

    #[test]
    fn test_builder_defaults() {
        let m = model("note", "notes").build();
        assert_eq!(m.id_param, "note_id");
        assert!(m.visibility.is_empty());
        assert!(m.hooks.is_none());
        assert_eq!(m.permissions.for_action(Action::Delete), Some("delete:note"));
    }

    #[test]
    fn test_rules() {
        let reader = AuthorizationContext::new(
            Some(Principal::new("p", vec![])),
            vec![Role::global("r", "r", ["read:role"])],
        );
        let anon = AuthorizationContext::anonymous();

        assert!(Visibility::public().allows(&anon));
        let gated = Visibility::Permissions(vec!["read:role".to_string()]);
        assert!(gated.allows(&reader));
        assert!(!gated.allows(&anon));

        let authenticated_only = WriteGate::Strategy(Arc::new(|ctx: &AuthorizationContext| ctx.is_authenticated()));
        assert!(authenticated_only.allows(&reader));
        assert!(!authenticated_only.allows(&anon));
        assert!(WriteGate::Open.allows(&anon));
    }

    #[test]
    fn test_registry_lookup_and_population() {
        let registry = ModelRegistry::builder()
            .register(model("role", "roles").build())
            .register(model("user", "users").relation("roles", "role").build())
            .register(model("record", "records").relation("creator", "user").build())
            .build()
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.by_collection("users").unwrap().entity_type, "user");
        assert!(registry.get("missing").is_none());

        let record = registry.get("record").unwrap();
        assert_eq!(
            registry.population(record),
            vec![Population::new("creator", "users")
                .with_nested(vec![Population::new("roles", "roles")])]
        );
    }

    #[test]
    fn test_registry_validation() {
        let dup = ModelRegistry::builder()
            .register(model("a", "as").build())
            .register(model("a", "others").build())
            .build();
        assert_eq!(dup.unwrap_err(), ModelError::DuplicateModel("a".to_string()));

        let shared = ModelRegistry::builder()
            .register(model("a", "things").build())
            .register(model("b", "things").build())
            .build();
        assert!(matches!(shared, Err(ModelError::DuplicateCollection { .. })));

        let dangling = ModelRegistry::builder()
            .register(model("a", "as").relation("owner", "ghost").build())
            .build();
        assert!(matches!(dangling, Err(ModelError::UnknownRelationTarget { .. })));

        let cycle = ModelRegistry::builder()
            .register(model("a", "as").relation("b", "b").build())
            .register(model("b", "bs").relation("c", "c").build())
            .register(model("c", "cs").relation("a", "a").build())
            .build();
        assert!(matches!(cycle, Err(ModelError::RelationCycle(_))));

        let diamond = ModelRegistry::builder()
            .register(model("leaf", "leaves").build())
            .register(model("left", "lefts").relation("x", "leaf").build())
            .register(model("right", "rights").relation("x", "leaf").build())
            .register(
                model("top", "tops")
                    .relation("l", "left")
                    .relation("r", "right")
                    .build(),
            )
            .build();
        assert!(diamond.is_ok());
    }
}
