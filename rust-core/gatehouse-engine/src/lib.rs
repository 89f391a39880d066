// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Gatehouse Engine
//!
//! Derives authorized create/read/update/delete operations from declarative
//! model descriptors.
//!
//! # Modules
//!
//! - [`model`]: `ModelDescriptor`, its builder, and the validated
//!   `ModelRegistry` built once at startup.
//! - [`projection`]: the default-deny, relation-aware output filter.
//! - [`engine`]: `Engine` and the per-model `Controller`.
//! - [`hooks`]: the `ModelHooks` extension trait.
//! - [`builtin`]: the role, user and record models and their hooks.
//! - [`error`]: `EngineError` and its five stable `ErrorKind`s.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use gatehouse_authz::{Principal, Role, ADMIN};
//! use gatehouse_engine::{builtin, Engine, ModelRegistry, Services};
//! use gatehouse_storage::{DocumentStore, InMemoryBackend, KvDocumentStore};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let models = builtin::register(ModelRegistry::builder()).build().unwrap();
//! let store: Arc<dyn DocumentStore> = Arc::new(KvDocumentStore::new(InMemoryBackend::new()));
//! let engine = Engine::new(Arc::new(models), Services::new(store));
//!
//! let root = Principal::new("root", vec![Role::global("r0", "root", [ADMIN])]);
//! let body = json!({"name": "auditors", "permissions": ["read:record"]});
//! let role = engine
//!     .controller("role")
//!     .unwrap()
//!     .create(Some(&root), body.as_object().unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(role["name"], "auditors");
//! # });
//! ```

pub mod builtin;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod model;
pub mod projection;

pub use engine::{Controller, Engine, Projection, Services};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use hooks::ModelHooks;
pub use model::{
    EditableProperty, ModelDescriptor, ModelDescriptorBuilder, ModelError, ModelRegistry,
    ModelRegistryBuilder, Relation, Strategy, Visibility, WriteGate,
};
pub use projection::Projector;
