// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gatehouse Storage
//
// The CRUD engine never talks to a database directly. It consumes the
// `DocumentStore` trait defined here, which offers exactly the five calls the
// engine needs (find, find_one, insert, update_set, remove) plus relation
// population. The store owns documents and roles; nothing above this crate
// caches them across operations.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` key-value trait.
// - [`error`] -- The `StorageError` enum.
// - [`memory`] -- An in-memory `BTreeMap` backend for tests and single-node use.
// - [`typed`] -- A serde-based typed wrapper with namespace prefixing.
// - [`document`] -- `Document`, `Filter` and `Population`.
// - [`store`] -- The `DocumentStore` trait and `KvDocumentStore`, which
//   implements it on top of any `StorageBackend`.
//
// # Example
//
// ```rust
// use gatehouse_storage::{DocumentStore, Filter, InMemoryBackend, KvDocumentStore};
// use serde_json::json;
//
// # tokio_test::block_on(async {
// let store = KvDocumentStore::new(InMemoryBackend::new());
// let fields = json!({"name": "editors"}).as_object().cloned().unwrap();
// let doc = store.insert("roles", fields).await.unwrap();
//
// let found = store.find("roles", &Filter::all().eq("name", "editors")).await.unwrap();
// assert_eq!(found[0].id(), doc.id());
// # });
// ```

pub mod backend;
pub mod document;
pub mod error;
pub mod memory;
pub mod store;
pub mod typed;

pub use backend::StorageBackend;
pub use document::{Document, Filter, Population, ID_FIELD};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use store::{DocumentStore, KvDocumentStore};
pub use typed::TypedStore;
