// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the Gatehouse document store.
//
// Absent documents are not errors: lookups return `Ok(None)` and the engine
// decides whether that means `NotFound`. Everything in here surfaces to the
// caller as an internal failure.

use thiserror::Error;

/// Result alias used throughout the storage crate.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur when interacting with a document store or its
/// key-value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to serialize or deserialize a stored value.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// A value handed to the store is not a valid document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// An insert supplied an id that is already taken in the collection.
    #[error("duplicate id '{id}' in collection '{collection}'")]
    DuplicateId {
        /// Target collection.
        collection: String,
        /// The conflicting id.
        id: String,
    },

    /// The storage backend is not available (e.g., connection lost).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}
