// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine error taxonomy.
//
// Every failure an operation can report belongs to exactly one `ErrorKind`,
// and every kind maps to one stable status code.

use gatehouse_authz::{Action, AuthzError};
use gatehouse_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Stable outcome classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            ErrorKind::Forbidden => write!(f, "FORBIDDEN"),
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::Conflict => write!(f, "CONFLICT"),
            ErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The model does not offer the action.
    #[error("Model '{entity}' does not support {action}")]
    MethodNotAllowed { entity: String, action: Action },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Unauthenticated => ErrorKind::Unauthenticated,
            EngineError::Forbidden(_) | EngineError::MethodNotAllowed { .. } => ErrorKind::Forbidden,
            EngineError::NotFound(_) | EngineError::UnknownModel(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Internal(_) | EngineError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound(format!("{} '{}'", entity, id))
    }
}

impl From<AuthzError> for EngineError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => EngineError::Unauthenticated,
            AuthzError::Forbidden(reason) => EngineError::Forbidden(reason),
            AuthzError::Storage(err) => EngineError::Storage(err),
        }
    }
}
