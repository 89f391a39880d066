// SPDX-License-Identifier: PMPL-1.0-or-later
//! Authorization errors.

use gatehouse_storage::StorageError;
use thiserror::Error;

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(Debug, Error)]
pub enum AuthzError {
    /// A requirement applies and no principal was supplied.
    #[error("Authentication required")]
    Unauthenticated,

    /// The principal lacks the required permission, or the change would
    /// escalate its own privileges.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthzError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }
}
