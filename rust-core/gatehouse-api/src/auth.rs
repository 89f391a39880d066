// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Request authentication.
//!
//! An [`Authenticator`] turns request headers into a principal id. The
//! bundled [`ApiKeyAuthenticator`] accepts a key via either header:
//! - `X-API-Key: <key>`
//! - `Authorization: Bearer <key>`
//!
//! Requests without credentials are anonymous, not rejected: public
//! operations stay reachable and everything else fails with 401 inside the
//! engine.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Credentials were presented but are not acceptable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("Invalid API key")]
    InvalidKey,

    #[error("Malformed credentials: {0}")]
    Malformed(String),

    #[error("Unknown principal")]
    UnknownPrincipal(String),
}

/// Resolves the caller's principal id from request headers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` for an anonymous request.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<String>, AuthFailure>;
}

/// Static API keys, stored as SHA-256 hashes.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator {
    /// key hash -> principal id
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticator for plaintext `key -> principal` pairs.
    pub fn from_keys(keys: &BTreeMap<String, String>) -> Self {
        keys.iter()
            .fold(Self::new(), |auth, (key, principal)| auth.with_key(key, principal))
    }

    pub fn with_key(mut self, plaintext_key: &str, principal_id: &str) -> Self {
        self.keys
            .insert(hash_key(plaintext_key), principal_id.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<String>, AuthFailure> {
        let Some(key) = presented_key(headers)? else {
            return Ok(None);
        };
        match self.keys.get(&hash_key(key)) {
            Some(principal) => {
                debug!(principal = %principal, "API key authenticated");
                Ok(Some(principal.clone()))
            }
            None => {
                warn!("Rejected unknown API key");
                Err(AuthFailure::InvalidKey)
            }
        }
    }
}

/// The key carried by `X-API-Key`, else by `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Result<Option<&str>, AuthFailure> {
    if let Some(value) = headers.get("x-api-key") {
        let key = value
            .to_str()
            .map_err(|_| AuthFailure::Malformed("X-API-Key is not valid ASCII".into()))?;
        return Ok(Some(key.trim()));
    }

    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthFailure::Malformed("Authorization is not valid ASCII".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(|key| Some(key.trim()))
        .ok_or_else(|| AuthFailure::Malformed("expected a Bearer token".into()))
}

/// Hex-encoded SHA-256 of an API key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
