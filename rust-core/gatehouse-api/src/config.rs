// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Server configuration.
//!
//! Defaults suit local development. `from_env` overlays the `GATEHOUSE_*`
//! environment variables:
//!
//! | Variable                    | Format                        |
//! |-----------------------------|-------------------------------|
//! | `GATEHOUSE_HOST`            | bind address                  |
//! | `GATEHOUSE_PORT`            | TCP port                      |
//! | `GATEHOUSE_API_KEYS`        | `key1:principal1,key2:...`    |
//! | `GATEHOUSE_BOOTSTRAP_ADMIN` | principal id seeded as admin  |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Plaintext API key -> principal id. Hashed when the authenticator is
    /// built.
    #[serde(default, skip_serializing)]
    pub api_keys: BTreeMap<String, String>,
    /// Principal given a global `admin` role at startup, if not yet stored.
    pub bootstrap_admin: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_keys: BTreeMap::new(),
            bootstrap_admin: None,
        }
    }
}

impl ApiConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("GATEHOUSE_HOST").filter(|v| !v.is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup("GATEHOUSE_PORT") {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid GATEHOUSE_PORT"),
            }
        }
        if let Some(keys) = lookup("GATEHOUSE_API_KEYS") {
            config.api_keys = parse_api_keys(&keys);
        }
        config.bootstrap_admin = lookup("GATEHOUSE_BOOTSTRAP_ADMIN")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        config
    }
}

/// Parse `key:principal` pairs separated by commas. Malformed entries are
/// skipped with a warning.
fn parse_api_keys(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .filter_map(|pair| match pair.split_once(':') {
            Some((key, principal)) if !key.trim().is_empty() && !principal.trim().is_empty() => {
                Some((key.trim().to_string(), principal.trim().to_string()))
            }
            // Never log the entry itself, it may hold a key.
            _ => {
                warn!("Invalid API key entry (expected key:principal)");
                None
            }
        })
        .collect()
}
