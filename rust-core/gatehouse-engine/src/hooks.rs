// SPDX-License-Identifier: PMPL-1.0-or-later
//! Per-model extension points.
//!
//! Hooks run after the action's permission check and before the store is
//! touched, except [`ModelHooks::after_delete`], which runs once the document
//! is gone.

use async_trait::async_trait;
use gatehouse_authz::AuthorizationContext;
use gatehouse_storage::Document;
use serde_json::{Map, Value};

use crate::engine::Services;
use crate::error::EngineResult;

#[async_trait]
pub trait ModelHooks: Send + Sync {
    /// Extra checks on a create (`id` is `None`) or update. `body` is the raw
    /// request body, before field filtering.
    async fn before_write(
        &self,
        _services: &Services,
        _ctx: &AuthorizationContext,
        _id: Option<&str>,
        _body: &Map<String, Value>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Extra checks before a document is removed.
    async fn before_delete(
        &self,
        _services: &Services,
        _ctx: &AuthorizationContext,
        _id: &str,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Follow-up work after a successful removal. Cannot fail the deletion.
    async fn after_delete(&self, _services: &Services, _ctx: &AuthorizationContext, _removed: &Document) {}
}
