// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Gatehouse Authorization
//!
//! Resolves what a principal may do in one operation:
//!
//! - [`permission`]: permission tokens, the `admin` superuser token and the
//!   satisfaction rule.
//! - [`role`]: global and resource-scoped roles, persisted through the
//!   document store, with cascading reference cleanup on deletion.
//! - [`context`]: the per-operation [`AuthorizationContext`] and the
//!   [`Resolver`] that builds it, including the escalation guard used when a
//!   principal edits roles.
//!
//! Contexts are never cached or shared between operations.

pub mod context;
pub mod error;
pub mod permission;
pub mod role;

pub use context::{AuthorizationContext, Principal, Resolver};
pub use error::{AuthzError, AuthzResult};
pub use permission::{satisfies, token, Action, EntityPermissions, PermissionSet, ADMIN};
pub use role::{
    ReferenceCleanup, Role, RoleChanges, RoleRegistry, PRINCIPALS_COLLECTION, ROLES_COLLECTION,
    ROLES_FIELD,
};
