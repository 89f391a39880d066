// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Permission tokens and the satisfaction rule.
//!
//! A permission token is an opaque string of the form `<action>:<entityType>`
//! (for example `update:role`) or the literal [`ADMIN`], which satisfies every
//! requirement.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// The superuser token.
pub const ADMIN: &str = "admin";

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The four CRUD actions a model can declare a permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    /// Token prefix for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the token `<action>:<entity_type>`.
pub fn token(action: Action, entity_type: &str) -> String {
    format!("{}:{}", action, entity_type)
}

// ---------------------------------------------------------------------------
// Declared per-entity permissions
// ---------------------------------------------------------------------------

/// The permission a model requires for each action.
///
/// `None` means the model does not offer the action at all. An empty token
/// (see [`EntityPermissions::public`]) offers the action to everyone,
/// anonymous callers included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPermissions {
    pub read: Option<String>,
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl EntityPermissions {
    /// Declare all four actions with their conventional tokens.
    pub fn crud(entity_type: &str) -> Self {
        Self::only(entity_type, &Action::ALL)
    }

    /// Declare only the listed actions.
    pub fn only(entity_type: &str, actions: &[Action]) -> Self {
        let mut permissions = Self::default();
        for &action in actions {
            permissions.set(action, token(action, entity_type));
        }
        permissions
    }

    /// Declare one action with an explicit token.
    pub fn set(&mut self, action: Action, token: impl Into<String>) {
        let slot = match action {
            Action::Read => &mut self.read,
            Action::Create => &mut self.create,
            Action::Update => &mut self.update,
            Action::Delete => &mut self.delete,
        };
        *slot = Some(token.into());
    }

    /// Offer `action` without any requirement.
    pub fn public(&mut self, action: Action) {
        self.set(action, String::new());
    }

    /// Requirement for `action`: `None` when it is not offered, an empty
    /// list when it is public.
    pub fn required(&self, action: Action) -> Option<Vec<String>> {
        self.for_action(action).map(|token| {
            if token.is_empty() {
                Vec::new()
            } else {
                vec![token.to_string()]
            }
        })
    }

    /// Token declared for `action`, or `None` when it is not offered.
    pub fn for_action(&self, action: Action) -> Option<&str> {
        match action {
            Action::Read => self.read.as_deref(),
            Action::Create => self.create.as_deref(),
            Action::Update => self.update.as_deref(),
            Action::Delete => self.delete.as_deref(),
        }
    }

    /// Every declared non-public token, in action order.
    pub fn tokens(&self) -> Vec<&str> {
        Action::ALL
            .iter()
            .filter_map(|&action| self.for_action(action))
            .filter(|token| !token.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Satisfaction
// ---------------------------------------------------------------------------

/// Whether `held` satisfies `required`.
///
/// An empty requirement is always satisfied. Holding [`ADMIN`] satisfies
/// everything. Otherwise every required token must be held.
pub fn satisfies<S: AsRef<str>>(held: &BTreeSet<String>, required: &[S]) -> bool {
    required.is_empty()
        || held.contains(ADMIN)
        || required.iter().all(|token| held.contains(token.as_ref()))
}

/// An ordered set of held permission tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of the permissions of every role.
    pub fn from_roles<'a, I>(roles: I) -> Self
    where
        I: IntoIterator<Item = &'a Role>,
    {
        roles
            .into_iter()
            .flat_map(|role| role.permissions.iter().cloned())
            .collect()
    }

    pub fn insert(&mut self, token: impl Into<String>) -> bool {
        self.0.insert(token.into())
    }

    pub fn remove(&mut self, token: &str) -> bool {
        self.0.remove(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn is_admin(&self) -> bool {
        self.contains(ADMIN)
    }

    /// See [`satisfies`].
    pub fn satisfies<S: AsRef<str>>(&self, required: &[S]) -> bool {
        satisfies(&self.0, required)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

impl Extend<String> for PermissionSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for PermissionSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
