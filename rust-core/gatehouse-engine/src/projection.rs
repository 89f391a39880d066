// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Field-level output filtering.
//!
//! Output is built from the model's visibility list, never from the
//! document: a field reaches the caller only if it is listed and its rule
//! passes for the caller's context. Populated relations are filtered with the
//! target model's list and the same context.

use gatehouse_authz::AuthorizationContext;
use gatehouse_storage::Document;
use serde_json::{Map, Value};

use crate::model::{ModelDescriptor, ModelRegistry};

/// Projects documents through the registry's visibility rules.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    models: &'a ModelRegistry,
}

impl<'a> Projector<'a> {
    pub fn new(models: &'a ModelRegistry) -> Self {
        Self { models }
    }

    pub fn project_document(
        &self,
        document: &Document,
        descriptor: &ModelDescriptor,
        ctx: &AuthorizationContext,
    ) -> Map<String, Value> {
        match document.to_value() {
            Value::Object(fields) => self.project(&fields, descriptor, ctx),
            _ => Map::new(),
        }
    }

    /// Visible fields of `fields`.
    ///
    /// Projecting an already projected map with the same context returns it
    /// unchanged.
    pub fn project(
        &self,
        fields: &Map<String, Value>,
        descriptor: &ModelDescriptor,
        ctx: &AuthorizationContext,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for (field, visibility) in &descriptor.visibility {
            let Some(value) = fields.get(field) else {
                continue;
            };
            if !visibility.allows(ctx) {
                continue;
            }

            let target = descriptor
                .relation(field)
                .and_then(|relation| self.models.get(&relation.target_entity));
            let value = match target {
                Some(target) => self.project_related(value, target, ctx),
                None => value.clone(),
            };
            out.insert(field.clone(), value);
        }
        out
    }

    fn project_related(
        &self,
        value: &Value,
        target: &ModelDescriptor,
        ctx: &AuthorizationContext,
    ) -> Value {
        match value {
            Value::Object(related) => Value::Object(self.project(related, target, ctx)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.project_related(item, target, ctx))
                    .collect(),
            ),
            // Unpopulated id or null.
            other => other.clone(),
        }
    }
}
