// SPDX-License-Identifier: PMPL-1.0-or-later
//! Documents, equality filters and relation population specs.
//!
//! A [`Document`] serializes to a flat JSON object whose `_id` key holds the
//! opaque document id and whose other keys are the model fields. Relation
//! fields hold either an id string, an array of id strings, or (after
//! population) the referenced documents themselves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Name of the id key in serialized documents.
pub const ID_FIELD: &str = "_id";

/// A stored document: an opaque id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Document {
    /// Build a document. An `_id` key inside `fields` is discarded; the
    /// explicit `id` wins.
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.remove(ID_FIELD);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Parse a flat JSON object carrying a string `_id`.
    pub fn from_value(value: Value) -> Result<Self, StorageError> {
        let Value::Object(mut fields) = value else {
            return Err(StorageError::InvalidDocument(
                "document must be a JSON object".to_string(),
            ));
        };
        match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => Ok(Self { id, fields }),
            Some(other) => Err(StorageError::InvalidDocument(format!(
                "document id must be a string, got {}",
                other
            ))),
            None => Err(StorageError::InvalidDocument(
                "document has no _id".to_string(),
            )),
        }
    }

    /// The document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All fields except the id.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutable access to the fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Read one field. `_id` resolves to the document id.
    pub fn get(&self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return Some(Value::String(self.id.clone()));
        }
        self.fields.get(field).cloned()
    }

    /// Set one field. Setting `_id` is ignored.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if field != ID_FIELD {
            self.fields.insert(field, value);
        }
    }

    /// Overwrite every field present in `set`, leaving the others untouched.
    pub fn apply_set(&mut self, set: &Map<String, Value>) {
        for (field, value) in set {
            self.set(field.clone(), value.clone());
        }
    }

    /// The flat JSON representation, `_id` included.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        for (field, value) in &self.fields {
            object.insert(field.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// A conjunction of field equality conditions.
///
/// A condition on an array field matches when the array contains the value,
/// so `Filter::all().eq("roles", role_id)` finds every principal holding a
/// role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// The empty filter, matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// The conditions in insertion order.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `document` satisfies every condition.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            match document.get(field) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => &actual == expected,
                None => expected.is_null(),
            }
        })
    }
}

impl FromIterator<(String, Value)> for Filter {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}

/// Which relation fields to replace by the documents they reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    /// Field holding an id or an array of ids.
    pub path: String,
    /// Collection the ids point into.
    pub collection: String,
    /// Population applied to each referenced document in turn.
    #[serde(default)]
    pub nested: Vec<Population>,
}

impl Population {
    pub fn new(path: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<Population>) -> Self {
        self.nested = nested;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_flat_serialization() {
        let d = doc(json!({"_id": "u1", "roles": ["r1"]}));
        assert_eq!(d.id(), "u1");
        assert!(!d.fields().contains_key(ID_FIELD));
        assert_eq!(serde_json::to_value(&d).unwrap(), json!({"_id": "u1", "roles": ["r1"]}));
        assert_eq!(d.to_value(), json!({"_id": "u1", "roles": ["r1"]}));
    }

    #[test]
    fn test_from_value_rejects_bad_ids() {
        assert!(Document::from_value(json!({"name": "x"})).is_err());
        assert!(Document::from_value(json!({"_id": 7})).is_err());
        assert!(Document::from_value(json!(["_id"])).is_err());
    }

    #[test]
    fn test_set_cannot_change_id() {
        let mut d = doc(json!({"_id": "a", "name": "x"}));
        d.apply_set(json!({"_id": "b", "name": "y"}).as_object().unwrap());
        assert_eq!(d.id(), "a");
        assert_eq!(d.get("name"), Some(json!("y")));
    }

    #[test]
    fn test_filter_matching() {
        let d = doc(json!({"_id": "u1", "name": "alice", "roles": ["r1", "r2"]}));

        assert!(Filter::all().matches(&d));
        assert!(Filter::all().eq("name", "alice").matches(&d));
        assert!(Filter::all().eq("_id", "u1").matches(&d));
        assert!(Filter::all().eq("roles", "r2").matches(&d));
        assert!(!Filter::all().eq("roles", "r3").matches(&d));
        assert!(Filter::all().eq("roles", json!(["r1", "r2"])).matches(&d));
        assert!(!Filter::all().eq("name", "alice").eq("roles", "r9").matches(&d));
        assert!(Filter::all().eq("resource", Value::Null).matches(&d));
        assert!(!Filter::all().eq("resource", "x").matches(&d));
    }
}
