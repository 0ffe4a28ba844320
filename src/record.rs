//! Generic hierarchical property record.
//!
//! Every entity persisted in the coordination store (placement policies,
//! live-instance markers, observed state, messages, state-model definitions)
//! is a view over a [`Record`]: an id plus three field families.
//!
//! - simple fields: `name -> String`
//! - list fields: `name -> Vec<String>` (ordered)
//! - map fields: `name -> BTreeMap<String, String>`
//!
//! Field names are type-scoped enums defined next to each typed view in
//! [`crate::model`], so a reading component never guesses at raw strings.
//! Absent fields are distinguished from empty values: getters return
//! `Option`, and an entity that never wrote a field observes `None`, not an
//! empty collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A hierarchical property record, the unit of storage in the coordination
/// store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    #[serde(default)]
    simple_fields: BTreeMap<String, String>,
    #[serde(default)]
    list_fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    map_fields: BTreeMap<String, BTreeMap<String, String>>,
}

impl Record {
    /// Create an empty record with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Record {
            id: id.into(),
            ..Default::default()
        }
    }

    /// The record's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn simple_field(&self, name: &str) -> Option<&str> {
        self.simple_fields.get(name).map(String::as_str)
    }

    pub fn set_simple_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.simple_fields.insert(name.into(), value.into());
    }

    pub fn list_field(&self, name: &str) -> Option<&[String]> {
        self.list_fields.get(name).map(Vec::as_slice)
    }

    pub fn set_list_field(&mut self, name: impl Into<String>, value: Vec<String>) {
        self.list_fields.insert(name.into(), value);
    }

    pub fn map_field(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.map_fields.get(name)
    }

    pub fn set_map_field(&mut self, name: impl Into<String>, value: BTreeMap<String, String>) {
        self.map_fields.insert(name.into(), value);
    }

    /// Mutable access to a map field, creating it if absent.
    pub fn map_field_mut(&mut self, name: impl Into<String>) -> &mut BTreeMap<String, String> {
        self.map_fields.entry(name.into()).or_default()
    }

    /// Names of all list fields, in sorted order.
    pub fn list_field_names(&self) -> impl Iterator<Item = &str> {
        self.list_fields.keys().map(String::as_str)
    }

    /// Names of all map fields, in sorted order.
    pub fn map_field_names(&self) -> impl Iterator<Item = &str> {
        self.map_fields.keys().map(String::as_str)
    }
}
