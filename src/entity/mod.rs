//! Per-entity CRUD facade.
//!
//! - `EntitySchema` - table, columns, relations and server-managed fields
//! - `options.rs` - call shapes (`Operation`, `QueryOptions`, `OrderSpec`)
//! - `adapter.rs` - `EntityAdapter`, one instance per modeled entity

mod adapter;
mod options;

pub use adapter::{AdapterContext, EntityAdapter};
pub use options::{Operation, OrderSpec, QueryOptions};

use crate::core::{ColumnDef, ColumnType};
use crate::relation::RelationDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of one modeled entity. Column and field names are
/// storage-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnDef>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Fields the server owns; stripped from create and update payloads.
    #[serde(default)]
    pub server_managed: Vec<String>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: BTreeMap::new(),
            relations: Vec::new(),
            server_managed: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.columns.insert(name.into(), def);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn server_managed(mut self, field: impl Into<String>) -> Self {
        self.server_managed.push(field.into());
        self
    }

    /// Columns whose values are carried without key conversion.
    pub fn opaque_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, def)| def.ty == ColumnType::Json)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
