use crate::config::AdapterConfig;
use crate::core::{AdapterError, Result};
use crate::entity::{AdapterContext, EntityAdapter, EntitySchema, Operation};
use crate::result::OperationResult;
use crate::transport::{CallContext, Transport};
use log::info;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Entity name -> adapter, assembled once at startup.
///
/// There is no way to add or remove an entity after [`RegistryBuilder::build`];
/// share it behind an `Arc` across tasks.
pub struct Registry {
    adapters: HashMap<String, EntityAdapter>,
}

pub struct RegistryBuilder {
    context: Arc<AdapterContext>,
    transport: Arc<dyn Transport>,
    schemas: Vec<EntitySchema>,
}

impl RegistryBuilder {
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn entities(mut self, schemas: impl IntoIterator<Item = EntitySchema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let mut adapters = HashMap::with_capacity(self.schemas.len());

        for schema in self.schemas {
            validate_schema(&schema)?;
            if adapters.contains_key(&schema.name) {
                return Err(AdapterError::validation(format!(
                    "entity '{}' is registered twice",
                    schema.name
                )));
            }
            let adapter = EntityAdapter::new(schema, self.context.clone(), self.transport.clone());
            adapters.insert(adapter.name().to_string(), adapter);
        }

        info!(
            "Registry built with {} entities over '{}' transport",
            adapters.len(),
            self.transport.name()
        );
        Ok(Registry { adapters })
    }
}

impl Registry {
    pub fn builder(context: AdapterContext, transport: Arc<dyn Transport>) -> RegistryBuilder {
        RegistryBuilder {
            context: Arc::new(context),
            transport,
            schemas: Vec::new(),
        }
    }

    pub fn from_config(config: &AdapterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::builder(AdapterContext::from_config(config), transport)
            .entities(config.entities.iter().cloned())
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&EntityAdapter> {
        self.adapters.get(name)
    }

    /// Like [`get`](Self::get), with an unknown name reported as a
    /// validation error.
    pub fn entity(&self, name: &str) -> Result<&EntityAdapter> {
        self.get(name)
            .ok_or_else(|| AdapterError::validation(format!("unknown entity '{name}'")))
    }

    /// Registered entity names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Runs `op` on `entity` with the raw JSON call argument.
    pub async fn dispatch(&self, entity: &str, op: Operation, argument: &Value) -> OperationResult {
        self.dispatch_with(entity, op, argument, CallContext::default()).await
    }

    pub async fn dispatch_with(
        &self,
        entity: &str,
        op: Operation,
        argument: &Value,
        context: CallContext,
    ) -> OperationResult {
        match self.entity(entity) {
            Ok(adapter) => adapter.call(op, argument, context).await,
            Err(err) => OperationResult::Err(err),
        }
    }
}

fn validate_schema(schema: &EntitySchema) -> Result<()> {
    if schema.name.is_empty() || schema.table.is_empty() {
        return Err(AdapterError::validation(format!(
            "entity '{}' needs both a name and a table",
            schema.name
        )));
    }

    let mut seen = HashSet::new();
    for relation in &schema.relations {
        if !seen.insert(relation.name.as_str()) {
            return Err(AdapterError::validation(format!(
                "relation '{}' is declared twice on entity '{}'",
                relation.name, schema.name
            )));
        }
    }
    Ok(())
}
