use crate::core::{AdapterError, ErrorKind, Result};
use crate::entity::EntitySchema;
use crate::filter::OrGroupPolicy;
use crate::result::{Classification, ErrorCodeTable};
use crate::transport::codes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Adapter configuration
///
/// Usually loaded once at startup from a JSON document and handed to
/// [`Registry::from_config`](crate::Registry::from_config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// String values treated like `null` inside an OR-group
    pub null_sentinels: Vec<String>,

    /// What an OR-group with several equality conditions turns into
    pub or_group_policy: OrGroupPolicy,

    /// Vendor code the transport reports for a single-row read with no match
    pub no_rows_code: String,

    /// Extra vendor code classifications, on top of the built-in ones
    pub error_codes: HashMap<String, ErrorKind>,

    /// Modeled entities
    pub entities: Vec<EntitySchema>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            null_sentinels: Vec::new(),
            or_group_policy: OrGroupPolicy::default(),
            no_rows_code: codes::NO_ROWS.to_string(),
            error_codes: HashMap::new(),
            entities: Vec::new(),
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::validation(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Add a null sentinel
    pub fn null_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.null_sentinels.push(sentinel.into());
        self
    }

    /// Set the OR-group policy
    pub fn or_group_policy(mut self, policy: OrGroupPolicy) -> Self {
        self.or_group_policy = policy;
        self
    }

    /// Set the no-rows vendor code
    pub fn no_rows_code(mut self, code: impl Into<String>) -> Self {
        self.no_rows_code = code.into();
        self
    }

    /// Classify an additional vendor code
    pub fn error_code(mut self, code: impl Into<String>, kind: ErrorKind) -> Self {
        self.error_codes.insert(code.into(), kind);
        self
    }

    /// Add an entity
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.entities.push(schema);
        self
    }

    /// Builds the vendor code table described by this configuration.
    pub fn error_code_table(&self) -> ErrorCodeTable {
        let mut table = ErrorCodeTable::empty()
            .with(self.no_rows_code.clone(), Classification::NoRows)
            .with(codes::UNIQUE_VIOLATION, Classification::Failure(ErrorKind::Conflict))
            .with(
                codes::FOREIGN_KEY_VIOLATION,
                Classification::Failure(ErrorKind::ReferentialIntegrity),
            );
        for (code, kind) in &self.error_codes {
            table = table.with(code.clone(), Classification::Failure(*kind));
        }
        table
    }
}

/// Connection settings for [`RestTransport`](crate::transport::RestTransport).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Root of the REST API, e.g. `http://localhost:3000`
    pub base_url: String,

    /// Sent both as `apikey` and as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Schema profile (`Accept-Profile` / `Content-Profile`)
    #[serde(default)]
    pub schema: Option<String>,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            schema: None,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Reads `RELQUERY_URL` (required), `RELQUERY_API_KEY` and
    /// `RELQUERY_SCHEMA`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("RELQUERY_URL")
            .map_err(|_| AdapterError::validation("RELQUERY_URL is not set"))?;
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("RELQUERY_API_KEY").ok().filter(|v| !v.is_empty());
        config.schema = std::env::var("RELQUERY_SCHEMA").ok().filter(|v| !v.is_empty());
        Ok(config)
    }
}
