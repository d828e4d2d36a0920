// ============================================================================
// relquery Library
// ============================================================================

//! ORM-shaped CRUD over a PostgREST-style table API.
//!
//! Application code speaks in entities and camelCase fields
//! (`findUnique`, `findMany`, `create`, ... with `where` / `data` /
//! `include` / `orderBy`); the backend only understands table requests with
//! primitive filters on snake_case columns. Each adapter call is translated
//! into exactly one transport request and the response is shaped back.
//!
//! ```
//! use relquery::{AdapterContext, EntitySchema, MemoryTransport, Operation, Registry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(MemoryTransport::new().table("tasks"));
//! let registry = Registry::builder(AdapterContext::default(), transport)
//!     .entity(EntitySchema::new("task", "tasks"))
//!     .build()?;
//!
//! let created = registry
//!     .dispatch("task", Operation::Create, &json!({"title": "Write docs", "ownerId": "u1"}))
//!     .await;
//! assert_eq!(created.row().unwrap()["ownerId"], json!("u1"));
//! # Ok::<(), relquery::AdapterError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod core;
pub mod entity;
pub mod filter;
pub mod naming;
pub mod registry;
pub mod relation;
pub mod result;
pub mod transport;

// Re-export main types for convenience
pub use config::{AdapterConfig, RestConfig};
pub use core::{AdapterError, ColumnDef, ColumnType, ErrorKind, Result, Row, TransportError};
pub use entity::{AdapterContext, EntityAdapter, EntitySchema, Operation, OrderSpec, QueryOptions};
pub use filter::{Condition, OrGroupPolicy, WhereSpec};
pub use naming::{NamingConverter, to_application_case, to_storage_case};
pub use registry::{Registry, RegistryBuilder};
pub use relation::{Cardinality, IncludeSpec, RelationDef};
pub use result::OperationResult;
pub use transport::{CallContext, MemoryTransport, RestTransport, Transport, cancel_pair};
