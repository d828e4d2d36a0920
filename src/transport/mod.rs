//! Transport seam.
//!
//! The adapter never talks HTTP itself: it assembles one [`TransportRequest`]
//! per operation out of the primitive calls the backend understands
//! (`select`, `match`, `or`, `is`, `order`, `limit`, `insert`, `update`,
//! `delete`, `single`) and hands it to a [`Transport`], which answers with
//! `{data, error}`.
//!
//! - `context.rs` - caller-supplied cancellation and timeout, forwarded as is
//! - `memory.rs` - in-process table store speaking the same primitives
//! - `http.rs` - PostgREST client

mod context;
pub mod http;
pub mod memory;

pub use context::{CallContext, CancelHandle, CancelSignal, cancel_pair};
pub use http::RestTransport;
pub use memory::MemoryTransport;

use crate::core::{Row, TransportError};
use crate::filter::Filter;
use async_trait::async_trait;
use serde_json::Value;

/// Error codes spoken by PostgREST-style backends, plus the two the
/// transports report for caller-side cancellation.
pub mod codes {
    /// Single-row request matched zero (or several) rows.
    pub const NO_ROWS: &str = "PGRST116";
    /// Filter or select expression could not be parsed.
    pub const PARSE_ERROR: &str = "PGRST100";
    /// No relationship between the embedded tables.
    pub const NO_RELATIONSHIP: &str = "PGRST200";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const CANCELLED: &str = "CANCELLED";
    pub const TIMEOUT: &str = "TIMEOUT";
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Executes one request in one round trip.
    async fn execute(&self, request: TransportRequest) -> TransportResponse;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Select,
    /// One object or an array of objects.
    Insert(Value),
    Update(Row),
    Delete,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert(_) => "insert",
            Action::Update(_) => "update",
            Action::Delete => "delete",
        }
    }
}

/// Single-column ordering on a storage-side column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Everything the transport needs for one round trip.
///
/// Built with the primitive-named methods below; `columns` doubles as the
/// "return these columns" request on writes.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub table: String,
    pub action: Action,
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
    pub single: bool,
    pub context: CallContext,
}

impl TransportRequest {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            action: Action::Select,
            columns: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            single: false,
            context: CallContext::default(),
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn match_all(mut self, pairs: Vec<(String, String)>) -> Self {
        if !pairs.is_empty() {
            self.filters.push(Filter::Match(pairs));
        }
        self
    }

    pub fn or(mut self, expression: impl Into<String>) -> Self {
        self.filters.push(Filter::Or(expression.into()));
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.filters.push(Filter::IsNull(column.into()));
        self
    }

    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn insert(mut self, rows: Value) -> Self {
        self.action = Action::Insert(rows);
        self
    }

    pub fn update(mut self, row: Row) -> Self {
        self.action = Action::Update(row);
        self
    }

    pub fn delete(mut self) -> Self {
        self.action = Action::Delete;
        self
    }

    /// Expect exactly one row back, as an object rather than an array.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }
}

/// `{data, error}` as returned by the transport.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub data: Option<Value>,
    pub error: Option<TransportError>,
}

impl TransportResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failure(error: TransportError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }
}
