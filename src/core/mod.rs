pub mod error;
pub mod value;

pub use error::{AdapterError, ErrorKind, Result, TransportError};
pub use value::{ColumnDef, ColumnType, Row};
