mod normalizer;

pub use normalizer::{Classification, ErrorCodeTable, ResultNormalizer};

use crate::core::{AdapterError, ErrorKind, Result, Row};
use serde_json::Value;

/// Uniform outcome of one adapter operation.
///
/// Exactly one variant per call. `NotFound` is neither an error nor an
/// empty collection: collections answer `Rows(vec![])`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Row(Row),
    Rows(Vec<Row>),
    NotFound,
    Err(AdapterError),
}

impl OperationResult {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperationResult::NotFound)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Row(_) | OperationResult::Rows(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Err(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn row(&self) -> Option<&Row> {
        match self {
            OperationResult::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            OperationResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Successful payload as JSON; `None` for `NotFound` and errors.
    pub fn into_json(self) -> Option<Value> {
        match self {
            OperationResult::Row(row) => Some(Value::Object(row)),
            OperationResult::Rows(rows) => Some(Value::Array(rows.into_iter().map(Value::Object).collect())),
            OperationResult::NotFound | OperationResult::Err(_) => None,
        }
    }
}

impl From<Result<Option<Row>>> for OperationResult {
    fn from(result: Result<Option<Row>>) -> Self {
        match result {
            Ok(Some(row)) => OperationResult::Row(row),
            Ok(None) => OperationResult::NotFound,
            Err(err) => OperationResult::Err(err),
        }
    }
}

impl From<Result<Vec<Row>>> for OperationResult {
    fn from(result: Result<Vec<Row>>) -> Self {
        match result {
            Ok(rows) => OperationResult::Rows(rows),
            Err(err) => OperationResult::Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let found: OperationResult = Ok(Some(Row::new())).into();
        assert!(found.is_ok());
        assert!(found.row().is_some());

        let missing: OperationResult = Ok::<Option<Row>, AdapterError>(None).into();
        assert!(missing.is_not_found());
        assert!(missing.clone().into_json().is_none());

        let empty: OperationResult = Ok::<Vec<Row>, AdapterError>(Vec::new()).into();
        assert_eq!(empty.rows().map(<[Row]>::len), Some(0));
        assert!(!empty.is_not_found());

        let failed: OperationResult = Err::<Vec<Row>, _>(AdapterError::validation("bad")).into();
        assert_eq!(failed.error_kind(), Some(ErrorKind::Validation));
    }
}
