use crate::core::{AdapterError, ErrorKind, Result, Row, TransportError};
use crate::transport::{TransportResponse, codes};
use serde_json::Value;
use std::collections::HashMap;

/// What a vendor error code means to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The single-row "no matching row" sentinel.
    NoRows,
    Failure(ErrorKind),
}

/// Vendor code -> classification. Unlisted codes are `Upstream`.
#[derive(Debug, Clone)]
pub struct ErrorCodeTable {
    entries: HashMap<String, Classification>,
}

impl ErrorCodeTable {
    /// A table with no entries: every error is `Upstream`.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, code: impl Into<String>, classification: Classification) -> Self {
        self.entries.insert(code.into(), classification);
        self
    }

    pub fn classify(&self, code: Option<&str>) -> Classification {
        let Some(code) = code else {
            return Classification::Failure(ErrorKind::Upstream);
        };
        // Caller-side aborts are failures of the round trip, never an absent row.
        if code == codes::CANCELLED || code == codes::TIMEOUT {
            return Classification::Failure(ErrorKind::Upstream);
        }
        self.entries
            .get(code)
            .copied()
            .unwrap_or(Classification::Failure(ErrorKind::Upstream))
    }
}

impl Default for ErrorCodeTable {
    fn default() -> Self {
        Self::empty()
            .with(codes::NO_ROWS, Classification::NoRows)
            .with(codes::UNIQUE_VIOLATION, Classification::Failure(ErrorKind::Conflict))
            .with(
                codes::FOREIGN_KEY_VIOLATION,
                Classification::Failure(ErrorKind::ReferentialIntegrity),
            )
    }
}

/// Maps `{data, error}` onto the adapter's result contract.
#[derive(Debug, Clone, Default)]
pub struct ResultNormalizer {
    codes: ErrorCodeTable,
}

impl ResultNormalizer {
    pub fn new(codes: ErrorCodeTable) -> Self {
        Self { codes }
    }

    /// Classifies a transport error for an operation where "no rows" is not
    /// an acceptable answer.
    pub fn classify(&self, error: TransportError) -> AdapterError {
        match self.codes.classify(error.code.as_deref()) {
            Classification::Failure(kind) => AdapterError::from_transport(kind, error),
            Classification::NoRows => AdapterError::Upstream(error),
        }
    }

    /// Single-row outcome: `Ok(None)` for the no-rows sentinel and for an
    /// empty payload.
    pub fn single(&self, response: TransportResponse) -> Result<Option<Row>> {
        if let Some(error) = response.error {
            return match self.codes.classify(error.code.as_deref()) {
                Classification::NoRows => Ok(None),
                Classification::Failure(kind) => Err(AdapterError::from_transport(kind, error)),
            };
        }

        match response.data {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(row)) => Ok(Some(row)),
            Some(Value::Array(items)) => match items.into_iter().next() {
                None => Ok(None),
                Some(Value::Object(row)) => Ok(Some(row)),
                Some(other) => Err(unexpected_shape(&other)),
            },
            Some(other) => Err(unexpected_shape(&other)),
        }
    }

    /// Collection outcome: always a vector, empty when the transport sent
    /// nothing.
    pub fn many(&self, response: TransportResponse) -> Result<Vec<Row>> {
        if let Some(error) = response.error {
            return Err(self.classify(error));
        }

        match response.data {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Object(row)) => Ok(vec![row]),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(unexpected_shape(&other)),
                })
                .collect(),
            Some(other) => Err(unexpected_shape(&other)),
        }
    }
}

fn unexpected_shape(value: &Value) -> AdapterError {
    AdapterError::Upstream(TransportError::uncoded(format!(
        "unexpected response shape, expected row object(s), got {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_table() {
        let table = ErrorCodeTable::default();
        assert_eq!(table.classify(Some("PGRST116")), Classification::NoRows);
        assert_eq!(
            table.classify(Some("23505")),
            Classification::Failure(ErrorKind::Conflict)
        );
        assert_eq!(
            table.classify(Some("23503")),
            Classification::Failure(ErrorKind::ReferentialIntegrity)
        );
        assert_eq!(
            table.classify(Some("42501")),
            Classification::Failure(ErrorKind::Upstream)
        );
        assert_eq!(table.classify(None), Classification::Failure(ErrorKind::Upstream));
    }

    #[test]
    fn test_cancellation_is_never_no_rows() {
        let table = ErrorCodeTable::default().with(codes::CANCELLED, Classification::NoRows);
        assert_eq!(
            table.classify(Some(codes::CANCELLED)),
            Classification::Failure(ErrorKind::Upstream)
        );
    }

    #[test]
    fn test_single_outcomes() {
        let normalizer = ResultNormalizer::default();

        let missing = TransportResponse::failure(TransportError::new("PGRST116", "no rows"));
        assert_eq!(normalizer.single(missing).unwrap(), None);

        assert_eq!(normalizer.single(TransportResponse::ok(json!([]))).unwrap(), None);
        assert_eq!(normalizer.single(TransportResponse::empty()).unwrap(), None);

        let row = normalizer
            .single(TransportResponse::ok(json!({"id": "u1"})))
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], json!("u1"));

        let row = normalizer
            .single(TransportResponse::ok(json!([{"id": "u2"}])))
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], json!("u2"));

        let err = normalizer
            .single(TransportResponse::failure(TransportError::new("23505", "dup")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.message(), "dup");
    }

    #[test]
    fn test_many_outcomes() {
        let normalizer = ResultNormalizer::default();
        assert!(normalizer.many(TransportResponse::empty()).unwrap().is_empty());
        assert!(normalizer.many(TransportResponse::ok(Value::Null)).unwrap().is_empty());
        assert_eq!(
            normalizer
                .many(TransportResponse::ok(json!([{"id": 1}, {"id": 2}])))
                .unwrap()
                .len(),
            2
        );

        let err = normalizer
            .many(TransportResponse::failure(TransportError::new("PGRST116", "no rows")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);

        let err = normalizer.many(TransportResponse::ok(json!([1, 2]))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
