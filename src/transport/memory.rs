//! In-process transport over plain row vectors.
//!
//! Speaks the same primitives as the REST backend, including the parts the
//! adapter has to cope with: embedded relations always come back as arrays,
//! a single-row request that does not match exactly one row fails with the
//! no-rows code, and constraint violations carry the vendor codes.

use super::context::cancelled_error;
use super::{Action, OrderBy, Transport, TransportRequest, TransportResponse, codes};
use crate::core::{Row, TransportError};
use crate::filter::Filter;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::RwLock;

lazy_static! {
    static ref EMBED: Regex =
        Regex::new(r"^(?:([A-Za-z0-9_]+):)?([A-Za-z0-9_]+)(?:!([A-Za-z0-9_]+))?\((.*)\)$").unwrap();
}

static NULL: Value = Value::Null;

type Tables = HashMap<String, Vec<Row>>;
type Outcome<T> = std::result::Result<T, TransportError>;

/// Foreign key between two in-memory tables, restrict-on-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

pub struct MemoryTransport {
    tables: RwLock<Tables>,
    unique: Vec<(String, Vec<String>)>,
    foreign_keys: Vec<ForeignKey>,
    failures: Mutex<VecDeque<TransportError>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn table(mut self, name: &str) -> Self {
        self.tables.get_mut().entry(name.to_string()).or_default();
        self
    }

    pub fn unique(mut self, table: &str, columns: &[&str]) -> Self {
        self.unique.push((
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn foreign_key(mut self, table: &str, column: &str, ref_table: &str, ref_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: format!("{table}_{column}_fkey"),
            table: table.to_string(),
            column: column.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.to_string(),
        });
        self
    }

    /// Inserts rows as they are, bypassing constraints.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut tables = self.tables.write().await;
        let target = tables.entry(table.to_string()).or_default();
        target.extend(rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    /// Makes the next request fail with `error` before touching any table.
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).push_back(error);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn apply(&self, request: &TransportRequest) -> Outcome<Option<Value>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.get(&request.table) else {
            return Err(TransportError::new(
                codes::UNDEFINED_TABLE,
                format!("relation \"{}\" does not exist", request.table),
            ));
        };

        let (next, mut affected) = match &request.action {
            Action::Select => {
                let rows = select_matching(existing, &request.filters)?;
                (None, rows)
            }
            Action::Insert(payload) => {
                let (next, inserted) = self.insert(&tables, &request.table, payload)?;
                (Some(next), inserted)
            }
            Action::Update(patch) => {
                let (next, updated) = self.update(&tables, &request.table, &request.filters, patch)?;
                (Some(next), updated)
            }
            Action::Delete => {
                let (next, removed) = self.delete(&tables, &request.table, &request.filters)?;
                (Some(next), removed)
            }
        };

        // A write expecting one row is rolled back when it touched any other number.
        if request.single && next.is_some() && affected.len() != 1 {
            return Err(no_rows(affected.len()));
        }
        if let Some(next) = next {
            tables.insert(request.table.clone(), next);
        }

        let Some(columns) = &request.columns else {
            return Ok(None);
        };

        if let Some(order) = &request.order {
            sort_rows(&mut affected, order);
        }
        if let Some(limit) = request.limit {
            affected.truncate(limit);
        }

        let items = parse_select(columns)?;
        let projected = affected
            .iter()
            .map(|row| self.project(&tables, &request.table, row, &items))
            .collect::<Outcome<Vec<Row>>>()?;

        if request.single {
            if projected.len() != 1 {
                return Err(no_rows(projected.len()));
            }
            return Ok(projected.into_iter().next().map(Value::Object));
        }

        Ok(Some(Value::Array(projected.into_iter().map(Value::Object).collect())))
    }

    fn insert(&self, tables: &Tables, table: &str, payload: &Value) -> Outcome<(Vec<Row>, Vec<Row>)> {
        let incoming: Vec<Row> = match payload {
            Value::Object(row) => vec![row.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().cloned().ok_or_else(|| {
                        TransportError::new(codes::PARSE_ERROR, "insert payload must contain objects")
                    })
                })
                .collect::<Outcome<_>>()?,
            _ => {
                return Err(TransportError::new(
                    codes::PARSE_ERROR,
                    "insert payload must be an object or an array of objects",
                ));
            }
        };

        let mut next = tables.get(table).cloned().unwrap_or_default();
        let mut inserted = Vec::with_capacity(incoming.len());
        for mut row in incoming {
            if !row.contains_key("id") {
                row.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
            self.check_unique(table, &next, &row, None)?;
            self.check_references(tables, table, &next, &row)?;
            next.push(row.clone());
            inserted.push(row);
        }
        Ok((next, inserted))
    }

    fn update(
        &self,
        tables: &Tables,
        table: &str,
        filters: &[Filter],
        patch: &Row,
    ) -> Outcome<(Vec<Row>, Vec<Row>)> {
        let mut next = tables.get(table).cloned().unwrap_or_default();
        let mut touched = Vec::new();
        for (idx, row) in next.iter_mut().enumerate() {
            if row_matches(row, filters)? {
                for (key, value) in patch {
                    row.insert(key.clone(), value.clone());
                }
                touched.push(idx);
            }
        }

        for &idx in &touched {
            self.check_unique(table, &next, &next[idx], Some(idx))?;
            self.check_references(tables, table, &next, &next[idx])?;
        }

        let updated = touched.iter().map(|&idx| next[idx].clone()).collect();
        Ok((next, updated))
    }

    fn delete(&self, tables: &Tables, table: &str, filters: &[Filter]) -> Outcome<(Vec<Row>, Vec<Row>)> {
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for row in tables.get(table).cloned().unwrap_or_default() {
            if row_matches(&row, filters)? {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }

        for fk in self.foreign_keys.iter().filter(|fk| fk.ref_table == table) {
            let referencing: &[Row] = if fk.table == table {
                &kept
            } else {
                tables.get(&fk.table).map(Vec::as_slice).unwrap_or_default()
            };
            for row in &removed {
                let Some(key) = row.get(&fk.ref_column).and_then(as_text) else {
                    continue;
                };
                if referencing
                    .iter()
                    .any(|r| r.get(&fk.column).and_then(as_text).as_deref() == Some(key.as_str()))
                {
                    return Err(TransportError::new(
                        codes::FOREIGN_KEY_VIOLATION,
                        format!(
                            "update or delete on table \"{table}\" violates foreign key constraint \"{}\" on table \"{}\"",
                            fk.name, fk.table
                        ),
                    )
                    .with_details(format!(
                        "Key ({})=({key}) is still referenced from table \"{}\".",
                        fk.ref_column, fk.table
                    )));
                }
            }
        }

        Ok((kept, removed))
    }

    fn check_unique(&self, table: &str, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Outcome<()> {
        for (_, columns) in self.unique.iter().filter(|(t, _)| t == table) {
            let Some(key) = columns
                .iter()
                .map(|c| candidate.get(c).and_then(as_text))
                .collect::<Option<Vec<String>>>()
            else {
                continue;
            };

            let clash = rows.iter().enumerate().any(|(idx, row)| {
                Some(idx) != skip
                    && !std::ptr::eq(row, candidate)
                    && columns
                        .iter()
                        .zip(&key)
                        .all(|(c, v)| row.get(c).and_then(as_text).as_deref() == Some(v.as_str()))
            });

            if clash {
                return Err(TransportError::new(
                    codes::UNIQUE_VIOLATION,
                    format!(
                        "duplicate key value violates unique constraint \"{table}_{}_key\"",
                        columns.join("_")
                    ),
                )
                .with_details(format!("Key ({})=({}) already exists.", columns.join(", "), key.join(", "))));
            }
        }
        Ok(())
    }

    fn check_references(&self, tables: &Tables, table: &str, pending: &[Row], row: &Row) -> Outcome<()> {
        for fk in self.foreign_keys.iter().filter(|fk| fk.table == table) {
            let Some(value) = row.get(&fk.column).and_then(as_text) else {
                continue;
            };
            let targets: &[Row] = if fk.ref_table == table {
                pending
            } else {
                tables.get(&fk.ref_table).map(Vec::as_slice).unwrap_or_default()
            };
            let found = targets
                .iter()
                .any(|r| r.get(&fk.ref_column).and_then(as_text).as_deref() == Some(value.as_str()));
            if !found {
                return Err(TransportError::new(
                    codes::FOREIGN_KEY_VIOLATION,
                    format!(
                        "insert or update on table \"{table}\" violates foreign key constraint \"{}\"",
                        fk.name
                    ),
                )
                .with_details(format!(
                    "Key ({})=({value}) is not present in table \"{}\".",
                    fk.column, fk.ref_table
                )));
            }
        }
        Ok(())
    }

    fn project(&self, tables: &Tables, table: &str, row: &Row, items: &[SelectItem]) -> Outcome<Row> {
        let mut out = Row::new();
        for item in items {
            match item {
                SelectItem::Star => {
                    for (key, value) in row {
                        out.insert(key.clone(), value.clone());
                    }
                }
                SelectItem::Column(name) => {
                    if let Some(value) = row.get(name) {
                        out.insert(name.clone(), value.clone());
                    }
                }
                SelectItem::Embed { alias, table: target, hint, columns } => {
                    let related = self.related(tables, table, row, target, hint.as_deref())?;
                    let projected = related
                        .into_iter()
                        .map(|r| Value::Object(pick(r, columns)))
                        .collect();
                    let key = alias.clone().unwrap_or_else(|| target.clone());
                    out.insert(key, Value::Array(projected));
                }
            }
        }
        Ok(out)
    }

    /// Rows of `target` linked to `row`, in either foreign-key direction.
    fn related<'a>(
        &self,
        tables: &'a Tables,
        base: &str,
        row: &Row,
        target: &str,
        hint: Option<&str>,
    ) -> Outcome<Vec<&'a Row>> {
        let link = self
            .foreign_keys
            .iter()
            .filter(|fk| hint.is_none_or(|h| fk.name == h || fk.column == h))
            .find_map(|fk| {
                if fk.table == base && fk.ref_table == target {
                    Some((fk.column.as_str(), fk.ref_column.as_str()))
                } else if fk.table == target && fk.ref_table == base {
                    Some((fk.ref_column.as_str(), fk.column.as_str()))
                } else {
                    None
                }
            });

        let Some((local, remote)) = link else {
            return Err(TransportError::new(
                codes::NO_RELATIONSHIP,
                format!("Could not find a relationship between '{base}' and '{target}'"),
            ));
        };

        let Some(key) = row.get(local).and_then(as_text) else {
            return Ok(Vec::new());
        };
        Ok(tables
            .get(target)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(remote).and_then(as_text).as_deref() == Some(key.as_str()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn next_failure(&self) -> Option<TransportError> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, request: TransportRequest) -> TransportResponse {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if request.context.is_cancelled() {
            return TransportResponse::failure(cancelled_error());
        }
        if let Some(error) = self.next_failure() {
            return TransportResponse::failure(error);
        }

        match request.context.guard(self.apply(&request)).await {
            Ok(Ok(Some(data))) => TransportResponse::ok(data),
            Ok(Ok(None)) => TransportResponse::empty(),
            Ok(Err(error)) | Err(error) => TransportResponse::failure(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SelectItem {
    Star,
    Column(String),
    Embed {
        alias: Option<String>,
        table: String,
        hint: Option<String>,
        columns: Vec<String>,
    },
}

fn parse_select(expression: &str) -> Outcome<Vec<SelectItem>> {
    split_top_level(expression, '(', ')')
        .into_iter()
        .map(|part| {
            let part = part.trim();
            if part == "*" {
                return Ok(SelectItem::Star);
            }
            if let Some(caps) = EMBED.captures(part) {
                let columns = caps[4]
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                return Ok(SelectItem::Embed {
                    alias: caps.get(1).map(|m| m.as_str().to_string()),
                    table: caps[2].to_string(),
                    hint: caps.get(3).map(|m| m.as_str().to_string()),
                    columns,
                });
            }
            if !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Ok(SelectItem::Column(part.to_string()));
            }
            Err(TransportError::new(
                codes::PARSE_ERROR,
                format!("failed to parse select parameter ({expression})"),
            ))
        })
        .collect()
}

fn pick(row: &Row, columns: &[String]) -> Row {
    if columns.iter().any(|c| c == "*") {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

fn no_rows(count: usize) -> TransportError {
    TransportError::new(
        codes::NO_ROWS,
        "JSON object requested, multiple (or no) rows returned",
    )
    .with_details(format!("The result contains {count} rows"))
}

fn select_matching(rows: &[Row], filters: &[Filter]) -> Outcome<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        if row_matches(row, filters)? {
            out.push(row.clone());
        }
    }
    Ok(out)
}

fn row_matches(row: &Row, filters: &[Filter]) -> Outcome<bool> {
    for filter in filters {
        let hit = match filter {
            Filter::Match(pairs) => pairs
                .iter()
                .all(|(column, literal)| text_equals(row.get(column), literal)),
            Filter::IsNull(column) => row.get(column).is_none_or(Value::is_null),
            Filter::Or(expression) => {
                let mut any = false;
                for term in split_top_level(expression, '"', '"') {
                    if or_term_matches(row, term, expression)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn or_term_matches(row: &Row, term: &str, expression: &str) -> Outcome<bool> {
    let mut parts = term.splitn(3, '.');
    let (Some(column), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TransportError::new(
            codes::PARSE_ERROR,
            format!("\"failed to parse logic tree (({expression}))\""),
        ));
    };

    match (op, value) {
        ("is", "null") => Ok(row.get(column).is_none_or(Value::is_null)),
        ("eq", literal) => Ok(text_equals(row.get(column), &unquote(literal))),
        _ => Err(TransportError::new(
            codes::PARSE_ERROR,
            format!("unsupported operator in logic tree: {term}"),
        )),
    }
}

/// Splits on commas that are not inside `open`/`close` (parens or quotes).
fn split_top_level(input: &str, open: char, close: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut escaped = false;
    let quotes = open == close;

    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quotes && depth > 0 => escaped = true,
            c if quotes && c == open => depth = if depth == 0 { 1 } else { 0 },
            c if !quotes && c == open => depth += 1,
            c if !quotes && c == close => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(literal: &str) -> String {
    let Some(inner) = literal.strip_prefix('"').and_then(|l| l.strip_suffix('"')) else {
        return literal.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numbers compare by value, so a stored `1.0` equals the literal `1`.
fn text_equals(value: Option<&Value>, literal: &str) -> bool {
    match value {
        Some(Value::Number(n)) => {
            if let (Some(stored), Ok(wanted)) = (n.as_i64(), literal.parse::<i64>()) {
                return stored == wanted;
            }
            match (n.as_f64(), literal.parse::<f64>()) {
                (Some(stored), Ok(wanted)) => stored == wanted,
                _ => n.to_string() == literal,
            }
        }
        other => other.and_then(as_text).as_deref() == Some(literal),
    }
}

/// NULLs sort last ascending, first descending.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn sort_rows(rows: &mut [Row], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let left = a.get(&order.column).unwrap_or(&NULL);
        let right = b.get(&order.column).unwrap_or(&NULL);
        let ordering = compare_values(left, right);
        if order.ascending { ordering } else { ordering.reverse() }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_select_with_embeds() {
        let items = parse_select("*, user:users!tasks_user_id_fkey(id,email), tags(*)").unwrap();
        assert_eq!(
            items,
            vec![
                SelectItem::Star,
                SelectItem::Embed {
                    alias: Some("user".into()),
                    table: "users".into(),
                    hint: Some("tasks_user_id_fkey".into()),
                    columns: vec!["id".into(), "email".into()],
                },
                SelectItem::Embed {
                    alias: None,
                    table: "tags".into(),
                    hint: None,
                    columns: vec!["*".into()],
                },
            ]
        );
        assert!(parse_select("*, drop table").is_err());
    }

    #[test]
    fn test_or_expression_with_quoted_literal() {
        let Value::Object(row) = json!({"title": "a,b", "owner_id": null}) else {
            unreachable!()
        };
        let filters = vec![Filter::Or("title.eq.\"a,b\"".into())];
        assert!(row_matches(&row, &filters).unwrap());

        let filters = vec![Filter::Or("title.eq.zzz,owner_id.is.null".into())];
        assert!(row_matches(&row, &filters).unwrap());

        let filters = vec![Filter::Or("title.gt.1".into())];
        assert!(row_matches(&row, &filters).is_err());
    }

    #[test]
    fn test_numbers_match_by_value() {
        let Value::Object(row) = json!({"price": 1.0, "qty": 3, "code": "1.0"}) else {
            unreachable!()
        };
        assert!(row_matches(&row, &[Filter::Match(vec![("price".into(), "1".into())])]).unwrap());
        assert!(row_matches(&row, &[Filter::Or("price.eq.1,qty.eq.0".into())]).unwrap());
        assert!(row_matches(&row, &[Filter::Match(vec![("qty".into(), "3.0".into())])]).unwrap());
        assert!(!row_matches(&row, &[Filter::Match(vec![("price".into(), "1.5".into())])]).unwrap());
        assert!(!row_matches(&row, &[Filter::Match(vec![("code".into(), "1".into())])]).unwrap());
    }

    #[test]
    fn test_ordering_puts_nulls_last() {
        let mut rows: Vec<Row> = [json!({"n": 2}), json!({"n": null}), json!({"n": 1})]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        sort_rows(&mut rows, &OrderBy { column: "n".into(), ascending: true });
        let seen: Vec<Value> = rows.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(seen, vec![json!(1), json!(2), Value::Null]);
    }

    #[tokio::test]
    async fn test_single_without_match_reports_no_rows() {
        let transport = MemoryTransport::new().table("users");
        let response = transport
            .execute(
                TransportRequest::from("users")
                    .select("*")
                    .match_all(vec![("id".into(), "missing".into())])
                    .single(),
            )
            .await;
        assert_eq!(response.error.unwrap().code.as_deref(), Some(codes::NO_ROWS));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let transport = MemoryTransport::new();
        let response = transport.execute(TransportRequest::from("nope").select("*")).await;
        assert_eq!(
            response.error.unwrap().code.as_deref(),
            Some(codes::UNDEFINED_TABLE)
        );
    }
}
