//! PostgREST transport.
//!
//! One request per call: filters become query parameters, writes carry a
//! JSON body, and the single-row expectation is expressed through the
//! object `Accept` header so the server answers with the no-rows code.

use super::{Action, Transport, TransportRequest, TransportResponse};
use crate::config::RestConfig;
use crate::core::TransportError;
use crate::filter::Filter;
use async_trait::async_trait;
use reqwest::{Method, header};
use serde_json::Value;
use tracing::debug;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct RestTransport {
    client: reqwest::Client,
    config: RestConfig,
}

impl RestTransport {
    pub fn new(config: RestConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: RestConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), table)
    }

    async fn send(&self, request: &TransportRequest) -> TransportResponse {
        let method = match request.action {
            Action::Select => Method::GET,
            Action::Insert(_) => Method::POST,
            Action::Update(_) => Method::PATCH,
            Action::Delete => Method::DELETE,
        };
        let is_read = matches!(request.action, Action::Select);

        let mut builder = self
            .client
            .request(method, self.url(&request.table))
            .query(&query_pairs(request));

        if let Some(key) = &self.config.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }
        if let Some(schema) = &self.config.schema {
            let profile = if is_read { "Accept-Profile" } else { "Content-Profile" };
            builder = builder.header(profile, schema);
        }
        if request.single {
            builder = builder.header(header::ACCEPT, SINGLE_OBJECT);
        }
        if !is_read {
            let prefer = if request.columns.is_some() {
                "return=representation"
            } else {
                "return=minimal"
            };
            builder = builder.header("Prefer", prefer);
        }
        match &request.action {
            Action::Insert(rows) => builder = builder.json(rows),
            Action::Update(row) => builder = builder.json(row),
            Action::Select | Action::Delete => {}
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return TransportResponse::failure(TransportError::uncoded(err.to_string())),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return TransportResponse::failure(TransportError::uncoded(err.to_string())),
        };
        debug!(status = status.as_u16(), table = %request.table, "rest response");

        if status.is_success() {
            if body.trim().is_empty() {
                return TransportResponse::empty();
            }
            return match serde_json::from_str::<Value>(&body) {
                Ok(data) => TransportResponse::ok(data),
                Err(err) => TransportResponse::failure(TransportError::uncoded(format!(
                    "undecodable response body: {err}"
                ))),
            };
        }

        let error = serde_json::from_str::<TransportError>(&body)
            .unwrap_or_else(|_| TransportError::uncoded(format!("HTTP {status}: {body}")));
        TransportResponse::failure(error)
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn execute(&self, request: TransportRequest) -> TransportResponse {
        match request.context.guard(self.send(&request)).await {
            Ok(response) => response,
            Err(error) => TransportResponse::failure(error),
        }
    }
}

/// Query parameters for a request, in the order the primitives were applied.
pub fn query_pairs(request: &TransportRequest) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    if let Some(columns) = &request.columns {
        pairs.push(("select".to_string(), compact_select(columns)));
    }

    for filter in &request.filters {
        match filter {
            Filter::Match(equalities) => {
                for (column, literal) in equalities {
                    pairs.push((column.clone(), format!("eq.{literal}")));
                }
            }
            Filter::IsNull(column) => pairs.push((column.clone(), "is.null".to_string())),
            Filter::Or(expression) => pairs.push(("or".to_string(), format!("({expression})"))),
        }
    }

    if let Some(order) = &request.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = request.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }

    pairs
}

/// Drops whitespace outside double quotes, the way the select parameter is
/// expected on the wire.
fn compact_select(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quoted = false;
    for c in expression.chars() {
        if c == '"' {
            quoted = !quoted;
        }
        if quoted || !c.is_whitespace() {
            out.push(c);
        }
    }
    out
}
