//! Graph-query executor backends.
//!
//! The compiler hands over Cypher text plus named parameters; this crate runs
//! it and returns rows. Two backends:
//!
//! - `Http`: the Neo4j HTTP transaction API (`POST /db/{db}/tx/commit`) over
//!   a blocking client with a per-request timeout. The client is built per
//!   call and dropped on every exit path, so connections never outlive a
//!   request. No internal retries; failures propagate to the caller.
//! - `Fixture`: in-memory rows for tests, demos, and the offline `plan`
//!   command.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use calgraph_cypher::{CompiledQuery, Row};

#[cfg(feature = "neo4j-http")]
use std::time::Duration;

pub const NEO4J_HTTP_URL_ENV: &str = "NEO4J_HTTP_URL";
pub const NEO4J_DATABASE_ENV: &str = "NEO4J_DATABASE";
pub const NEO4J_USER_ENV: &str = "NEO4J_USER";
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";
/// Per-query timeout in seconds; 0 disables the timeout.
pub const QUERY_TIMEOUT_SECS_ENV: &str = "CALGRAPH_QUERY_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("store request failed: {0}")]
    Http(String),
    #[error("store error {code}: {message}")]
    Server { code: String, message: String },
    #[error("store returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("executor not configured: {0}")]
    NotConfigured(String),
}

/// Connection settings for the Neo4j HTTP transaction API.
#[cfg(feature = "neo4j-http")]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub timeout: Option<Duration>,
}

#[cfg(feature = "neo4j-http")]
impl HttpConfig {
    /// Read connection settings from the environment, with local-instance
    /// defaults matching a stock Neo4j install.
    pub fn from_env() -> Result<Self, ExecutorError> {
        let base_url = env_or(NEO4J_HTTP_URL_ENV, "http://127.0.0.1:7474");
        let database = env_or(NEO4J_DATABASE_ENV, "neo4j");
        let user = env_or(NEO4J_USER_ENV, "neo4j");
        let password = std::env::var(NEO4J_PASSWORD_ENV).unwrap_or_default();
        let timeout = match std::env::var(QUERY_TIMEOUT_SECS_ENV) {
            Err(_) => Some(Duration::from_secs(60)),
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ExecutorError::NotConfigured(format!(
                        "invalid {QUERY_TIMEOUT_SECS_ENV} value `{raw}`"
                    ))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };
        Ok(Self {
            base_url,
            database,
            user,
            password,
            timeout,
        })
    }
}

#[cfg(feature = "neo4j-http")]
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Where compiled queries run.
#[derive(Debug, Clone)]
pub enum ExecutorBackend {
    #[cfg(feature = "neo4j-http")]
    Http(HttpConfig),
    /// Canned rows, returned for any query. Used by tests and offline runs.
    Fixture(Vec<Row>),
}

impl ExecutorBackend {
    pub fn run(&self, query: &CompiledQuery) -> Result<Vec<Row>, ExecutorError> {
        match self {
            #[cfg(feature = "neo4j-http")]
            ExecutorBackend::Http(config) => run_http(config, query),
            ExecutorBackend::Fixture(rows) => {
                debug!(rows = rows.len(), "fixture executor returning canned rows");
                Ok(rows.clone())
            }
        }
    }
}

// Wire shape of a transaction-commit response. Only the fields we consume.
#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxDatum>,
}

#[derive(Debug, Deserialize)]
struct TxDatum {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[cfg(feature = "neo4j-http")]
fn run_http(config: &HttpConfig, query: &CompiledQuery) -> Result<Vec<Row>, ExecutorError> {
    let url = format!(
        "{}/db/{}/tx/commit",
        config.base_url.trim_end_matches('/'),
        config.database
    );
    let body = serde_json::json!({
        "statements": [{
            "statement": query.text,
            "parameters": query.params,
        }]
    });

    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder
        .build()
        .map_err(|e| ExecutorError::Http(format!("failed to build http client: {e}")))?;

    let resp = client
        .post(&url)
        .basic_auth(&config.user, Some(&config.password))
        .json(&body)
        .send()
        .map_err(|e| {
            ExecutorError::Http(format!(
                "failed to reach the graph store at {url} (is Neo4j running? set {NEO4J_HTTP_URL_ENV} to override): {e}"
            ))
        })?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(ExecutorError::Http(format!(
            "graph store http error {status}: {text}"
        )));
    }

    let tx: TxResponse = resp
        .json()
        .map_err(|e| ExecutorError::InvalidResponse(format!("invalid transaction response: {e}")))?;
    let rows = decode_tx_response(tx)?;
    debug!(rows = rows.len(), "query executed");
    Ok(rows)
}

/// Zip each row's values with the result's column names. Surfaces the first
/// server-side error entry instead of partial results.
fn decode_tx_response(tx: TxResponse) -> Result<Vec<Row>, ExecutorError> {
    if let Some(err) = tx.errors.into_iter().next() {
        return Err(ExecutorError::Server {
            code: err.code,
            message: err.message,
        });
    }
    let Some(result) = tx.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::with_capacity(result.data.len());
    for datum in result.data {
        if datum.row.len() != result.columns.len() {
            return Err(ExecutorError::InvalidResponse(format!(
                "row has {} values for {} columns",
                datum.row.len(),
                result.columns.len()
            )));
        }
        rows.push(
            result
                .columns
                .iter()
                .cloned()
                .zip(datum.row)
                .collect::<Row>(),
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn query() -> CompiledQuery {
        CompiledQuery {
            text: "MATCH (:Term {name:$term})-[:HAS_EVENT]->(e:Event)\nRETURN e.name AS name\n"
                .to_string(),
            params: BTreeMap::from([("term".to_string(), json!("Fall 2025"))]),
        }
    }

    #[test]
    fn fixture_backend_returns_its_rows() {
        let rows = vec![BTreeMap::from([
            ("name".to_string(), json!("Classes Begin")),
            ("start_date".to_string(), json!("2025-08-25")),
        ])];
        let exec = ExecutorBackend::Fixture(rows.clone());
        assert_eq!(exec.run(&query()).expect("rows"), rows);
    }

    #[test]
    fn decodes_columns_and_rows() {
        let tx: TxResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["name", "start_date"],
                "data": [
                    {"row": ["Classes Begin", "2025-08-25"]},
                    {"row": ["Final Exams", "2025-12-08"]}
                ]
            }],
            "errors": []
        }))
        .expect("parse");
        let rows = decode_tx_response(tx).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&json!("Classes Begin")));
        assert_eq!(rows[1].get("start_date"), Some(&json!("2025-12-08")));
    }

    #[test]
    fn surfaces_server_errors() {
        let tx: TxResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Statement.SyntaxError",
                "message": "Invalid input"
            }]
        }))
        .expect("parse");
        let err = decode_tx_response(tx).expect_err("server error");
        match err {
            ExecutorError::Server { code, .. } => {
                assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_results_mean_zero_rows() {
        let tx: TxResponse =
            serde_json::from_value(json!({"results": [], "errors": []})).expect("parse");
        assert_eq!(decode_tx_response(tx).expect("rows"), Vec::<Row>::new());
    }

    #[test]
    fn mismatched_row_width_is_invalid() {
        let tx: TxResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["name"],
                "data": [{"row": ["a", "b"]}]
            }],
            "errors": []
        }))
        .expect("parse");
        assert!(matches!(
            decode_tx_response(tx),
            Err(ExecutorError::InvalidResponse(_))
        ));
    }
}
