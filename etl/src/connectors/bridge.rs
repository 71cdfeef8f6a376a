//! Client side of the SQL bridge service.
//!
//! The ERP and the desktop database are not reachable from Rust drivers directly. A bridge
//! service holding the native drivers exposes a small JSON-over-HTTP protocol instead:
//!
//! - `POST {base}/sessions` opens a session and returns `{"session_id": "..."}`.
//! - `POST {base}/sessions/{id}/query` runs `{"sql": "...", "params": [...]}` and returns
//!   `{"columns": [...], "rows": [[...], ...]}`.
//! - `DELETE {base}/sessions/{id}` closes the session.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::Row;

/// Driver the bridge must use for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeDriver {
    Erp,
    Odbc,
}

/// Credentials and connection attributes of a bridge session.
#[derive(Debug, Clone)]
pub struct BridgeLogin {
    pub driver: BridgeDriver,
    /// Driver specific attributes such as host, library or ODBC connection string.
    pub attributes: Map<String, Value>,
    pub username: String,
    pub password: SecretString,
}

/// An open bridge session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeSession {
    #[serde(rename = "session_id")]
    pub id: String,
}

/// Transport used by the bridge-backed connectors.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    async fn open_session(&self, login: &BridgeLogin) -> EtlResult<BridgeSession>;

    async fn query(&self, session: &BridgeSession, sql: &str, params: &[Value]) -> EtlResult<Vec<Row>>;

    async fn close_session(&self, session: &BridgeSession) -> EtlResult<()>;
}

/// Appends the paging clause shared by both bridge dialects.
pub fn paginate(sql: &str, offset: usize, size: usize) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    format!("{sql} OFFSET {offset} ROWS FETCH FIRST {size} ROWS ONLY")
}

#[derive(Serialize)]
struct OpenSessionRequest<'a> {
    driver: BridgeDriver,
    attributes: &'a Map<String, Value>,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct QueryResponse {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl QueryResponse {
    fn into_rows(self) -> EtlResult<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for values in self.rows {
            if values.len() != self.columns.len() {
                bail!(
                    ErrorKind::DeserializationError,
                    "SQL bridge returned a row that does not match its columns",
                    format!("expected {} values, got {}", self.columns.len(), values.len())
                );
            }

            rows.push(self.columns.iter().cloned().zip(values).collect());
        }

        Ok(rows)
    }
}

/// [`BridgeClient`] speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBridgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBridgeClient {
    /// Creates a client for the bridge at `base_url`. No request is sent.
    ///
    /// `request_timeout` bounds every single HTTP request.
    pub fn new(base_url: &str, request_timeout: Duration) -> EtlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn check_status(response: reqwest::Response) -> EtlResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        let detail = format!("bridge returned status {status}: {body}");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => bail!(
                ErrorKind::AuthenticationFailed,
                "SQL bridge rejected the credentials",
                detail
            ),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => bail!(
                ErrorKind::NetworkTimeout,
                "SQL bridge timed out",
                detail
            ),
            status if status.is_server_error() => bail!(
                ErrorKind::SourceConnectionFailed,
                "SQL bridge failed to reach the source",
                detail
            ),
            _ => bail!(
                ErrorKind::SourceQueryFailed,
                "SQL bridge rejected the request",
                detail
            ),
        }
    }
}

#[async_trait]
impl BridgeClient for HttpBridgeClient {
    async fn open_session(&self, login: &BridgeLogin) -> EtlResult<BridgeSession> {
        let request = OpenSessionRequest {
            driver: login.driver,
            attributes: &login.attributes,
            username: &login.username,
            password: login.password.expose_secret(),
        };

        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;
        let session: BridgeSession = Self::check_status(response).await?.json().await?;

        debug!(session_id = %session.id, "opened bridge session");

        Ok(session)
    }

    async fn query(&self, session: &BridgeSession, sql: &str, params: &[Value]) -> EtlResult<Vec<Row>> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/query", self.base_url, session.id))
            .json(&QueryRequest { sql, params })
            .send()
            .await?;
        let result: QueryResponse = Self::check_status(response).await?.json().await?;

        result.into_rows()
    }

    async fn close_session(&self, session: &BridgeSession) -> EtlResult<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.base_url, session.id))
            .send()
            .await?;

        // The session is gone either way.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(response).await?;

        debug!(session_id = %session.id, "closed bridge session");

        Ok(())
    }
}
