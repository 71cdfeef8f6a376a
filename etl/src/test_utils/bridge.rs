use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::connectors::bridge::{BridgeClient, BridgeLogin, BridgeSession};
use crate::error::EtlResult;
use crate::types::Row;

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Row>,
    queries: Mutex<Vec<String>>,
    logins: Mutex<Vec<BridgeLogin>>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

/// Bridge client answering every query with the same canned rows.
///
/// Clones share their state, so a test can keep a clone to inspect what a connector sent.
#[derive(Debug, Clone, Default)]
pub struct FakeBridgeClient {
    inner: Arc<Inner>,
}

impl FakeBridgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a client answering queries with `rows`.
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows,
                ..Inner::default()
            }),
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.inner.sessions_closed.load(Ordering::SeqCst)
    }

    /// Paginated SQL received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.inner.queries.lock().unwrap().clone()
    }

    pub fn logins(&self) -> Vec<BridgeLogin> {
        self.inner.logins.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeClient for FakeBridgeClient {
    async fn open_session(&self, login: &BridgeLogin) -> EtlResult<BridgeSession> {
        self.inner.logins.lock().unwrap().push(login.clone());
        let number = self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(BridgeSession {
            id: format!("session-{number}"),
        })
    }

    async fn query(&self, _session: &BridgeSession, sql: &str, _params: &[Value]) -> EtlResult<Vec<Row>> {
        self.inner.queries.lock().unwrap().push(sql.to_owned());

        Ok(self.inner.rows.clone())
    }

    async fn close_session(&self, _session: &BridgeSession) -> EtlResult<()> {
        self.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
