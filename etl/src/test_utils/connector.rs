use async_trait::async_trait;
use catalog_config::shared::SourceType;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bail;
use crate::connectors::base::Connector;
use crate::error::{ErrorKind, EtlResult};
use crate::types::Row;

/// Calls observed by a [`MockConnector`], shared with its [`MockConnectorHandle`]s.
#[derive(Debug, Default)]
struct Calls {
    connect_attempts: AtomicUsize,
    closes: AtomicUsize,
    /// `(offset, size)` of every extraction that reached the rows.
    pages: Mutex<Vec<(usize, usize)>>,
    queries: Mutex<Vec<String>>,
}

/// Observer of the calls made on a [`MockConnector`] after it moved into a pipeline.
#[derive(Debug, Clone)]
pub struct MockConnectorHandle {
    calls: Arc<Calls>,
}

impl MockConnectorHandle {
    pub fn connect_attempts(&self) -> usize {
        self.calls.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.calls.closes.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<(usize, usize)> {
        self.calls.pages.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.queries.lock().unwrap().clone()
    }
}

/// In-memory connector serving a fixed set of rows page by page.
///
/// Faults can be injected on connect, on a given extraction offset and on close. Extraction
/// delays let tests drive deadlines with a paused clock.
#[derive(Debug)]
pub struct MockConnector {
    name: String,
    source_type: SourceType,
    rows: Vec<Row>,
    connected: bool,
    /// Kind and number of connect attempts that still fail.
    connect_failures: Option<(ErrorKind, usize)>,
    panic_on_connect: bool,
    fail_extract_at: Option<(usize, ErrorKind)>,
    fail_close: bool,
    extract_delay: Option<Duration>,
    calls: Arc<Calls>,
}

impl MockConnector {
    pub fn new(source_type: SourceType, rows: Vec<Row>) -> Self {
        Self {
            name: format!("mock-{source_type}"),
            source_type,
            rows,
            connected: false,
            connect_failures: None,
            panic_on_connect: false,
            fail_extract_at: None,
            fail_close: false,
            extract_delay: None,
            calls: Arc::new(Calls::default()),
        }
    }

    /// Fails the first `attempts` connects with `kind`.
    pub fn failing_connect(mut self, kind: ErrorKind, attempts: usize) -> Self {
        self.connect_failures = Some((kind, attempts));
        self
    }

    pub fn panicking_connect(mut self) -> Self {
        self.panic_on_connect = true;
        self
    }

    /// Fails the extraction starting at row `offset` with `kind`.
    pub fn failing_extract_at(mut self, offset: usize, kind: ErrorKind) -> Self {
        self.fail_extract_at = Some((offset, kind));
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = Some(delay);
        self
    }

    pub fn handle(&self) -> MockConnectorHandle {
        MockConnectorHandle {
            calls: self.calls.clone(),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> EtlResult<()> {
        self.calls.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if self.panic_on_connect {
            panic!("mock connector panicked while connecting");
        }

        if let Some((kind, remaining)) = self.connect_failures.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                bail!(*kind, "Mock connect failure", self.name);
            }
        }

        self.connected = true;

        Ok(())
    }

    async fn extract_chunk(
        &mut self,
        query: &str,
        _params: &[Value],
        offset: usize,
        size: usize,
    ) -> EtlResult<Vec<Row>> {
        if !self.connected {
            bail!(ErrorKind::InvalidState, "Mock connector is not connected");
        }

        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((failing_offset, kind)) = self.fail_extract_at {
            if failing_offset == offset {
                bail!(kind, "Mock extract failure", format!("offset {offset}"));
            }
        }

        self.calls.queries.lock().unwrap().push(query.to_owned());
        self.calls.pages.lock().unwrap().push((offset, size));

        Ok(self.rows.iter().skip(offset).take(size).cloned().collect())
    }

    async fn close(&mut self) -> EtlResult<()> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        self.connected = false;

        if self.fail_close {
            bail!(ErrorKind::SourceIoError, "Mock close failure");
        }

        Ok(())
    }
}
