use async_trait::async_trait;
use catalog_config::shared::SourceType;
use serde_json::Value;

use crate::error::EtlResult;
use crate::types::Row;

/// Number of rows fetched per page by the default [`Connector::extract`].
pub const DEFAULT_EXTRACT_PAGE_SIZE: usize = 1_000;

/// Shared contract of every source connector.
///
/// Implementations validate their configuration in their constructor, so a connector that
/// exists is always correctly configured. `connect` and `close` are idempotent and `close` is
/// safe to call on a connector that never connected. Every extraction checks the query against
/// the connector's table allow-list before anything is sent to the source.
#[async_trait]
pub trait Connector: Send {
    fn source_type(&self) -> SourceType;

    /// Name of the configured source, used in logs.
    fn name(&self) -> &str;

    async fn connect(&mut self) -> EtlResult<()>;

    /// Returns at most `size` rows of `query` starting at row `offset`.
    async fn extract_chunk(
        &mut self,
        query: &str,
        params: &[Value],
        offset: usize,
        size: usize,
    ) -> EtlResult<Vec<Row>>;

    /// Returns the whole result of `query`, up to `limit` rows.
    async fn extract(
        &mut self,
        query: &str,
        limit: Option<usize>,
        params: &[Value],
    ) -> EtlResult<Vec<Row>> {
        let mut rows = Vec::new();

        loop {
            let size = match limit {
                Some(limit) if rows.len() >= limit => break,
                Some(limit) => (limit - rows.len()).min(DEFAULT_EXTRACT_PAGE_SIZE),
                None => DEFAULT_EXTRACT_PAGE_SIZE,
            };

            let page = self.extract_chunk(query, params, rows.len(), size).await?;
            let exhausted = page.len() < size;
            rows.extend(page);

            if exhausted {
                break;
            }
        }

        Ok(rows)
    }

    async fn close(&mut self) -> EtlResult<()>;
}

#[async_trait]
impl Connector for Box<dyn Connector> {
    fn source_type(&self) -> SourceType {
        (**self).source_type()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn connect(&mut self) -> EtlResult<()> {
        (**self).connect().await
    }

    async fn extract_chunk(
        &mut self,
        query: &str,
        params: &[Value],
        offset: usize,
        size: usize,
    ) -> EtlResult<Vec<Row>> {
        (**self).extract_chunk(query, params, offset, size).await
    }

    async fn extract(
        &mut self,
        query: &str,
        limit: Option<usize>,
        params: &[Value],
    ) -> EtlResult<Vec<Row>> {
        (**self).extract(query, limit, params).await
    }

    async fn close(&mut self) -> EtlResult<()> {
        (**self).close().await
    }
}
