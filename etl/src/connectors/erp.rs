use async_trait::async_trait;
use catalog_config::shared::{ErpConnectionConfig, SourceType};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::connectors::base::Connector;
use crate::connectors::bridge::{
    BridgeClient, BridgeDriver, BridgeLogin, BridgeSession, HttpBridgeClient, paginate,
};
use crate::connectors::security::TableAllowList;
use crate::error::{ErrorKind, EtlResult};
use crate::types::Row;
use crate::{bail, etl_error};

/// Timeout of a single HTTP request to the bridge.
const BRIDGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Connector for the midrange ERP database, reached through the SQL bridge.
#[derive(Debug)]
pub struct ErpConnector<B = HttpBridgeClient> {
    name: String,
    login: BridgeLogin,
    allow_list: TableAllowList,
    client: B,
    session: Option<BridgeSession>,
}

impl ErpConnector<HttpBridgeClient> {
    /// Validates `config` and creates a connector talking to the configured bridge URL.
    pub fn new(name: impl Into<String>, config: &ErpConnectionConfig) -> EtlResult<Self> {
        config.validate()?;
        let client = HttpBridgeClient::new(&config.bridge_url, BRIDGE_REQUEST_TIMEOUT)?;

        Self::with_client(name, config, client)
    }
}

impl<B> ErpConnector<B>
where
    B: BridgeClient,
{
    /// Validates `config` and creates a connector using `client` as transport.
    pub fn with_client(
        name: impl Into<String>,
        config: &ErpConnectionConfig,
        client: B,
    ) -> EtlResult<Self> {
        config.validate()?;

        let Some(password) = config.password.clone() else {
            bail!(
                ErrorKind::ConfigurationError,
                "ERP password is not configured"
            );
        };

        let mut attributes = Map::new();
        attributes.insert("host".to_owned(), Value::from(config.host.clone()));
        attributes.insert("port".to_owned(), Value::from(config.port));
        attributes.insert("library".to_owned(), Value::from(config.library.clone()));
        attributes.insert("naming".to_owned(), Value::from(config.naming.as_str()));

        Ok(Self {
            name: name.into(),
            login: BridgeLogin {
                driver: BridgeDriver::Erp,
                attributes,
                username: config.username.clone(),
                password,
            },
            allow_list: TableAllowList::new(&config.allowed_tables, Some(&config.library)),
            client,
            session: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[async_trait]
impl<B> Connector for ErpConnector<B>
where
    B: BridgeClient,
{
    fn source_type(&self) -> SourceType {
        SourceType::Erp
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> EtlResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let session = self.client.open_session(&self.login).await?;
        info!(source = %self.name, session_id = %session.id, "connected to erp");
        self.session = Some(session);

        Ok(())
    }

    async fn extract_chunk(
        &mut self,
        query: &str,
        params: &[Value],
        offset: usize,
        size: usize,
    ) -> EtlResult<Vec<Row>> {
        self.allow_list.check_query(query)?;

        let session = self.session.as_ref().ok_or_else(|| {
            etl_error!(
                ErrorKind::InvalidState,
                "Connector is not connected",
                self.name.clone()
            )
        })?;

        let sql = paginate(query, offset, size);
        debug!(source = %self.name, offset, size, "extracting erp rows");

        self.client.query(session, &sql, params).await
    }

    async fn close(&mut self) -> EtlResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        self.client.close_session(&session).await?;
        info!(source = %self.name, "closed erp connection");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::bridge::FakeBridgeClient;
    use catalog_config::shared::ErpNaming;
    use secrecy::SecretString;
    use serde_json::json;

    fn config() -> ErpConnectionConfig {
        ErpConnectionConfig {
            bridge_url: "http://bridge:8080".to_string(),
            host: "erp.internal".to_string(),
            port: ErpConnectionConfig::DEFAULT_PORT,
            library: "CATLIB".to_string(),
            username: "SYNC".to_string(),
            password: Some(SecretString::new("secret".to_string())),
            naming: ErpNaming::System,
            allowed_tables: vec!["CATLIB.*".to_string()],
        }
    }

    #[test]
    fn invalid_configuration_is_rejected_before_any_io() {
        let client = FakeBridgeClient::new();
        let mut config = config();
        config.password = None;

        let err = ErpConnector::with_client("erp", &config, client.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert_eq!(client.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn extracts_pages_through_the_bridge() {
        let client = FakeBridgeClient::new().with_rows(vec![
            serde_json::from_value(json!({"SPART": "AB-100 ", "SCLSK": "12"})).unwrap(),
        ]);
        let mut connector = ErpConnector::with_client("erp", &config(), client.clone()).unwrap();

        let err = connector
            .extract_chunk("SELECT * FROM INVBAL", &[], 0, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        connector.connect().await.unwrap();
        connector.connect().await.unwrap();
        assert_eq!(client.sessions_opened(), 1);

        let rows = connector
            .extract_chunk("SELECT * FROM CATLIB/INVBAL", &[], 20, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            client.queries(),
            vec!["SELECT * FROM CATLIB/INVBAL OFFSET 20 ROWS FETCH FIRST 10 ROWS ONLY".to_string()]
        );

        connector.close().await.unwrap();
        connector.close().await.unwrap();
        assert_eq!(client.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn tables_outside_the_allow_list_never_reach_the_bridge() {
        let client = FakeBridgeClient::new();
        let mut connector = ErpConnector::with_client("erp", &config(), client.clone()).unwrap();
        connector.connect().await.unwrap();

        let err = connector
            .extract_chunk("SELECT * FROM QSYS2.USER_INFO", &[], 0, 10)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
        assert!(client.queries().is_empty());
    }
}
