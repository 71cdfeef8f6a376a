use async_trait::async_trait;
use catalog_config::shared::{OdbcConnectionConfig, SourceType};
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

const BRIDGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Builds the ODBC connection string of `config`, without credentials.
pub fn connection_string(config: &OdbcConnectionConfig) -> String {
    if let Some(dsn) = config.dsn.as_deref().filter(|dsn| !dsn.trim().is_empty()) {
        return format!("DSN={};", dsn.trim());
    }

    let mut parts = Vec::with_capacity(3);
    if let Some(driver) = &config.driver {
        parts.push(format!("DRIVER={{{driver}}};"));
    }
    if let Some(server) = &config.server {
        parts.push(format!("SERVER={server};"));
    }
    if let Some(database) = &config.database {
        parts.push(format!("DATABASE={database};"));
    }

    parts.concat()
}

/// Connector for the desktop database, reached over ODBC through the SQL bridge.
#[derive(Debug)]
pub struct OdbcConnector<B = HttpBridgeClient> {
    name: String,
    login: BridgeLogin,
    allow_list: TableAllowList,
    client: B,
    session: Option<BridgeSession>,
}

impl OdbcConnector<HttpBridgeClient> {
    pub fn new(name: impl Into<String>, config: &OdbcConnectionConfig) -> EtlResult<Self> {
        config.validate()?;
        let client = HttpBridgeClient::new(&config.bridge_url, BRIDGE_REQUEST_TIMEOUT)?;

        Self::with_client(name, config, client)
    }
}

impl<B> OdbcConnector<B>
where
    B: BridgeClient,
{
    pub fn with_client(
        name: impl Into<String>,
        config: &OdbcConnectionConfig,
        client: B,
    ) -> EtlResult<Self> {
        config.validate()?;

        let Some(password) = config.password.clone() else {
            bail!(
                ErrorKind::ConfigurationError,
                "ODBC password is not configured"
            );
        };

        let mut attributes = Map::new();
        attributes.insert(
            "connection_string".to_owned(),
            Value::from(connection_string(config)),
        );
        if let Some(driver_path) = &config.driver_path {
            attributes.insert(
                "driver_path".to_owned(),
                Value::from(driver_path.to_string_lossy().into_owned()),
            );
        }

        Ok(Self {
            name: name.into(),
            login: BridgeLogin {
                driver: BridgeDriver::Odbc,
                attributes,
                username: config.username.clone(),
                password,
            },
            allow_list: TableAllowList::new(&config.allowed_tables, None),
            client,
            session: None,
        })
    }
}

#[async_trait]
impl<B> Connector for OdbcConnector<B>
where
    B: BridgeClient,
{
    fn source_type(&self) -> SourceType {
        SourceType::Odbc
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> EtlResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let session = self.client.open_session(&self.login).await?;
        info!(source = %self.name, session_id = %session.id, "connected to odbc source");
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
        debug!(source = %self.name, offset, size, "extracting odbc rows");

        self.client.query(session, &sql, params).await
    }

    async fn close(&mut self) -> EtlResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        self.client.close_session(&session).await?;
        info!(source = %self.name, "closed odbc connection");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::bridge::FakeBridgeClient;
    use secrecy::SecretString;

    fn config() -> OdbcConnectionConfig {
        OdbcConnectionConfig {
            bridge_url: "http://bridge:8081".to_string(),
            dsn: None,
            driver: Some("FileMaker ODBC".to_string()),
            server: Some("fm.internal".to_string()),
            database: Some("Catalog".to_string()),
            driver_path: None,
            username: "sync".to_string(),
            password: Some(SecretString::new("secret".to_string())),
            allowed_tables: vec!["Stock".to_string(), "Products".to_string()],
        }
    }

    #[test]
    fn connection_string_prefers_the_dsn() {
        let mut config = config();
        assert_eq!(
            connection_string(&config),
            "DRIVER={FileMaker ODBC};SERVER=fm.internal;DATABASE=Catalog;"
        );

        config.dsn = Some(" CatalogFM ".to_string());
        assert_eq!(connection_string(&config), "DSN=CatalogFM;");
    }

    #[tokio::test]
    async fn quoted_tables_are_checked_against_the_allow_list() {
        let client = FakeBridgeClient::new();
        let mut connector = OdbcConnector::with_client("fm", &config(), client.clone()).unwrap();
        connector.connect().await.unwrap();

        connector
            .extract_chunk(r#"SELECT "Stock"."On Hand" FROM "Stock""#, &[], 0, 5)
            .await
            .unwrap();

        let err = connector
            .extract_chunk(r#"SELECT * FROM "Customers""#, &[], 0, 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
        assert_eq!(client.queries().len(), 1);

        connector.close().await.unwrap();
        assert_eq!(client.sessions_closed(), 1);
    }
}
