//! Source connectors.
//!
//! The ERP and the desktop database are queried through the SQL bridge, flat files are read
//! locally. All connectors implement [`base::Connector`] and check every query against a table
//! allow-list before it reaches the source.

pub mod base;
pub mod bridge;
pub mod erp;
pub mod file;
pub mod odbc;
pub mod security;

pub use base::Connector;
pub use erp::ErpConnector;
pub use file::FileConnector;
pub use odbc::OdbcConnector;
