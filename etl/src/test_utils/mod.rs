//! Test doubles and fixtures for connectors, stores and pipelines.
//!
//! - [`bridge`] fakes the SQL bridge transport of the ERP and ODBC connectors.
//! - [`connector`] provides an in-memory [`crate::connectors::Connector`] with injectable faults.
//! - [`store`] wraps [`crate::store::MemoryStore`] with injectable store failures.
//! - [`fixtures`] builds rows, pipeline configurations and fully wired pipelines.

pub mod bridge;
pub mod connector;
pub mod fixtures;
pub mod store;
