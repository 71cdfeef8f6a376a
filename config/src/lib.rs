//! Configuration types and loading for the catalog synchronization workspace.
//!
//! Every configuration type exposes a `validate` method so that invalid settings are rejected
//! when the process starts, before any connector touches the network.

pub mod environment;
mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};
