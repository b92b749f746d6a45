//! Copies container images between Docker daemons that share no registry.

pub mod config;
pub mod error;
pub mod matcher;
pub mod migrate;
pub mod runtime;
pub mod types;

pub use error::{MigrateError, RuntimeError};
pub use migrate::Migrator;
pub use runtime::{DockerDaemon, ImageDaemon};
