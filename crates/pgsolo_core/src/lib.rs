//! Core library for pgsolo, a single-connection PostgreSQL client.
//!
//! - **error**: Error taxonomy with PostgreSQL-specific details
//! - **models**: Connection config, query results, and event types
//! - **services**: The client, its driver seam, notifications, and secret obfuscation
//! - **format**: Helpers for splicing values into SQL text
//! - **logging**: Structured logging setup

pub mod error;
pub mod format;
pub mod logging;
pub mod models;
pub mod services;

#[cfg(test)]
mod verification_tests;

pub use error::{ErrorInfo, SoloError, SoloResult};
pub use models::{
    ClientEvent, ColumnInfo, ConnectionConfig, ConnectionOptions, ConnectionSource, EmitPolicy,
    EventPayload, LifecycleState, QueryResult, QueryType,
};
pub use services::{Driver, DriverConnection, PostgresDriver, SoloClient, SubscriptionId};
