//! Data models for the pgsolo client.
//!
//! - `connection` - ConnectionConfig, ConnectionOptions, ConnectionSource, LifecycleState
//! - `query` - QueryResult, QueryType, ColumnInfo
//! - `events` - ClientEvent, EventPayload, EmitPolicy

pub mod connection;
pub mod events;
pub mod query;

pub use connection::{ConnectionConfig, ConnectionOptions, ConnectionSource, LifecycleState};
pub use events::{ClientEvent, EmitPolicy, EventPayload};
pub use query::{ColumnInfo, QueryResult, QueryType};
