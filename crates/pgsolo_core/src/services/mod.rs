//! Client services.
//!
//! - `client` - The single-connection client and its lifecycle
//! - `driver` - Driver traits and the tokio-postgres implementation
//! - `events` - Handler registry for lifecycle notifications
//! - `obfuscation` - Reversible obfuscation of secrets in config files

pub mod client;
pub mod driver;
pub mod events;
pub mod obfuscation;

pub use client::SoloClient;
pub use driver::{Driver, DriverConnection, PostgresConnection, PostgresDriver};
pub use events::{EventDispatcher, EventHandler, SubscriptionId};
pub use obfuscation::{
    decode_secret, decode_secret_legacy, decode_secret_with_iv, encode_secret_legacy,
    encode_secret_with_iv, ObfuscatedSecret, Scheme,
};
