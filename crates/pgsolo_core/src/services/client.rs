//! Single-connection client with lifecycle notifications.
//!
//! [`SoloClient`] owns at most one driver connection. `connect`, `execute` and
//! `disconnect` are serialized per client by an async mutex around the connection
//! slot, and the lifecycle state only changes while that mutex is held.

use crate::error::{SoloError, SoloResult};
use crate::models::{
    ClientEvent, ConnectionSource, EmitPolicy, EventPayload, LifecycleState, QueryResult,
};
use crate::services::driver::{Driver, DriverConnection, PostgresDriver};
use crate::services::events::{EventDispatcher, SubscriptionId};

use parking_lot::RwLock;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use uuid::Uuid;

/// Payload of the `connect` event.
pub const CONNECTED_MESSAGE: &str = "Connected";

/// Payload of the `disconnect` event.
pub const DISCONNECTED_MESSAGE: &str = "Disconnected";

/// Payload of the `warning` event raised by a reconnect.
pub const RECONNECT_WARNING: &str = "connect called on live connection; reconnecting";

/// A client for one database connection at a time.
///
/// Notifications are published through an [`EventDispatcher`] and filtered by a
/// per-client [`EmitPolicy`].
pub struct SoloClient<D: Driver = PostgresDriver> {
    /// Identifies this client in logs
    id: Uuid,
    driver: D,
    /// Present if and only if `state` is `Connected`
    connection: Mutex<Option<D::Connection>>,
    state: RwLock<LifecycleState>,
    emit_policy: RwLock<EmitPolicy>,
    events: EventDispatcher,
}

impl SoloClient<PostgresDriver> {
    /// Create a disconnected client backed by tokio-postgres.
    pub fn new() -> Self {
        Self::with_driver(PostgresDriver::new())
    }
}

impl Default for SoloClient<PostgresDriver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Driver> SoloClient<D> {
    /// Create a disconnected client using the given driver.
    pub fn with_driver(driver: D) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(client_id = %id, "Client created");
        Self {
            id,
            driver,
            connection: Mutex::new(None),
            state: RwLock::new(LifecycleState::Disconnected),
            emit_policy: RwLock::new(EmitPolicy::default()),
            events: EventDispatcher::new(),
        }
    }

    /// Get the client's identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Check if a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    // ========== Notifications ==========

    /// Get a copy of the emit policy.
    pub fn emit_policy(&self) -> EmitPolicy {
        *self.emit_policy.read()
    }

    /// Replace the emit policy. Applies from the next event on.
    pub fn set_emit_policy(&self, policy: EmitPolicy) {
        *self.emit_policy.write() = policy;
    }

    /// Enable or disable a single event.
    pub fn set_event_enabled(&self, event: ClientEvent, enabled: bool) {
        self.emit_policy.write().set(event, enabled);
    }

    /// Register a handler for every occurrence of `event`.
    pub fn subscribe<F>(&self, event: ClientEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler)
    }

    /// Register a handler for the next occurrence of `event` only.
    pub fn once<F>(&self, event: ClientEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.events.once(event, handler)
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Get the event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    fn is_enabled(&self, event: ClientEvent) -> bool {
        self.emit_policy.read().is_enabled(event)
    }

    fn emit(&self, event: ClientEvent, payload: EventPayload<'_>) {
        if self.is_enabled(event) {
            self.events.publish(event, &payload);
        }
    }

    fn emit_error(&self, err: &SoloError) {
        if self.is_enabled(ClientEvent::Error) {
            let message = err.to_string();
            self.events.publish(ClientEvent::Error, &EventPayload::Message(&message));
        }
    }

    // ========== Lifecycle ==========

    /// Open a connection.
    ///
    /// Accepts a [`ConnectionConfig`](crate::models::ConnectionConfig) or a connection
    /// URI. Obfuscated credentials are decoded first. If a connection is already open,
    /// a `warning` is published and it is closed before the new one is opened; if that
    /// close fails, its [`SoloError::Disconnection`] is returned and no new connection
    /// is attempted.
    pub async fn connect(&self, source: impl Into<ConnectionSource>) -> SoloResult<()> {
        let source = source.into();
        let mut slot = self.connection.lock().await;

        if slot.is_some() {
            tracing::warn!(client_id = %self.id, "{RECONNECT_WARNING}");
            self.emit(ClientEvent::Warning, EventPayload::Message(RECONNECT_WARNING));
            self.close_slot(&mut slot).await?;
        }

        let config = match source.normalize() {
            Ok(config) => config,
            Err(e) => {
                let err = e.into_connection();
                tracing::error!(client_id = %self.id, error = %err, "Invalid connection parameters");
                self.emit_error(&err);
                return Err(err);
            }
        };

        tracing::debug!(client_id = %self.id, url = %config.display_url(), "Opening connection");

        match self.driver.open(&config).await {
            Ok(conn) => {
                *slot = Some(conn);
                *self.state.write() = LifecycleState::Connected;
                tracing::info!(client_id = %self.id, url = %config.display_url(), "Connected");
                self.emit(ClientEvent::Connect, EventPayload::Message(CONNECTED_MESSAGE));
                Ok(())
            }
            Err(e) => {
                let err = e.into_connection();
                tracing::error!(client_id = %self.id, error = %err, "Connection failed");
                self.emit_error(&err);
                Err(err)
            }
        }
    }

    /// Close the connection. Succeeds without any notification if none is open.
    ///
    /// If closing fails the client stays `Connected`, since the server side may
    /// still be open.
    pub async fn disconnect(&self) -> SoloResult<()> {
        let mut slot = self.connection.lock().await;
        self.close_slot(&mut slot).await
    }

    async fn close_slot(&self, slot: &mut Option<D::Connection>) -> SoloResult<()> {
        let Some(conn) = slot.as_mut() else {
            tracing::trace!(client_id = %self.id, "Disconnect on idle client");
            return Ok(());
        };

        match conn.close().await {
            Ok(()) => {
                *slot = None;
                *self.state.write() = LifecycleState::Disconnected;
                tracing::info!(client_id = %self.id, "Disconnected");
                self.emit(ClientEvent::Disconnect, EventPayload::Message(DISCONNECTED_MESSAGE));
                Ok(())
            }
            Err(e) => {
                let err = e.into_disconnection();
                tracing::error!(client_id = %self.id, error = %err, "Disconnect failed");
                self.emit_error(&err);
                Err(err)
            }
        }
    }

    /// Execute one statement.
    ///
    /// Publishes `query` with the literal statement before dispatch and, when
    /// enabled, `results` with the full result afterwards.
    pub async fn execute(&self, sql: &str) -> SoloResult<QueryResult> {
        let slot = self.connection.lock().await;
        let Some(conn) = slot.as_ref() else {
            tracing::debug!(client_id = %self.id, "Execute on disconnected client");
            return Err(SoloError::NotConnected);
        };

        self.emit(ClientEvent::Query, EventPayload::Query(sql));
        tracing::debug!(client_id = %self.id, "Executing statement");

        match conn.execute(sql).await {
            Ok(result) => {
                self.emit(ClientEvent::Results, EventPayload::Results(&result));
                Ok(result)
            }
            Err(e) => {
                let err = e.into_query();
                tracing::warn!(
                    client_id = %self.id,
                    error = %err,
                    code = err.pg_code().unwrap_or(""),
                    "Statement failed"
                );
                self.emit_error(&err);
                Err(err)
            }
        }
    }

    /// Borrow the driver's connection handle, if one is open.
    ///
    /// Other operations on this client wait while the guard is held. Closing the
    /// connection through the handle instead of [`SoloClient::disconnect`] leaves
    /// this client believing it is still connected.
    pub async fn underlying_handle(&self) -> Option<MappedMutexGuard<'_, D::Connection>> {
        let guard = self.connection.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).ok()
    }
}

impl<D: Driver> std::fmt::Debug for SoloClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoloClient")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("emit_policy", &self.emit_policy())
            .field("events", &self.events)
            .finish()
    }
}
