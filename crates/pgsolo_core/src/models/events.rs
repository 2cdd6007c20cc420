//! Lifecycle notification models.

use crate::error::SoloError;
use crate::models::QueryResult;

use serde::{Deserialize, Serialize};

/// Notifications published by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientEvent {
    /// A connection was opened
    Connect,
    /// The connection was closed
    Disconnect,
    /// A lifecycle operation failed
    Error,
    /// A statement is about to be dispatched
    Query,
    /// A statement produced results
    Results,
    /// Something unusual happened that did not fail the operation
    Warning,
}

impl ClientEvent {
    /// All events, in declaration order.
    pub const ALL: [ClientEvent; 6] = [
        Self::Connect,
        Self::Disconnect,
        Self::Error,
        Self::Query,
        Self::Results,
        Self::Warning,
    ];

    /// Event name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
            Self::Query => "query",
            Self::Results => "results",
            Self::Warning => "warning",
        }
    }
}

impl std::str::FromStr for ClientEvent {
    type Err = SoloError;

    /// Parse an event name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SoloError::config(format!("unknown event: {s}")))
    }
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to every handler of an event.
#[derive(Debug, Clone, Copy)]
pub enum EventPayload<'a> {
    /// Human-readable message (connect, disconnect, error, warning)
    Message(&'a str),
    /// Literal statement text (query)
    Query(&'a str),
    /// Full result of a statement (results)
    Results(&'a QueryResult),
}

impl<'a> EventPayload<'a> {
    /// Get the message or statement text, if this payload carries text.
    pub fn text(&self) -> Option<&'a str> {
        match *self {
            Self::Message(text) | Self::Query(text) => Some(text),
            Self::Results(_) => None,
        }
    }

    /// Get the result, if this is a results payload.
    pub fn results(&self) -> Option<&'a QueryResult> {
        match *self {
            Self::Results(result) => Some(result),
            _ => None,
        }
    }
}

/// Which events are published.
///
/// Read at the moment an event would fire, so changes apply to the next event.
/// By default every event is enabled except `results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitPolicy {
    /// Publish `connect`
    pub connect: bool,
    /// Publish `disconnect`
    pub disconnect: bool,
    /// Publish `error`
    pub error: bool,
    /// Publish `query`
    pub query: bool,
    /// Publish `results`
    pub results: bool,
    /// Publish `warning`
    pub warning: bool,
}

impl Default for EmitPolicy {
    fn default() -> Self {
        Self {
            connect: true,
            disconnect: true,
            error: true,
            query: true,
            results: false,
            warning: true,
        }
    }
}

impl EmitPolicy {
    /// A policy with every event enabled.
    pub fn all() -> Self {
        Self::uniform(true)
    }

    /// A policy with every event disabled.
    pub fn none() -> Self {
        Self::uniform(false)
    }

    fn uniform(enabled: bool) -> Self {
        Self {
            connect: enabled,
            disconnect: enabled,
            error: enabled,
            query: enabled,
            results: enabled,
            warning: enabled,
        }
    }

    /// Check whether an event is enabled.
    pub fn is_enabled(&self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Connect => self.connect,
            ClientEvent::Disconnect => self.disconnect,
            ClientEvent::Error => self.error,
            ClientEvent::Query => self.query,
            ClientEvent::Results => self.results,
            ClientEvent::Warning => self.warning,
        }
    }

    /// Enable or disable an event.
    pub fn set(&mut self, event: ClientEvent, enabled: bool) {
        let flag = match event {
            ClientEvent::Connect => &mut self.connect,
            ClientEvent::Disconnect => &mut self.disconnect,
            ClientEvent::Error => &mut self.error,
            ClientEvent::Query => &mut self.query,
            ClientEvent::Results => &mut self.results,
            ClientEvent::Warning => &mut self.warning,
        };
        *flag = enabled;
    }

    /// Builder-style variant of [`EmitPolicy::set`].
    pub fn with(mut self, event: ClientEvent, enabled: bool) -> Self {
        self.set(event, enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = EmitPolicy::default();
        for event in ClientEvent::ALL {
            assert_eq!(policy.is_enabled(event), event != ClientEvent::Results, "{event}");
        }
    }

    #[test]
    fn test_set_and_with() {
        let mut policy = EmitPolicy::none().with(ClientEvent::Query, true);
        assert!(policy.is_enabled(ClientEvent::Query));
        assert!(!policy.is_enabled(ClientEvent::Connect));

        policy.set(ClientEvent::Query, false);
        assert_eq!(policy, EmitPolicy::none());
        assert!(EmitPolicy::all().is_enabled(ClientEvent::Results));
    }

    #[test]
    fn test_policy_from_partial_json() {
        let policy: EmitPolicy = serde_json::from_str(r#"{"results": true, "query": false}"#).unwrap();
        assert!(policy.results);
        assert!(!policy.query);
        assert!(policy.connect);
    }

    #[test]
    fn test_event_names() {
        assert_eq!("Warning".parse::<ClientEvent>().unwrap(), ClientEvent::Warning);
        assert_eq!("results".parse::<ClientEvent>().unwrap(), ClientEvent::Results);
        let err = "bogus".parse::<ClientEvent>().unwrap_err();
        assert_eq!(err.category(), "Config");
        assert_eq!(ClientEvent::Results.to_string(), "results");
    }
}
