//! Observable gateway events
//!
//! Every log line the gateway emits carries one of these as its `event`
//! field so log consumers can match on a closed vocabulary.

use std::fmt;

/// Observable events in the gateway lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// Gateway constructed and ready
    GatewayReady,

    // Request processing
    /// Request received
    RequestReceived,
    /// Request rejected by validation (no store access)
    RequestRejected,
    /// Request validated, normalized and prepared
    RequestPrepared,
    /// Store call completed
    RequestExecuted,
    /// Store reported an error
    RequestFailed,
    /// Store call exceeded the timeout
    RequestTimedOut,
}

impl GatewayEvent {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEvent::ConfigLoaded => "CONFIG_LOADED",
            GatewayEvent::GatewayReady => "GATEWAY_READY",
            GatewayEvent::RequestReceived => "REQUEST_BEGIN",
            GatewayEvent::RequestRejected => "REQUEST_REJECTED",
            GatewayEvent::RequestPrepared => "REQUEST_PREPARED",
            GatewayEvent::RequestExecuted => "REQUEST_COMPLETE",
            GatewayEvent::RequestFailed => "REQUEST_FAILED",
            GatewayEvent::RequestTimedOut => "REQUEST_TIMEOUT",
        }
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_unique_screaming_case() {
        let events = [
            GatewayEvent::ConfigLoaded,
            GatewayEvent::GatewayReady,
            GatewayEvent::RequestReceived,
            GatewayEvent::RequestRejected,
            GatewayEvent::RequestPrepared,
            GatewayEvent::RequestExecuted,
            GatewayEvent::RequestFailed,
            GatewayEvent::RequestTimedOut,
        ];

        let mut names: Vec<&str> = events.iter().map(|e| e.as_str()).collect();
        for name in &names {
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), events.len());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", GatewayEvent::RequestTimedOut), "REQUEST_TIMEOUT");
    }
}
