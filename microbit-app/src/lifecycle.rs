/// Where the controller is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

impl ConnectionState {
    /// A new connection may only start from `Disconnected`
    pub fn can_connect(self) -> bool {
        self == ConnectionState::Disconnected
    }

    /// Disconnect is refused while a transition is in flight
    pub fn can_disconnect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Connected)
    }
}

/// Texts shown in the connection status field
pub mod status {
    pub const CONNECTING: &str = "Connecting";
    pub const CONNECTED: &str = "Connected";
    pub const CONNECTION_FAILED: &str = "Connection Failed";
    pub const DISCONNECTED: &str = "Disconnected";
    pub const NOT_CONNECTED: &str = "Not Connected";
    pub const DISCONNECTION_FAILED: &str = "Disconnection Failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnected_may_connect() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Connected.can_connect());
        assert!(!ConnectionState::Disconnecting.can_connect());
    }

    #[test]
    fn transitions_block_disconnect() {
        assert!(ConnectionState::Disconnected.can_disconnect());
        assert!(ConnectionState::Connected.can_disconnect());
        assert!(!ConnectionState::Connecting.can_disconnect());
        assert!(!ConnectionState::Disconnecting.can_disconnect());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
