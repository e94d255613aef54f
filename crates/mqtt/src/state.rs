// Disconnected --ConnectAttempt--> Connecting --ConnAck--> Connected --SubAck--> Subscribed
// Any state goes back to Disconnected on ConnectionLost.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    // First connect, or a reconnect after backoff.
    ConnectAttempt,
    ConnAck,
    SubAck,
    // Network error or a requested disconnect.
    ConnectionLost,
}

impl ConnectionState {
    pub fn next(self, transition: Transition) -> ConnectionState {
        use ConnectionState::*;
        match (self, transition) {
            (_, Transition::ConnectionLost) => Disconnected,
            (Disconnected, Transition::ConnectAttempt) => Connecting,
            (_, Transition::ConnAck) => Connected,
            (Connected | Subscribed, Transition::SubAck) => Subscribed,
            // a late SubAck from a dropped session, or a connect attempt while already up
            (state, _) => state,
        }
    }

    pub fn can_publish(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Subscribed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribed => "subscribed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_happy_path() {
        let state = Disconnected
            .next(Transition::ConnectAttempt)
            .next(Transition::ConnAck)
            .next(Transition::SubAck);
        assert_eq!(state, Subscribed);
        assert!(state.can_publish());
    }

    #[test]
    fn test_lost_from_any_state() {
        for state in [Disconnected, Connecting, Connected, Subscribed] {
            assert_eq!(state.next(Transition::ConnectionLost), Disconnected);
        }
    }

    #[test]
    fn test_stale_suback_ignored() {
        assert_eq!(Connecting.next(Transition::SubAck), Connecting);
        assert_eq!(Disconnected.next(Transition::SubAck), Disconnected);
    }

    #[test]
    fn test_connect_attempt_while_up() {
        assert_eq!(Connected.next(Transition::ConnectAttempt), Connected);
        assert_eq!(Subscribed.next(Transition::ConnectAttempt), Subscribed);
    }

    #[test]
    fn test_only_connected_states_publish() {
        assert!(!Disconnected.can_publish());
        assert!(!Connecting.can_publish());
        assert!(Connected.can_publish());
    }
}
