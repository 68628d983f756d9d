// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::fmt;

/// Connection lifecycle.
///
/// ```text
/// Idle -> Connecting -> Open -> Connected -> Closing -> Stopped
///            ^                      |
///            +---- Reconnecting <---+   (any failure, unless closing)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Manager created, loop not started yet
    #[default]
    Idle,

    /// Connect attempt in progress (with backoff)
    Connecting,

    /// Connection established, sender not attached yet
    Open,

    /// Sender attached, sends are accepted
    Connected,

    /// Session torn down, waiting to restart the loop
    Reconnecting,

    /// Close requested
    Closing,

    /// Loop joined (terminal)
    Stopped,
}

impl ConnectionState {
    /// Close requested or done. The loop never leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Closing => "Closing",
            ConnectionState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert!(ConnectionState::Stopped.is_terminal());
        assert!(ConnectionState::Closing.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert_eq!(ConnectionState::Open.to_string(), "Open");
    }
}
