// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the bus layer.
//!
//! Only setup paths (connect, configuration, codec calls) return errors.
//! Routine unavailability on the send path is reported as `false`, never as
//! an [`Error`], and inbound faults are logged and dropped.

use thiserror::Error;

use crate::message::MessageType;
use crate::transport::TransportError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failed during setup.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// `connect` called on a transceiver that is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// A previous receive thread panicked and took the handler with it.
    #[error("handler lost by a panicked receive thread")]
    ReceiverLost,

    /// Thread spawn or other OS-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be produced.
    #[error("encoding {message_type} failed: {reason}")]
    Encode {
        message_type: MessageType,
        reason: String,
    },

    /// The payload could not be parsed.
    #[error("decoding {message_type} failed: {reason}")]
    Decode {
        message_type: MessageType,
        reason: String,
    },

    /// The codec has no schema for this message type.
    #[error("no decoder registered for {0}")]
    Unsupported(MessageType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ConfigError::Invalid("endpoint is empty".into()));
        assert!(err.to_string().contains("endpoint is empty"));

        let err = Error::from(CodecError::Unsupported(MessageType::Denm));
        assert_eq!(err.to_string(), "codec error: no decoder registered for denm");

        let err = CodecError::Decode {
            message_type: MessageType::Cpm,
            reason: "truncated".into(),
        };
        assert_eq!(err.to_string(), "decoding cpm failed: truncated");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: Error = TransportError::ConnectionRefused("broker offline".into()).into();
        assert!(matches!(err, Error::Transport(_)));
    }
}
