// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker client seam.
//!
//! The connection manager programs against two traits. A [`Transport`] opens
//! one connection per network-loop run. The returned [`Link`] opens senders
//! and receivers and publishes envelopes. Everything asynchronous (sender
//! ready, inbound messages, closures, errors) comes back as
//! [`TransportEvent`] values on the channel handed to `connect`.
//!
//! ```text
//!   network loop                      transport
//!   ------------                      ---------
//!   connect(options, events_tx) --->  Box<dyn Link>
//!   link.open_sender(out)       --->  ... SenderOpen
//!   link.open_receiver(in, f)   --->  ... Message(env), Message(env)
//!   link.send(env)              --->
//!                               <---  TransportClosed / ConnectionError
//! ```

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

use crossbeam::channel::Sender;
use thiserror::Error;

use crate::connection::ConnectOptions;
use crate::message::Envelope;
use crate::selector::SelectorError;

/// Transport failures reported synchronously.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker unreachable or refusing connections.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Link already closed.
    #[error("link closed")]
    Closed,

    /// Address cannot be attached.
    #[error("unknown address '{0}'")]
    UnknownAddress(String),

    /// Receiver filter rejected by the broker.
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] SelectorError),

    /// Client-side protocol failure (handshake timeout, full queue).
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous transport outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Sender attached; sends are accepted from now on.
    SenderOpen,
    SenderClosed,
    SenderDetached,
    SenderError(String),
    /// Inbound envelope from the receiver.
    Message(Envelope),
    ConnectionClosed,
    ConnectionError(String),
    TransportClosed,
    TransportError(String),
}

impl TransportEvent {
    /// Whether this event ends the current session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportEvent::SenderOpen | TransportEvent::Message(_))
    }
}

/// Broker connector. One `connect` per network-loop run.
pub trait Transport: Send + 'static {
    /// Establish a connection. Events of the new session go to `events`.
    fn connect(
        &mut self,
        options: &ConnectOptions,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn Link>, TransportError>;
}

/// Established broker connection.
pub trait Link: Send {
    /// Attach a sender; completion is signaled by [`TransportEvent::SenderOpen`].
    fn open_sender(&mut self, address: &str) -> Result<(), TransportError>;

    /// Attach a receiver with an optional broker-side selector.
    fn open_receiver(&mut self, address: &str, filter: Option<&str>) -> Result<(), TransportError>;

    /// Publish on the sender.
    fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;

    /// Detach everything. Further calls fail with [`TransportError::Closed`].
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_events() {
        assert!(!TransportEvent::SenderOpen.is_fatal());
        assert!(TransportEvent::SenderDetached.is_fatal());
        assert!(TransportEvent::TransportClosed.is_fatal());
        assert!(TransportEvent::ConnectionError("reset".into()).is_fatal());
    }
}
