// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # v2x-bus - ITS message transport over a publish/subscribe bus
//!
//! Lets connected-vehicle software exchange ETSI ITS messages (CAM, VAM, CPM,
//! MCM) over a shared message broker while hiding connection instability,
//! binary encoding and multi-segment reassembly from the application.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use v2x_bus::transport::memory::{MemoryBroker, MemoryTransport};
//! use v2x_bus::{BusConfig, BincodeCodec, MessageHandler, BinaryMessage, Transceiver};
//! use v2x_bus::message::pdu::Cam;
//!
//! struct Printer;
//!
//! impl MessageHandler for Printer {
//!     fn on_cam(&mut self, cam: &Cam, meta: &BinaryMessage) {
//!         println!("CAM from station {}", meta.station_id);
//!     }
//! }
//!
//! # fn main() -> v2x_bus::Result<()> {
//! let broker = MemoryBroker::new();
//! let mut transceiver = Transceiver::new(BincodeCodec, Printer);
//! transceiver.connect(BusConfig::new(101), MemoryTransport::new(broker))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Application                                 |
//! |     send_message() / send_encoded()        MessageHandler callbacks |
//! +---------------------------------------------------------------------+
//! |                         Transceiver                                 |
//! |   Codec | Envelope validation | Dispatch table | ReassemblyCache    |
//! |                      (receive thread)                               |
//! +---------------------------------------------------------------------+
//! |                      ConnectionManager                              |
//! |   Network loop thread | Reconnect state machine | Inbound queue     |
//! +---------------------------------------------------------------------+
//! |                  Transport (broker client API)                      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Threads
//!
//! - the network loop, owned by [`ConnectionManager`], restarted on any failure;
//! - producer threads calling [`Transceiver::send_message`] (never block on I/O);
//! - the receive thread, the only thread that runs [`MessageHandler`] callbacks
//!   and touches the [`ReassemblyCache`].

/// Bundled message codec and the codec seam.
pub mod codec;
/// Bus configuration (endpoint, addresses, credentials, timing).
pub mod config;
/// Connection lifecycle manager and its network loop.
pub mod connection;
/// Error types.
pub mod error;
/// Rate-limited logging helpers.
pub mod logging;
/// Wire envelopes, message types and typed PDUs.
pub mod message;
/// Collective-perception segment reassembly.
pub mod reassembly;
/// Broker-side selector expressions.
pub mod selector;
/// Unix / ITS / TAI / generation-delta-time conversions.
pub mod time;
/// High-level send/receive facade.
pub mod transceiver;
/// Broker client seam and the in-memory broker.
pub mod transport;
/// Physical-value quantization helpers.
pub mod units;

pub use codec::{BincodeCodec, MessageCodec};
pub use config::{BusConfig, Credentials, ReassemblyConfig, ReconnectConfig};
pub use connection::{ConnectOptions, ConnectionManager, ConnectionState};
pub use error::{CodecError, ConfigError, Error, Result};
pub use message::pdu::ItsMessage;
pub use message::{BinaryMessage, Envelope, MessageType};
pub use reassembly::ReassemblyCache;
pub use transceiver::{MessageHandler, Publisher, Transceiver};
pub use transport::{Link, Transport, TransportError, TransportEvent};
