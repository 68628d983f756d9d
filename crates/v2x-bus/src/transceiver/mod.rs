// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application facade.
//!
//! A [`Transceiver`] ties a [`ConnectionManager`], a [`MessageCodec`] and a
//! [`MessageHandler`] together:
//!
//! - outbound: typed message -> codec -> envelope -> `ConnectionManager::send`;
//! - inbound: a dedicated receive thread pulls envelopes, validates, decodes,
//!   reassembles CPM segments and calls the handler.
//!
//! The handler and the reassembly cache move into the receive thread on
//! [`connect`](Transceiver::connect) and come back on
//! [`disconnect`](Transceiver::disconnect), so a transceiver can be
//! reconnected and the handler inspected afterwards.
//!
//! # Example
//!
//! ```rust,no_run
//! use v2x_bus::message::pdu::{Cam, ItsMessage};
//! use v2x_bus::transport::memory::{MemoryBroker, MemoryTransport};
//! use v2x_bus::transceiver::NoopHandler;
//! use v2x_bus::{time, BincodeCodec, BusConfig, Transceiver};
//!
//! # fn main() -> v2x_bus::Result<()> {
//! let mut station = Transceiver::new(BincodeCodec, NoopHandler);
//! station.connect(BusConfig::new(7), MemoryTransport::new(MemoryBroker::new()))?;
//!
//! let gdt = time::unix_to_generation_delta_time(time::now_unix_ns());
//! let sent = station.send_message(&ItsMessage::Cam(Cam::new(7, gdt)), None);
//! # let _ = sent;
//! station.disconnect();
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod handler;

pub use dispatch::{validate, DispatchStats, Discard};
pub use handler::{MessageHandler, NoopHandler};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};

use crate::codec::MessageCodec;
use crate::config::BusConfig;
use crate::connection::{ConnectOptions, ConnectionManager};
use crate::error::{Error, Result};
use crate::logging::THROTTLE_PERIOD;
use crate::message::pdu::ItsMessage;
use crate::message::{Envelope, MessageType, StationId};
use crate::reassembly::ReassemblyCache;
use crate::time;
use crate::transport::Transport;

use dispatch::Dispatcher;

/// Cloneable, thread-safe send handle bound to one connection.
///
/// Safe to use from producer threads and from inside handler callbacks.
#[derive(Clone)]
pub struct Publisher {
    manager: Arc<ConnectionManager>,
    codec: Arc<dyn MessageCodec>,
    station_id: StationId,
}

impl Publisher {
    /// Encode and send. Returns `false` on encode failure or when the
    /// connection rejects the send.
    pub fn send_message(&self, message: &ItsMessage, destination: Option<StationId>) -> bool {
        match self.codec.encode(message) {
            Ok(bytes) => self.send_encoded(message.message_type(), bytes, destination),
            Err(e) => {
                crate::error_throttled!(THROTTLE_PERIOD, "[transceiver] {}", e);
                false
            }
        }
    }

    /// Send an already encoded payload.
    pub fn send_encoded(
        &self,
        message_type: MessageType,
        payload: Vec<u8>,
        destination: Option<StationId>,
    ) -> bool {
        let envelope = Envelope::for_message(message_type, self.station_id, destination, payload);
        self.manager.send(envelope)
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("station_id", &self.station_id)
            .finish()
    }
}

struct Session<H> {
    publisher: Publisher,
    receiver: JoinHandle<Dispatcher<H>>,
}

/// Send/receive facade over one station's bus connection.
pub struct Transceiver<H: MessageHandler> {
    codec: Arc<dyn MessageCodec>,
    /// Handler and cache while no receive thread runs
    idle: Option<Dispatcher<H>>,
    session: Option<Session<H>>,
}

impl<H: MessageHandler> Transceiver<H> {
    pub fn new<C: MessageCodec>(codec: C, handler: H) -> Self {
        let codec: Arc<dyn MessageCodec> = Arc::new(codec);
        let cache = ReassemblyCache::new(crate::config::ReassemblyConfig::default().retention());
        Self {
            idle: Some(Dispatcher::new(handler, Arc::clone(&codec), cache)),
            codec,
            session: None,
        }
    }

    /// Start the connection manager and the receive thread.
    pub fn connect<T: Transport>(&mut self, config: BusConfig, transport: T) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyConnected);
        }
        config.validate()?;
        let mut dispatcher = self.idle.take().ok_or(Error::ReceiverLost)?;

        let manager = match ConnectionManager::connect(ConnectOptions::from(&config), transport) {
            Ok(manager) => Arc::new(manager),
            Err(e) => {
                self.idle = Some(dispatcher);
                return Err(e);
            }
        };

        dispatcher.set_cache(
            ReassemblyCache::new(config.reassembly.retention())
                .with_max_pending(config.reassembly.max_pending),
        );
        let retry = config.receive_retry();
        let thread_manager = Arc::clone(&manager);
        let receiver = thread::Builder::new()
            .name(format!("v2x-rx-{}", config.station_id))
            .spawn(move || receive_loop(thread_manager, dispatcher, retry));
        let receiver = match receiver {
            Ok(receiver) => receiver,
            Err(e) => {
                manager.close();
                return Err(e.into());
            }
        };

        info!(
            "[transceiver] station {} connecting to {}",
            config.station_id, config.endpoint
        );
        self.session = Some(Session {
            publisher: Publisher {
                manager,
                codec: Arc::clone(&self.codec),
                station_id: config.station_id,
            },
            receiver,
        });
        Ok(())
    }

    /// Close the connection, then join the receive thread. No-op when not
    /// connected.
    pub fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let station_id = session.publisher.station_id;
        session.publisher.manager.close();
        match session.receiver.join() {
            Ok(dispatcher) => self.idle = Some(dispatcher),
            Err(_) => error!("[transceiver] station {}: receive thread panicked", station_id),
        }
        info!("[transceiver] station {} disconnected", station_id);
    }

    /// Encode and send a typed message.
    pub fn send_message(&self, message: &ItsMessage, destination: Option<StationId>) -> bool {
        match &self.session {
            Some(session) => session.publisher.send_message(message, destination),
            None => {
                crate::warn_throttled!(THROTTLE_PERIOD, "[transceiver] send while disconnected");
                false
            }
        }
    }

    /// Send an already encoded payload.
    pub fn send_encoded(
        &self,
        message_type: MessageType,
        payload: Vec<u8>,
        destination: Option<StationId>,
    ) -> bool {
        match &self.session {
            Some(session) => session
                .publisher
                .send_encoded(message_type, payload, destination),
            None => {
                crate::warn_throttled!(THROTTLE_PERIOD, "[transceiver] send while disconnected");
                false
            }
        }
    }

    /// Send handle for other threads, while connected.
    pub fn publisher(&self) -> Option<Publisher> {
        self.session.as_ref().map(|s| s.publisher.clone())
    }

    pub fn connection(&self) -> Option<&ConnectionManager> {
        self.session.as_ref().map(|s| s.publisher.manager.as_ref())
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.publisher.manager.is_connected())
    }

    /// Block until a sender is attached or `timeout` elapses.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.connection()
            .is_some_and(|manager| manager.wait_connected(timeout))
    }

    /// Handler, available while disconnected.
    pub fn handler(&self) -> Option<&H> {
        self.idle.as_ref().map(Dispatcher::handler)
    }

    /// Receive-side counters, available while disconnected.
    pub fn stats(&self) -> Option<DispatchStats> {
        self.idle.as_ref().map(Dispatcher::stats)
    }

    /// Disconnect and give the handler back.
    pub fn into_handler(mut self) -> Option<H> {
        self.disconnect();
        self.idle.take().map(Dispatcher::into_handler)
    }
}

impl<H: MessageHandler> Drop for Transceiver<H> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Receive thread body. Returns the dispatcher once the manager closes.
fn receive_loop<H: MessageHandler>(
    manager: Arc<ConnectionManager>,
    mut dispatcher: Dispatcher<H>,
    retry: Duration,
) -> Dispatcher<H> {
    loop {
        match manager.receive() {
            Some(envelope) => dispatcher.process(envelope, time::now_unix_ns()),
            None if manager.is_closing() => break,
            None => {
                // Session restarting: sweep and wait for the next one
                dispatcher.sweep(time::now_unix_ns());
                thread::sleep(retry);
            }
        }
    }
    dispatcher
}
