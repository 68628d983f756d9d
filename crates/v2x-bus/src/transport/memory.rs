// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker.
//!
//! Behaves like a small topic broker: named addresses, per-receiver
//! selectors, optional authentication and time-to-live enforcement. It also
//! lets callers inject faults (refuse connections, drop every live link) to
//! exercise the reconnect path without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use log::{debug, info};
use parking_lot::Mutex;

use super::{Link, Transport, TransportError, TransportEvent};
use crate::config::Credentials;
use crate::connection::ConnectOptions;
use crate::message::Envelope;
use crate::selector::Selector;
use crate::time;

struct Subscription {
    address: String,
    selector: Option<Selector>,
}

struct Session {
    events: Sender<TransportEvent>,
    subscriptions: Vec<Subscription>,
}

struct BrokerState {
    available: bool,
    required_credentials: Option<Credentials>,
    sessions: HashMap<u64, Session>,
    delivered: u64,
    expired: u64,
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    next_session: AtomicU64,
    connects: AtomicU64,
}

/// Cloneable handle to an in-process broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Broker accepting unauthenticated connections.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState {
                    available: true,
                    required_credentials: None,
                    sessions: HashMap::new(),
                    delivered: 0,
                    expired: 0,
                }),
                next_session: AtomicU64::new(1),
                connects: AtomicU64::new(0),
            }),
        }
    }

    /// Only accept connections presenting exactly these credentials.
    pub fn require_credentials(&self, credentials: Credentials) {
        self.inner.state.lock().required_credentials = Some(credentials);
    }

    /// Refuse (`false`) or accept (`true`) new connections.
    pub fn set_available(&self, available: bool) {
        self.inner.state.lock().available = available;
    }

    pub fn is_available(&self) -> bool {
        self.inner.state.lock().available
    }

    /// Terminate every live session with [`TransportEvent::TransportClosed`].
    ///
    /// Returns the number of sessions dropped.
    pub fn drop_connections(&self) -> usize {
        let sessions: Vec<Session> = {
            let mut state = self.inner.state.lock();
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        for session in &sessions {
            let _ = session.events.send(TransportEvent::TransportClosed);
        }
        info!("[memory-broker] dropped {} connection(s)", sessions.len());
        sessions.len()
    }

    /// Live sessions.
    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Successful connects since creation.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::Relaxed)
    }

    /// Envelopes delivered to receivers so far.
    pub fn delivered_count(&self) -> u64 {
        self.inner.state.lock().delivered
    }

    /// Envelopes dropped because their time-to-live had elapsed.
    pub fn expired_count(&self) -> u64 {
        self.inner.state.lock().expired
    }

    /// Route an envelope to every receiver on `address` whose selector matches.
    ///
    /// Also used by tests to inject arbitrary (possibly malformed) envelopes.
    pub fn publish(&self, address: &str, envelope: Envelope) -> usize {
        let now_ms = (time::now_unix_ns() / 1_000_000) as i64;
        let mut state = self.inner.state.lock();

        if envelope.is_expired(now_ms) {
            state.expired += 1;
            debug!(
                "[memory-broker] dropping expired '{}' envelope ({} ms old)",
                envelope.subject,
                now_ms - envelope.creation_time_ms
            );
            return 0;
        }

        let mut receivers = 0;
        for session in state.sessions.values() {
            let wanted = session.subscriptions.iter().any(|sub| {
                sub.address == address && sub.selector.as_ref().map_or(true, |s| s.matches(&envelope))
            });
            if wanted && session.events.send(TransportEvent::Message(envelope.clone())).is_ok() {
                receivers += 1;
            }
        }
        state.delivered += receivers as u64;
        receivers
    }

    fn open_session(&self, events: Sender<TransportEvent>) -> u64 {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().sessions.insert(
            id,
            Session {
                events,
                subscriptions: Vec::new(),
            },
        );
        self.inner.connects.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn close_session(&self, id: u64) {
        self.inner.state.lock().sessions.remove(&id);
    }
}

/// [`Transport`] connecting to a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: MemoryBroker,
}

impl MemoryTransport {
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }
}

impl Transport for MemoryTransport {
    fn connect(
        &mut self,
        options: &ConnectOptions,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn Link>, TransportError> {
        {
            let state = self.broker.inner.state.lock();
            if !state.available {
                return Err(TransportError::ConnectionRefused(options.endpoint.clone()));
            }
            if let Some(required) = &state.required_credentials {
                if *required != options.credentials {
                    return Err(TransportError::AuthenticationFailed(format!(
                        "station {}",
                        options.station_id
                    )));
                }
            }
        }

        let session = self.broker.open_session(events.clone());
        debug!(
            "[memory-broker] session {} opened for station {}",
            session, options.station_id
        );
        Ok(Box::new(MemoryLink {
            broker: self.broker.clone(),
            session,
            events,
            sender_address: None,
            closed: false,
        }))
    }
}

struct MemoryLink {
    broker: MemoryBroker,
    session: u64,
    events: Sender<TransportEvent>,
    sender_address: Option<String>,
    closed: bool,
}

impl MemoryLink {
    /// A dropped session (fault injection) behaves like a dead socket.
    fn ensure_live(&self) -> Result<(), TransportError> {
        if self.closed || !self.broker.inner.state.lock().sessions.contains_key(&self.session) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Link for MemoryLink {
    fn open_sender(&mut self, address: &str) -> Result<(), TransportError> {
        self.ensure_live()?;
        if address.is_empty() {
            return Err(TransportError::UnknownAddress(address.to_string()));
        }
        self.sender_address = Some(address.to_string());
        let _ = self.events.send(TransportEvent::SenderOpen);
        Ok(())
    }

    fn open_receiver(&mut self, address: &str, filter: Option<&str>) -> Result<(), TransportError> {
        if address.is_empty() {
            return Err(TransportError::UnknownAddress(address.to_string()));
        }
        let selector = filter.map(Selector::parse).transpose()?;

        let mut state = self.broker.inner.state.lock();
        let session = match state.sessions.get_mut(&self.session) {
            Some(session) if !self.closed => session,
            _ => return Err(TransportError::Closed),
        };
        session.subscriptions.push(Subscription {
            address: address.to_string(),
            selector,
        });
        Ok(())
    }

    fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        self.ensure_live()?;
        let address = self.sender_address.as_deref().ok_or(TransportError::Closed)?;
        self.broker.publish(address, envelope);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.close_session(self.session);
        }
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.close();
    }
}
