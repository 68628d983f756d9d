// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network loop thread.
//!
//! Owns the transport and the live link. Talks to the rest of the manager
//! through three channels only:
//!
//! - `control`: shutdown requests from [`ConnectionManager::close`];
//! - the per-session dispatch channel: envelopes accepted by `send()`;
//! - the per-session event channel: everything the transport reports.
//!
//! Any fatal transport event tears the session down and, unless a close was
//! requested, restarts the whole loop after `restart_pause`.
//!
//! [`ConnectionManager::close`]: super::ConnectionManager::close

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use super::{ConnectOptions, ConnectionState, Shared};
use crate::message::Envelope;
use crate::transport::{Link, Transport, TransportEvent};

/// First connect retry delay; doubled up to `max_backoff`.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Requests from the manager handle.
#[derive(Debug)]
pub(super) enum Control {
    Shutdown,
}

/// Why a session ended.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Shutdown,
    Failed(String),
}

pub(super) struct NetworkLoop<T: Transport> {
    options: ConnectOptions,
    transport: T,
    shared: Arc<Shared>,
    control: Receiver<Control>,
}

impl<T: Transport> NetworkLoop<T> {
    pub(super) fn new(
        options: ConnectOptions,
        transport: T,
        shared: Arc<Shared>,
        control: Receiver<Control>,
    ) -> Self {
        Self {
            options,
            transport,
            shared,
            control,
        }
    }

    pub(super) fn run(mut self) {
        info!(
            "[net-loop] started for station {} -> {}",
            self.options.station_id, self.options.endpoint
        );

        let mut sessions = 0u64;
        while !self.shared.is_closing() {
            self.shared.begin_session();
            sessions += 1;

            match self.run_session() {
                SessionEnd::Shutdown => {
                    self.shared.end_session();
                    break;
                }
                SessionEnd::Failed(reason) => {
                    warn!("[net-loop] session {} ended: {}", sessions, reason);
                    self.shared.end_session();
                }
            }

            if self.shared.is_closing() {
                break;
            }
            self.shared.set_state(ConnectionState::Reconnecting);
            if self.pause(self.options.restart_pause) == Some(SessionEnd::Shutdown) {
                break;
            }
        }

        info!(
            "[net-loop] stopped for station {} after {} session(s)",
            self.options.station_id, sessions
        );
    }

    /// Sleep unless a shutdown arrives first.
    fn pause(&self, duration: Duration) -> Option<SessionEnd> {
        match self.control.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) if !self.shared.is_closing() => None,
            _ => Some(SessionEnd::Shutdown),
        }
    }

    fn connect(&mut self, events: &Sender<TransportEvent>) -> Option<Box<dyn Link>> {
        let mut delay = INITIAL_BACKOFF.min(self.options.max_backoff);
        loop {
            match self.transport.connect(&self.options, events.clone()) {
                Ok(link) => return Some(link),
                Err(e) => {
                    crate::warn_throttled!(
                        crate::logging::THROTTLE_PERIOD,
                        "[net-loop] connect to {} failed: {}",
                        self.options.endpoint,
                        e
                    );
                }
            }
            if self.pause(delay).is_some() {
                return None;
            }
            delay = (delay * 2).min(self.options.max_backoff);
        }
    }

    fn run_session(&mut self) -> SessionEnd {
        let (events_tx, events_rx) = unbounded();
        let mut link = match self.connect(&events_tx) {
            Some(link) => link,
            None => return SessionEnd::Shutdown,
        };
        // The link keeps its own sender; a dead link disconnects the channel.
        drop(events_tx);
        self.shared.set_state(ConnectionState::Open);
        debug!("[net-loop] connected to {}", self.options.endpoint);

        let end = self.serve(link.as_mut(), &events_rx);
        link.close();
        end
    }

    fn serve(&self, link: &mut dyn Link, events: &Receiver<TransportEvent>) -> SessionEnd {
        if !self.options.outbound_address.is_empty() {
            if let Err(e) = link.open_sender(&self.options.outbound_address) {
                return SessionEnd::Failed(format!("open sender: {}", e));
            }
        }
        if !self.options.inbound_address.is_empty() {
            let filter = self.options.filter.as_deref().filter(|f| !f.trim().is_empty());
            if let Err(e) = link.open_receiver(&self.options.inbound_address, filter) {
                return SessionEnd::Failed(format!("open receiver: {}", e));
            }
        }

        let (dispatch_tx, dispatch_rx) = unbounded::<Envelope>();
        let mut dispatch_tx = Some(dispatch_tx);

        loop {
            select! {
                recv(self.control) -> _ => return SessionEnd::Shutdown,
                recv(dispatch_rx) -> envelope => {
                    if let Ok(envelope) = envelope {
                        if let Err(e) = link.send(envelope) {
                            return SessionEnd::Failed(format!("send: {}", e));
                        }
                    }
                }
                recv(events) -> event => {
                    let Ok(event) = event else {
                        return SessionEnd::Failed("transport event channel closed".into());
                    };
                    if event.is_fatal() {
                        return SessionEnd::Failed(format!("{:?}", event));
                    }
                    match event {
                        TransportEvent::SenderOpen => {
                            if let Some(tx) = dispatch_tx.take() {
                                self.shared.sender_ready(tx);
                                info!("[net-loop] sender attached on '{}'", self.options.outbound_address);
                            }
                        }
                        TransportEvent::Message(envelope) => self.shared.push_inbound(envelope),
                        other => debug!("[net-loop] ignoring {:?}", other),
                    }
                }
            }
        }
    }
}
