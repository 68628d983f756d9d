// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle manager.
//!
//! [`ConnectionManager`] owns a dedicated network loop thread that connects
//! to the broker, attaches a sender and a receiver, and restarts from scratch
//! after any failure until the manager is closed. Application threads see a
//! small synchronous boundary:
//!
//! - [`send`](ConnectionManager::send) never blocks on I/O: it returns
//!   `false` right away when no sender is attached (no buffering, no retry),
//!   otherwise hands the envelope to the loop thread and returns `true`;
//! - [`receive`](ConnectionManager::receive) blocks on a condition variable
//!   until an envelope is queued or the session/manager is closing;
//! - [`close`](ConnectionManager::close) is idempotent and joins the loop.
//!
//! # Architecture
//!
//! ```text
//!  producers --send()--> [ Mutex<Inner> ] --dispatch chan--> +-------------+
//!                         connected                          | network loop|
//!                         dispatch        <--push_inbound--- |   thread    |
//!  receiver <--receive()- inbound queue                      +------+------+
//!                 ^                                                 |
//!           inbound_ready / dispatch_ready (Condvar)          Transport/Link
//! ```

mod network_loop;
mod state;

pub use state::ConnectionState;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Sender};
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};

use crate::config::{BusConfig, Credentials};
use crate::error::Result;
use crate::logging::THROTTLE_PERIOD;
use crate::message::{Envelope, StationId};
use crate::transport::Transport;

use network_loop::{Control, NetworkLoop};

/// Everything a transport needs for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Broker endpoint (`host:port`)
    pub endpoint: String,
    pub station_id: StationId,
    /// Empty disables receiving
    pub inbound_address: String,
    /// Empty disables sending
    pub outbound_address: String,
    pub credentials: Credentials,
    /// Broker-side selector, passed through uninterpreted
    pub filter: Option<String>,
    /// Cap of the exponential connect backoff
    pub max_backoff: Duration,
    /// Idle timeout requested from the transport
    pub idle_timeout: Duration,
    /// Pause before the loop restarts after a failure
    pub restart_pause: Duration,
}

impl From<&BusConfig> for ConnectOptions {
    fn from(config: &BusConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            station_id: config.station_id,
            inbound_address: config.inbound_address.clone(),
            outbound_address: config.outbound_address.clone(),
            credentials: config.credentials.clone(),
            filter: config.effective_filter().map(str::to_string),
            max_backoff: config.reconnect.max_backoff(),
            idle_timeout: config.reconnect.idle_timeout(),
            restart_pause: config.reconnect.restart_pause(),
        }
    }
}

/// State shared between the handle and the loop thread.
///
/// The `{connected, dispatch, inbound}` triple is only touched under `inner`.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Inbound queue not empty, or session/manager closing
    inbound_ready: Condvar,
    /// Sender attached, or manager closing
    dispatch_ready: Condvar,
}

struct Inner {
    state: ConnectionState,
    connected: bool,
    dispatch: Option<Sender<Envelope>>,
    inbound: VecDeque<Envelope>,
    /// Current session torn down, loop about to restart
    session_closing: bool,
    /// Close requested; never reset
    closing: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Idle,
                connected: false,
                dispatch: None,
                inbound: VecDeque::new(),
                session_closing: false,
                closing: false,
            }),
            inbound_ready: Condvar::new(),
            dispatch_ready: Condvar::new(),
        }
    }

    fn is_closing(&self) -> bool {
        self.inner.lock().closing
    }

    fn set_state(&self, state: ConnectionState) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            debug!("[connection] {} -> {}", inner.state, state);
            inner.state = state;
        }
    }

    fn begin_session(&self) {
        let mut inner = self.inner.lock();
        inner.session_closing = false;
        if !inner.state.is_terminal() {
            inner.state = ConnectionState::Connecting;
        }
    }

    /// Drop the sender and wake everybody waiting on this session.
    fn end_session(&self) {
        {
            let mut inner = self.inner.lock();
            inner.connected = false;
            inner.dispatch = None;
            inner.session_closing = true;
        }
        self.inbound_ready.notify_all();
        self.dispatch_ready.notify_all();
    }

    fn sender_ready(&self, dispatch: Sender<Envelope>) {
        {
            let mut inner = self.inner.lock();
            if inner.closing {
                return;
            }
            inner.dispatch = Some(dispatch);
            inner.connected = true;
            inner.state = ConnectionState::Connected;
        }
        self.dispatch_ready.notify_all();
    }

    fn push_inbound(&self, envelope: Envelope) {
        self.inner.lock().inbound.push_back(envelope);
        self.inbound_ready.notify_one();
    }
}

/// Thread-safe send/receive boundary over a self-healing broker connection.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    control: Sender<Control>,
    thread: Mutex<Option<JoinHandle<()>>>,
    station_id: StationId,
}

impl ConnectionManager {
    /// Start the network loop. Returns as soon as the thread is running;
    /// the connection itself is established asynchronously.
    pub fn connect<T: Transport>(options: ConnectOptions, transport: T) -> Result<Self> {
        let shared = Arc::new(Shared::new());
        let (control_tx, control_rx) = unbounded();
        let station_id = options.station_id;

        let net_loop = NetworkLoop::new(options, transport, Arc::clone(&shared), control_rx);
        let handle = thread::Builder::new()
            .name(format!("v2x-net-{}", station_id))
            .spawn(move || net_loop.run())?;

        Ok(Self {
            shared,
            control: control_tx,
            thread: Mutex::new(Some(handle)),
            station_id,
        })
    }

    /// Queue an envelope for sending.
    ///
    /// Returns `false` without queuing when no sender is attached.
    pub fn send(&self, envelope: Envelope) -> bool {
        let inner = self.shared.inner.lock();
        match (&inner.dispatch, inner.connected) {
            (Some(dispatch), true) => dispatch.send(envelope).is_ok(),
            _ => {
                crate::warn_throttled!(
                    THROTTLE_PERIOD,
                    "[connection] station {}: sender not connected, dropping '{}'",
                    self.station_id,
                    envelope.subject
                );
                false
            }
        }
    }

    /// Block until an envelope is available.
    ///
    /// Returns `None` when the current session ends or the manager closes;
    /// the caller tells the two apart with [`is_closing`](Self::is_closing).
    pub fn receive(&self) -> Option<Envelope> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(envelope) = inner.inbound.pop_front() {
                return Some(envelope);
            }
            if inner.closing || inner.session_closing {
                return None;
            }
            self.shared.inbound_ready.wait(&mut inner);
        }
    }

    /// Snapshot: a sender is attached right now.
    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().connected
    }

    /// Close was requested.
    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    /// Wait up to `timeout` for a sender to be attached.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while !inner.connected && !inner.closing {
            if self
                .shared
                .dispatch_ready
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                break;
            }
        }
        inner.connected
    }

    /// Stop the network loop, wake blocked receivers and join the thread.
    /// Idempotent.
    pub fn close(&self) {
        let handle = {
            let mut inner = self.shared.inner.lock();
            if !inner.closing {
                info!("[connection] station {}: closing", self.station_id);
                inner.closing = true;
                inner.state = ConnectionState::Closing;
            }
            self.thread.lock().take()
        };
        self.shared.inbound_ready.notify_all();
        self.shared.dispatch_ready.notify_all();

        let Some(handle) = handle else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if handle.join().is_err() {
            error!("[connection] station {}: network loop panicked", self.station_id);
        }

        let mut inner = self.shared.inner.lock();
        inner.connected = false;
        inner.dispatch = None;
        inner.state = ConnectionState::Stopped;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("station_id", &self.station_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::transport::memory::{MemoryBroker, MemoryTransport};

    fn fast_options(station_id: StationId) -> ConnectOptions {
        let mut options = ConnectOptions::from(&BusConfig::new(station_id));
        options.restart_pause = Duration::from_millis(20);
        options.max_backoff = Duration::from_millis(40);
        options
    }

    fn cam(station_id: StationId) -> Envelope {
        Envelope::for_message(MessageType::Cam, station_id, None, vec![1])
    }

    #[test]
    fn test_connect_options_from_config() {
        let config = BusConfig::new(5).with_filter("mid = 2050");
        let options = ConnectOptions::from(&config);
        assert_eq!(options.station_id, 5);
        assert_eq!(options.filter.as_deref(), Some("mid = 2050"));
        assert_eq!(options.restart_pause, Duration::from_millis(200));
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let shared = Shared::new();
        shared.set_state(ConnectionState::Open);
        assert_eq!(shared.inner.lock().state, ConnectionState::Open);

        shared.inner.lock().state = ConnectionState::Closing;
        shared.set_state(ConnectionState::Reconnecting);
        shared.begin_session();
        assert_eq!(shared.inner.lock().state, ConnectionState::Closing);
    }

    #[test]
    fn test_send_rejected_until_connected() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let manager =
            ConnectionManager::connect(fast_options(1), MemoryTransport::new(broker.clone()))
                .unwrap();

        assert!(!manager.send(cam(1)));
        assert!(!manager.is_connected());

        broker.set_available(true);
        assert!(manager.wait_connected(Duration::from_secs(5)));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.send(cam(1)));
    }

    #[test]
    fn test_receive_own_traffic() {
        let broker = MemoryBroker::new();
        let manager =
            ConnectionManager::connect(fast_options(3), MemoryTransport::new(broker)).unwrap();
        assert!(manager.wait_connected(Duration::from_secs(5)));

        assert!(manager.send(cam(3)));
        let envelope = manager.receive().unwrap();
        assert_eq!(envelope.subject, "cam");
    }

    #[test]
    fn test_close_is_idempotent_and_wakes_receiver() {
        let broker = MemoryBroker::new();
        let manager = Arc::new(
            ConnectionManager::connect(fast_options(4), MemoryTransport::new(broker)).unwrap(),
        );
        assert!(manager.wait_connected(Duration::from_secs(5)));

        let receiver = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.receive())
        };
        thread::sleep(Duration::from_millis(50));

        manager.close();
        manager.close();
        assert!(receiver.join().unwrap().is_none());
        assert_eq!(manager.state(), ConnectionState::Stopped);
        assert!(manager.is_closing());
        assert!(!manager.send(cam(4)));
    }

    #[test]
    fn test_close_while_broker_down() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let manager =
            ConnectionManager::connect(fast_options(6), MemoryTransport::new(broker)).unwrap();
        thread::sleep(Duration::from_millis(30));
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Stopped);
    }
}
