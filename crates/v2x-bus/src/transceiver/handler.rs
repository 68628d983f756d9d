// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::BTreeMap;

use crate::message::pdu::{Cam, Cpm, Mcm, Vam};
use crate::message::{BinaryMessage, StationId};

/// Application callbacks, one per message capability.
///
/// Every method defaults to a no-op, so an application only overrides the
/// message types it cares about. All callbacks run on the transceiver's
/// receive thread, one at a time, outside any internal lock: a handler may
/// send through a [`Publisher`](super::Publisher) without deadlocking.
pub trait MessageHandler: Send + 'static {
    /// Cooperative Awareness Message.
    fn on_cam(&mut self, _cam: &Cam, _meta: &BinaryMessage) {}

    /// VRU Awareness Message.
    fn on_vam(&mut self, _vam: &Vam, _meta: &BinaryMessage) {}

    /// One CPM segment, before reassembly.
    fn on_cpm_segment(&mut self, _cpm: &Cpm, _meta: &BinaryMessage) {}

    /// Every segment of a CPM, keyed by 1-based index.
    ///
    /// `reference_time_ns` is the management container reference time as
    /// Unix nanoseconds.
    fn on_complete_cpm(
        &mut self,
        _station_id: StationId,
        _segments: BTreeMap<u8, Cpm>,
        _reference_time_ns: u64,
    ) {
    }

    /// Maneuver Coordination Message.
    fn on_mcm(&mut self, _mcm: &Mcm, _meta: &BinaryMessage) {}
}

/// Handler that ignores everything (send-only stations).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl MessageHandler for NoopHandler {}
