// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collective perception segment reassembly.
//!
//! A CPM may be split into 1..N segments sharing the sender's station id and
//! the management container reference time. Segments are buffered per
//! `(station_id, reference time)` until every announced index is present,
//! then handed out as one ordered set.
//!
//! - Segments may arrive in any order; re-delivery of an index overwrites.
//! - The total announced by the first segment of a key is authoritative.
//!   Later segments announcing another total are rejected, as are index 0,
//!   an index above the total and a total of 0.
//! - [`ReassemblyCache::evict_expired`] drops every entry whose reference
//!   time lies outside `now +/- retention`. Reference times are set by the
//!   remote station, so entries stamped far in the future go too.
//! - At most `max_pending` sets are buffered; a new key beyond that evicts
//!   the set with the oldest reference time.
//!
//! Not thread-safe by design: the transceiver's receive thread owns it.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use log::debug;

use crate::logging::THROTTLE_PERIOD;
use crate::message::pdu::Cpm;
use crate::message::StationId;
use crate::time;

/// `(station id, reference time as Unix ns)`
pub type ReassemblyKey = (StationId, u64);

/// Default bound on incomplete segment sets.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Outcome of [`ReassemblyCache::insert`].
#[derive(Debug, PartialEq)]
pub enum Insert {
    /// Last missing segment arrived; the entry was removed.
    Complete(CompleteCpm),
    /// Stored, still waiting for more segments.
    Pending { received: usize, total: u8 },
    /// Not stored.
    Rejected(RejectReason),
}

/// Why a segment was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Index outside `1..=total`, or total of 0.
    InvalidIndex { this_msg_no: u8, total_msg_no: u8 },
    /// Total differs from the one announced by the first segment.
    TotalMismatch { announced: u8, received: u8 },
}

/// Fully reassembled CPM.
#[derive(Debug, PartialEq)]
pub struct CompleteCpm {
    pub station_id: StationId,
    /// Reference time, Unix nanoseconds
    pub reference_time_ns: u64,
    /// Segments by 1-based index
    pub segments: BTreeMap<u8, Cpm>,
}

/// Entry removed by [`ReassemblyCache::evict_expired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub station_id: StationId,
    pub reference_time_ns: u64,
    pub received: usize,
    pub total: u8,
}

impl Evicted {
    pub fn is_complete(&self) -> bool {
        self.received == usize::from(self.total)
    }
}

struct SegmentSet {
    segments: BTreeMap<u8, Cpm>,
    /// Total announced by the first segment
    total: u8,
}

/// Keyed store of in-progress segmented CPMs.
pub struct ReassemblyCache {
    pending: HashMap<ReassemblyKey, SegmentSet>,
    retention: Duration,
    max_pending: usize,
}

impl ReassemblyCache {
    /// Cache evicting entries further than `retention` from now.
    pub fn new(retention: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            retention,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Bound the number of incomplete sets (at least 1).
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Store a segment and report whether its set is now complete.
    pub fn insert(&mut self, cpm: Cpm) -> Insert {
        let (this_msg_no, total_msg_no) = cpm.segment();
        let station_id = cpm.header.station_id;

        if total_msg_no == 0 || this_msg_no == 0 || this_msg_no > total_msg_no {
            crate::warn_throttled!(
                THROTTLE_PERIOD,
                "[reassembly] station {}: invalid segment {}/{}",
                station_id,
                this_msg_no,
                total_msg_no
            );
            return Insert::Rejected(RejectReason::InvalidIndex {
                this_msg_no,
                total_msg_no,
            });
        }

        let reference_time_ns = time::its_time_to_unix(cpm.management.reference_time);
        let key = (station_id, reference_time_ns);
        if !self.pending.contains_key(&key) && self.pending.len() >= self.max_pending {
            self.evict_oldest();
        }

        let set = self.pending.entry(key).or_insert_with(|| SegmentSet {
            segments: BTreeMap::new(),
            total: total_msg_no,
        });
        if set.total != total_msg_no {
            crate::warn_throttled!(
                THROTTLE_PERIOD,
                "[reassembly] station {}: segment {} announces {} segments, first segment announced {}",
                station_id,
                this_msg_no,
                total_msg_no,
                set.total
            );
            return Insert::Rejected(RejectReason::TotalMismatch {
                announced: set.total,
                received: total_msg_no,
            });
        }

        set.segments.insert(this_msg_no, cpm);
        let received = set.segments.len();
        let total = set.total;
        if received < usize::from(total) {
            debug!(
                "[reassembly] station {}: {}/{} segments",
                station_id, received, total
            );
            return Insert::Pending { received, total };
        }

        let segments = self
            .pending
            .remove(&key)
            .map(|set| set.segments)
            .unwrap_or_default();
        Insert::Complete(CompleteCpm {
            station_id,
            reference_time_ns,
            segments,
        })
    }

    /// Remove entries whose reference time lies outside the retention
    /// window around `now_unix_ns`. Incomplete evictions are logged.
    pub fn evict_expired(&mut self, now_unix_ns: u64) -> Vec<Evicted> {
        let retention_ns = u64::try_from(self.retention.as_nanos()).unwrap_or(u64::MAX);
        let window =
            now_unix_ns.saturating_sub(retention_ns)..=now_unix_ns.saturating_add(retention_ns);

        let mut evicted = Vec::new();
        self.pending.retain(|&(station_id, reference_time_ns), set| {
            if window.contains(&reference_time_ns) {
                return true;
            }
            let entry = Evicted {
                station_id,
                reference_time_ns,
                received: set.segments.len(),
                total: set.total,
            };
            if !entry.is_complete() {
                crate::warn_throttled!(
                    THROTTLE_PERIOD,
                    "[reassembly] station {}: segment count mismatch, evicting {}/{} segments",
                    station_id,
                    entry.received,
                    entry.total
                );
            }
            evicted.push(entry);
            false
        });
        evicted
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .keys()
            .min_by_key(|&&(_, reference_time_ns)| reference_time_ns)
            .copied();
        let Some(key) = oldest else {
            return;
        };
        if let Some(set) = self.pending.remove(&key) {
            crate::warn_throttled!(
                THROTTLE_PERIOD,
                "[reassembly] {} sets pending, dropping station {} ({}/{} segments)",
                self.max_pending,
                key.0,
                set.segments.len(),
                set.total
            );
        }
    }

    /// Number of incomplete sets.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
