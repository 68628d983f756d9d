// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound path: envelope validation, decode and handler dispatch.
//!
//! Runs on the receive thread only, which is what lets the reassembly cache
//! and the handler live here without locks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use super::handler::MessageHandler;
use crate::codec::MessageCodec;
use crate::logging::THROTTLE_PERIOD;
use crate::message::pdu::ItsMessage;
use crate::message::{
    BinaryMessage, Body, Envelope, MessageType, PropertyValue, PROP_DESTINATION_STATION_ID,
    PROP_MESSAGE_ID, PROP_STATION_ID,
};
use crate::reassembly::{Insert, ReassemblyCache};

/// Why an inbound envelope was dropped before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    MissingMessageId,
    UnknownMessageType(String),
    SubjectMismatch {
        message_type: MessageType,
        subject: String,
    },
    MissingStationId,
    UnsupportedBody,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::MissingMessageId => write!(f, "message id not set"),
            Discard::UnknownMessageType(mid) => write!(f, "message type unknown: {}", mid),
            Discard::SubjectMismatch {
                message_type,
                subject,
            } => write!(
                f,
                "subject '{}' does not match message type {}",
                subject, message_type
            ),
            Discard::MissingStationId => write!(f, "station id not set"),
            Discard::UnsupportedBody => write!(f, "body is neither binary nor text"),
        }
    }
}

fn integer_property<T: TryFrom<i64>>(envelope: &Envelope, key: &str) -> Option<T> {
    envelope
        .property(key)
        .and_then(PropertyValue::as_i64)
        .and_then(|v| T::try_from(v).ok())
}

/// Check routing fields and extract the payload.
///
/// Order: message id present, known type, subject matches the type label,
/// station id present, then body kind.
pub fn validate(envelope: Envelope) -> Result<BinaryMessage, Discard> {
    let mid = envelope
        .property(PROP_MESSAGE_ID)
        .ok_or(Discard::MissingMessageId)?;
    let message_type = mid
        .as_i64()
        .and_then(|v| u16::try_from(v).ok())
        .and_then(MessageType::from_tag)
        .ok_or_else(|| Discard::UnknownMessageType(format!("{:?}", mid)))?;

    if envelope.subject != message_type.label() {
        return Err(Discard::SubjectMismatch {
            message_type,
            subject: envelope.subject,
        });
    }

    let station_id = integer_property(&envelope, PROP_STATION_ID).ok_or(Discard::MissingStationId)?;
    let destination_station_id = integer_property(&envelope, PROP_DESTINATION_STATION_ID);

    let data = match envelope.body {
        Body::Binary(bytes) => bytes,
        Body::Text(text) => text.into_bytes(),
        Body::Empty => return Err(Discard::UnsupportedBody),
    };

    Ok(BinaryMessage {
        message_type,
        station_id,
        destination_station_id,
        creation_time_ms: envelope.creation_time_ms,
        data,
    })
}

/// Handler entry for a directly dispatched type.
type DirectFn<H> = fn(&mut H, ItsMessage, &BinaryMessage) -> bool;

enum Route<H> {
    Direct(DirectFn<H>),
    /// Segmented type, goes through the reassembly cache.
    Reassemble,
}

/// Type tag -> handler table. Types without an entry are discarded.
fn routing_table<H: MessageHandler>() -> HashMap<MessageType, Route<H>> {
    let mut routes: HashMap<MessageType, Route<H>> = HashMap::new();
    routes.insert(
        MessageType::Cam,
        Route::Direct(|h, msg, meta| match msg {
            ItsMessage::Cam(cam) => {
                h.on_cam(&cam, meta);
                true
            }
            _ => false,
        }),
    );
    routes.insert(
        MessageType::Vam,
        Route::Direct(|h, msg, meta| match msg {
            ItsMessage::Vam(vam) => {
                h.on_vam(&vam, meta);
                true
            }
            _ => false,
        }),
    );
    routes.insert(
        MessageType::Mcm,
        Route::Direct(|h, msg, meta| match msg {
            ItsMessage::Mcm(mcm) => {
                h.on_mcm(&mcm, meta);
                true
            }
            _ => false,
        }),
    );
    routes.insert(MessageType::Cpm, Route::Reassemble);
    routes
}

/// Counters kept by the receive thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages handed to a handler callback (complete CPMs count once more)
    pub delivered: u64,
    /// Envelopes dropped by validation, routing or decoding
    pub discarded: u64,
    /// Reassembly entries dropped by the retention sweep
    pub evicted: u64,
}

pub(crate) struct Dispatcher<H> {
    handler: H,
    codec: Arc<dyn MessageCodec>,
    cache: ReassemblyCache,
    routes: HashMap<MessageType, Route<H>>,
    stats: DispatchStats,
}

impl<H: MessageHandler> Dispatcher<H> {
    pub(crate) fn new(handler: H, codec: Arc<dyn MessageCodec>, cache: ReassemblyCache) -> Self {
        Self {
            handler,
            codec,
            cache,
            routes: routing_table(),
            stats: DispatchStats::default(),
        }
    }

    pub(crate) fn handler(&self) -> &H {
        &self.handler
    }

    pub(crate) fn into_handler(self) -> H {
        self.handler
    }

    pub(crate) fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub(crate) fn set_cache(&mut self, cache: ReassemblyCache) {
        self.cache = cache;
    }

    /// Validate, decode and dispatch one envelope, then sweep the cache.
    pub(crate) fn process(&mut self, envelope: Envelope, now_unix_ns: u64) {
        if !self.dispatch(envelope) {
            self.stats.discarded += 1;
        }
        self.sweep(now_unix_ns);
    }

    /// Retention sweep of the reassembly cache.
    pub(crate) fn sweep(&mut self, now_unix_ns: u64) {
        let evicted = self.cache.evict_expired(now_unix_ns);
        self.stats.evicted += evicted.len() as u64;
    }

    fn dispatch(&mut self, envelope: Envelope) -> bool {
        let meta = match validate(envelope) {
            Ok(meta) => meta,
            Err(reason) => {
                crate::warn_throttled!(THROTTLE_PERIOD, "[transceiver] discarding envelope: {}", reason);
                return false;
            }
        };

        let Some(route) = self.routes.get(&meta.message_type) else {
            crate::warn_throttled!(
                THROTTLE_PERIOD,
                "[transceiver] no handler registered for {} from station {}",
                meta.message_type,
                meta.station_id
            );
            return false;
        };

        let message = match self.codec.decode(meta.message_type, &meta.data) {
            Ok(message) => message,
            Err(e) => {
                crate::warn_throttled!(
                    THROTTLE_PERIOD,
                    "[transceiver] station {}: {}",
                    meta.station_id,
                    e
                );
                return false;
            }
        };

        match route {
            Route::Direct(deliver) => {
                if deliver(&mut self.handler, message, &meta) {
                    self.stats.delivered += 1;
                    true
                } else {
                    crate::warn_throttled!(
                        THROTTLE_PERIOD,
                        "[transceiver] codec returned a different type for {}",
                        meta.message_type
                    );
                    false
                }
            }
            Route::Reassemble => {
                let ItsMessage::Cpm(cpm) = message else {
                    crate::warn_throttled!(
                        THROTTLE_PERIOD,
                        "[transceiver] codec returned a different type for {}",
                        meta.message_type
                    );
                    return false;
                };
                self.handler.on_cpm_segment(&cpm, &meta);
                self.stats.delivered += 1;
                match self.cache.insert(cpm) {
                    Insert::Complete(complete) => {
                        debug!(
                            "[transceiver] station {}: CPM complete ({} segments)",
                            complete.station_id,
                            complete.segments.len()
                        );
                        self.handler.on_complete_cpm(
                            complete.station_id,
                            complete.segments,
                            complete.reference_time_ns,
                        );
                        self.stats.delivered += 1;
                    }
                    Insert::Pending { .. } | Insert::Rejected(_) => {}
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeCodec;
    use crate::message::pdu::{Cam, Cpm};
    use crate::message::StationId;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        cams: Vec<StationId>,
        segments: usize,
        complete: Vec<(StationId, Vec<u8>)>,
    }

    impl MessageHandler for Recorder {
        fn on_cam(&mut self, cam: &Cam, meta: &BinaryMessage) {
            assert_eq!(cam.header.station_id, meta.station_id);
            self.cams.push(meta.station_id);
        }

        fn on_cpm_segment(&mut self, _cpm: &Cpm, _meta: &BinaryMessage) {
            self.segments += 1;
        }

        fn on_complete_cpm(&mut self, station_id: StationId, segments: BTreeMap<u8, Cpm>, _: u64) {
            self.complete
                .push((station_id, segments.keys().copied().collect()));
        }
    }

    fn dispatcher() -> Dispatcher<Recorder> {
        Dispatcher::new(
            Recorder::default(),
            Arc::new(BincodeCodec),
            ReassemblyCache::new(Duration::from_secs(60)),
        )
    }

    fn encoded(message: ItsMessage, station: StationId) -> Envelope {
        let ty = message.message_type();
        let bytes = BincodeCodec.encode(&message).unwrap();
        Envelope::for_message(ty, station, None, bytes)
    }

    #[test]
    fn test_validate_order() {
        let good = Envelope::for_message(MessageType::Cam, 5, Some(6), vec![1]);
        let meta = validate(good.clone()).unwrap();
        assert_eq!(meta.message_type, MessageType::Cam);
        assert_eq!(meta.station_id, 5);
        assert_eq!(meta.destination_station_id, Some(6));

        let mut env = good.clone();
        env.properties.remove(PROP_MESSAGE_ID);
        assert_eq!(validate(env), Err(Discard::MissingMessageId));

        let mut env = good.clone();
        env.properties
            .insert(PROP_MESSAGE_ID.into(), PropertyValue::UShort(9));
        assert!(matches!(validate(env), Err(Discard::UnknownMessageType(_))));

        let mut env = good.clone();
        env.subject = "vam".into();
        assert!(matches!(validate(env), Err(Discard::SubjectMismatch { .. })));

        let mut env = good.clone();
        env.properties.remove(PROP_STATION_ID);
        assert_eq!(validate(env), Err(Discard::MissingStationId));

        let mut env = good.clone();
        env.body = Body::Empty;
        assert_eq!(validate(env), Err(Discard::UnsupportedBody));

        let mut env = good;
        env.body = Body::Text("abc".into());
        assert_eq!(validate(env).unwrap().data, b"abc".to_vec());
    }

    #[test]
    fn test_direct_dispatch() {
        let mut d = dispatcher();
        d.process(encoded(ItsMessage::Cam(Cam::new(12, 100)), 12), 0);
        assert_eq!(d.handler().cams, vec![12]);
        assert_eq!(d.stats().delivered, 1);
    }

    #[test]
    fn test_mismatched_subject_never_reaches_handler() {
        let mut d = dispatcher();
        let mut env = encoded(ItsMessage::Cam(Cam::new(12, 100)), 12);
        env.subject = "cpm".into();
        d.process(env, 0);
        assert!(d.handler().cams.is_empty());
        assert_eq!(d.stats().discarded, 1);
    }

    #[test]
    fn test_denm_has_no_route() {
        let mut d = dispatcher();
        d.process(Envelope::for_message(MessageType::Denm, 3, None, vec![0; 4]), 0);
        assert_eq!(d.stats().discarded, 1);
    }

    #[test]
    fn test_garbage_payload_discarded() {
        let mut d = dispatcher();
        d.process(Envelope::for_message(MessageType::Cam, 3, None, vec![1, 2]), 0);
        assert_eq!(d.stats().discarded, 1);
        assert!(d.handler().cams.is_empty());
    }

    #[test]
    fn test_segmented_cpm() {
        let mut d = dispatcher();
        for index in [2u8, 1] {
            let cpm = Cpm::new(8, 590_000_000_000).with_segment(index, 2);
            d.process(encoded(ItsMessage::Cpm(cpm), 8), 0);
        }
        let recorder = d.into_handler();
        assert_eq!(recorder.segments, 2);
        assert_eq!(recorder.complete, vec![(8, vec![1, 2])]);
    }

    #[test]
    fn test_sweep_evicts_stale_entries() {
        let mut d = dispatcher();
        let cpm = Cpm::new(8, 590_000_000_000).with_segment(1, 2);
        d.process(encoded(ItsMessage::Cpm(cpm), 8), 0);
        // Far in the future: the pending entry is older than the window
        d.sweep(u64::MAX);
        assert_eq!(d.stats().evicted, 1);
        assert!(d.into_handler().complete.is_empty());
    }
}
