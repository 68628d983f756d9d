// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire envelopes and ITS message types.
//!
//! An [`Envelope`] is the unit exchanged with the broker: a subject (the
//! routing label), a property bag, a creation timestamp, a time-to-live and
//! an opaque body. The transceiver validates inbound envelopes into a
//! [`BinaryMessage`] before handing the body to the codec.
//!
//! # Envelope fields
//!
//! | field | carried as | rule |
//! |-------|------------|------|
//! | type tag | property `mid` (u16) | one of [`MessageType`] |
//! | routing label | subject | must equal the tag's label |
//! | station id | property `station_id` (u32) | sender |
//! | destination | property `destination_station_id` (u32) | optional |
//! | creation time | `creation_time_ms` | Unix ms at send |
//! | time-to-live | `ttl` | 1000 ms, 100 ms for CPM |

pub mod pdu;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time;

/// Property key of the message type tag.
pub const PROP_MESSAGE_ID: &str = "mid";
/// Property key of the sending station.
pub const PROP_STATION_ID: &str = "station_id";
/// Property key of the destination station.
pub const PROP_DESTINATION_STATION_ID: &str = "destination_station_id";

/// Default time-to-live of outbound envelopes.
pub const DEFAULT_TTL: Duration = Duration::from_millis(1000);
/// Time-to-live of collective perception segments.
pub const CPM_TTL: Duration = Duration::from_millis(100);

/// ITS station identifier.
pub type StationId = u32;

// ============================================================================
// Message type
// ============================================================================

/// ETSI message type tags used for routing on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageType {
    /// Decentralized Environmental Notification Message
    Denm = 2048,
    /// Collective Perception Message (segmented)
    Cpm = 2049,
    /// Cooperative Awareness Message
    Cam = 2050,
    /// VRU Awareness Message
    Vam = 2051,
    /// Maneuver Coordination Message
    Mcm = 2052,
}

impl MessageType {
    /// All known types.
    pub const ALL: [MessageType; 5] = [
        MessageType::Denm,
        MessageType::Cpm,
        MessageType::Cam,
        MessageType::Vam,
        MessageType::Mcm,
    ];

    /// Look up a tag received from the wire.
    pub fn from_tag(tag: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Numeric tag (`mid` property).
    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Canonical lowercase routing label (envelope subject).
    pub fn label(self) -> &'static str {
        match self {
            MessageType::Denm => "denm",
            MessageType::Cpm => "cpm",
            MessageType::Cam => "cam",
            MessageType::Vam => "vam",
            MessageType::Mcm => "mcm",
        }
    }

    /// Time-to-live applied to outbound envelopes of this type.
    pub fn ttl(self) -> Duration {
        match self {
            MessageType::Cpm => CPM_TTL,
            _ => DEFAULT_TTL,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Typed application property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    UShort(u16),
    UInt(u32),
    Long(i64),
    Bool(bool),
    String(String),
}

impl PropertyValue {
    /// Integer view used by numeric comparisons.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::UShort(v) => Some(i64::from(*v)),
            PropertyValue::UInt(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::Bool(_) | PropertyValue::String(_) => None,
        }
    }
}

/// Envelope body.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Opaque binary payload (the normal case).
    Binary(Vec<u8>),
    /// Text payload, accepted as its UTF-8 bytes.
    Text(String),
    /// No body at all.
    Empty,
}

/// Routable wire unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Routing label
    pub subject: String,
    /// Application properties
    pub properties: BTreeMap<String, PropertyValue>,
    /// Creation time, Unix milliseconds
    pub creation_time_ms: i64,
    /// Time-to-live
    pub ttl: Duration,
    /// Payload
    pub body: Body,
}

impl Envelope {
    /// Build an outbound envelope for an encoded ITS payload.
    pub fn for_message(
        message_type: MessageType,
        station_id: StationId,
        destination: Option<StationId>,
        payload: Vec<u8>,
    ) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            PROP_MESSAGE_ID.to_string(),
            PropertyValue::UShort(message_type.tag()),
        );
        properties.insert(
            PROP_STATION_ID.to_string(),
            PropertyValue::UInt(station_id),
        );
        if let Some(destination) = destination {
            properties.insert(
                PROP_DESTINATION_STATION_ID.to_string(),
                PropertyValue::UInt(destination),
            );
        }

        Self {
            subject: message_type.label().to_string(),
            properties,
            creation_time_ms: (time::now_unix_ns() / 1_000_000) as i64,
            ttl: message_type.ttl(),
            body: Body::Binary(payload),
        }
    }

    /// Look up a property.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Whether the time-to-live has elapsed at `now_ms` (Unix milliseconds).
    pub fn is_expired(&self, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.creation_time_ms) > ttl_ms
    }
}

// ============================================================================
// Binary message
// ============================================================================

/// Validated inbound envelope metadata plus raw payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMessage {
    pub message_type: MessageType,
    pub station_id: StationId,
    pub destination_station_id: Option<StationId>,
    /// Envelope creation time, Unix milliseconds
    pub creation_time_ms: i64,
    pub data: Vec<u8>,
}

impl BinaryMessage {
    /// Reconstruct the generation time of a message carrying `gdt`,
    /// using the envelope creation time as reference.
    pub fn generation_time(&self, gdt: u16) -> u64 {
        let reference_ns = u64::try_from(self.creation_time_ms)
            .unwrap_or(0)
            .saturating_mul(1_000_000);
        time::generation_delta_time_to_unix(gdt, reference_ns)
    }
}
