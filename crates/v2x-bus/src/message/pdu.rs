// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed ITS PDUs.
//!
//! A reduced, owned model of the ETSI structures exchanged on the bus. Field
//! semantics belong to the application; this crate only reads the header,
//! the generation delta time and the CPM management container.

use serde::{Deserialize, Serialize};

use super::{MessageType, StationId};

/// ETSI `messageID` values carried in the PDU header.
pub mod message_id {
    pub const DENM: u8 = 1;
    pub const CAM: u8 = 2;
    pub const CPM: u8 = 14;
    pub const VAM: u8 = 16;
    pub const MCM: u8 = 20;
}

/// Protocol version written by [`ItsPduHeader::new`].
pub const PROTOCOL_VERSION: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItsPduHeader {
    pub protocol_version: u8,
    pub message_id: u8,
    pub station_id: StationId,
}

impl ItsPduHeader {
    pub fn new(message_id: u8, station_id: StationId) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            message_id,
            station_id,
        }
    }
}

/// WGS84 position with 1e-7 degree resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePosition {
    pub latitude: i32,
    pub longitude: i32,
    /// 0.01 m
    pub altitude: i32,
    /// 95 % semi-major axis confidence, 0.01 m
    pub semi_major_confidence: u16,
    pub semi_minor_confidence: u16,
    /// `Wgs84AngleValue` of the semi-major axis
    pub semi_major_orientation: u16,
}

impl ReferencePosition {
    pub const LATITUDE_UNAVAILABLE: i32 = 900_000_001;
    pub const LONGITUDE_UNAVAILABLE: i32 = 1_800_000_001;

    /// Position with unavailable coordinates.
    pub fn unavailable() -> Self {
        Self {
            latitude: Self::LATITUDE_UNAVAILABLE,
            longitude: Self::LONGITUDE_UNAVAILABLE,
            ..Self::default()
        }
    }
}

/// Motion state shared by awareness messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kinematics {
    /// `Wgs84AngleValue`
    pub heading: u16,
    pub heading_confidence: u8,
    /// 0.01 m/s
    pub speed: u16,
    pub speed_confidence: u8,
    /// 0.01 deg/s
    pub yaw_rate: i16,
    pub yaw_rate_confidence: u8,
}

/// Cooperative Awareness Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cam {
    pub header: ItsPduHeader,
    pub generation_delta_time: u16,
    pub station_type: u8,
    pub reference_position: ReferencePosition,
    pub kinematics: Kinematics,
}

impl Cam {
    pub fn new(station_id: StationId, generation_delta_time: u16) -> Self {
        Self {
            header: ItsPduHeader::new(message_id::CAM, station_id),
            generation_delta_time,
            station_type: 5, // passenger car
            reference_position: ReferencePosition::unavailable(),
            kinematics: Kinematics::default(),
        }
    }
}

/// VRU Awareness Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vam {
    pub header: ItsPduHeader,
    pub generation_delta_time: u16,
    pub station_type: u8,
    pub reference_position: ReferencePosition,
    pub kinematics: Kinematics,
}

impl Vam {
    pub fn new(station_id: StationId, generation_delta_time: u16) -> Self {
        Self {
            header: ItsPduHeader::new(message_id::VAM, station_id),
            generation_delta_time,
            station_type: 1, // pedestrian
            reference_position: ReferencePosition::unavailable(),
            kinematics: Kinematics::default(),
        }
    }
}

/// Segment position inside a multi-part CPM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationInfo {
    /// Announced number of segments (1-based count)
    pub total_msg_no: u8,
    /// Index of this segment (1-based)
    pub this_msg_no: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementContainer {
    /// `TimestampIts`, milliseconds since 2004-01-01 with leap seconds
    pub reference_time: u64,
    pub reference_position: ReferencePosition,
    pub segmentation_info: Option<SegmentationInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceivedObject {
    pub object_id: u16,
    /// Offset from the reference time, milliseconds
    pub measurement_delta_time: i16,
    /// Position relative to the reference position, 0.01 m
    pub x_distance: i32,
    pub y_distance: i32,
    pub x_speed: i16,
    pub y_speed: i16,
    /// 0..=100
    pub existence_probability: u8,
}

/// Collective Perception Message (one segment).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpm {
    pub header: ItsPduHeader,
    pub management: ManagementContainer,
    pub perceived_objects: Vec<PerceivedObject>,
}

impl Cpm {
    pub fn new(station_id: StationId, reference_time: u64) -> Self {
        Self {
            header: ItsPduHeader::new(message_id::CPM, station_id),
            management: ManagementContainer {
                reference_time,
                reference_position: ReferencePosition::unavailable(),
                segmentation_info: None,
            },
            perceived_objects: Vec::new(),
        }
    }

    /// Mark this CPM as segment `this_msg_no` of `total_msg_no`.
    pub fn with_segment(mut self, this_msg_no: u8, total_msg_no: u8) -> Self {
        self.management.segmentation_info = Some(SegmentationInfo {
            total_msg_no,
            this_msg_no,
        });
        self
    }

    /// `(this_msg_no, total_msg_no)`; a CPM without segmentation info is 1 of 1.
    pub fn segment(&self) -> (u8, u8) {
        self.management
            .segmentation_info
            .map_or((1, 1), |s| (s.this_msg_no, s.total_msg_no))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverIntent {
    KeepLane,
    LaneChangeLeft,
    LaneChangeRight,
    Stop,
    Yield,
}

/// Maneuver Coordination Message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mcm {
    pub header: ItsPduHeader,
    pub generation_delta_time: u16,
    pub reference_position: ReferencePosition,
    pub intent: ManeuverIntent,
    /// Planned trajectory as offsets from the reference position, 0.01 m
    pub trajectory: Vec<(i32, i32)>,
}

impl Mcm {
    pub fn new(station_id: StationId, generation_delta_time: u16, intent: ManeuverIntent) -> Self {
        Self {
            header: ItsPduHeader::new(message_id::MCM, station_id),
            generation_delta_time,
            reference_position: ReferencePosition::unavailable(),
            intent,
            trajectory: Vec::new(),
        }
    }
}

/// Any decodable ITS message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItsMessage {
    Cam(Cam),
    Vam(Vam),
    Cpm(Cpm),
    Mcm(Mcm),
}

impl ItsMessage {
    /// Bus routing type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            ItsMessage::Cam(_) => MessageType::Cam,
            ItsMessage::Vam(_) => MessageType::Vam,
            ItsMessage::Cpm(_) => MessageType::Cpm,
            ItsMessage::Mcm(_) => MessageType::Mcm,
        }
    }

    pub fn header(&self) -> &ItsPduHeader {
        match self {
            ItsMessage::Cam(m) => &m.header,
            ItsMessage::Vam(m) => &m.header,
            ItsMessage::Cpm(m) => &m.header,
            ItsMessage::Mcm(m) => &m.header,
        }
    }
}

impl From<Cam> for ItsMessage {
    fn from(m: Cam) -> Self {
        ItsMessage::Cam(m)
    }
}

impl From<Vam> for ItsMessage {
    fn from(m: Vam) -> Self {
        ItsMessage::Vam(m)
    }
}

impl From<Cpm> for ItsMessage {
    fn from(m: Cpm) -> Self {
        ItsMessage::Cpm(m)
    }
}

impl From<Mcm> for ItsMessage {
    fn from(m: Mcm) -> Self {
        ItsMessage::Mcm(m)
    }
}
