// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload codec seam.
//!
//! The bus treats bodies as opaque bytes; a [`MessageCodec`] turns them into
//! typed [`ItsMessage`] values and back. Decoded values are owned, so any
//! codec-side allocation is released when they go out of scope, whichever
//! path the caller takes.

use crate::error::CodecError;
use crate::message::pdu::ItsMessage;
use crate::message::MessageType;

/// Encoder/decoder for ITS payloads.
///
/// Implementations must be usable from the receive thread and from any
/// producer thread at the same time.
pub trait MessageCodec: Send + Sync + 'static {
    /// Encode a typed message into wire bytes.
    fn encode(&self, message: &ItsMessage) -> Result<Vec<u8>, CodecError>;

    /// Decode wire bytes of the given type.
    ///
    /// Returns [`CodecError::Unsupported`] for types without a schema.
    fn decode(&self, message_type: MessageType, bytes: &[u8]) -> Result<ItsMessage, CodecError>;
}

/// Compact serde/bincode codec.
///
/// Each message type is encoded as its bare struct so a payload carries no
/// enum discriminant; the envelope `mid` property identifies the type.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn encode_err(message_type: MessageType, e: bincode::Error) -> CodecError {
        CodecError::Encode {
            message_type,
            reason: e.to_string(),
        }
    }

    fn decode_err(message_type: MessageType, e: bincode::Error) -> CodecError {
        CodecError::Decode {
            message_type,
            reason: e.to_string(),
        }
    }
}

impl MessageCodec for BincodeCodec {
    fn encode(&self, message: &ItsMessage) -> Result<Vec<u8>, CodecError> {
        let message_type = message.message_type();
        let encoded = match message {
            ItsMessage::Cam(m) => bincode::serialize(m),
            ItsMessage::Vam(m) => bincode::serialize(m),
            ItsMessage::Cpm(m) => bincode::serialize(m),
            ItsMessage::Mcm(m) => bincode::serialize(m),
        };
        encoded.map_err(|e| Self::encode_err(message_type, e))
    }

    fn decode(&self, message_type: MessageType, bytes: &[u8]) -> Result<ItsMessage, CodecError> {
        let err = |e| Self::decode_err(message_type, e);
        match message_type {
            MessageType::Cam => bincode::deserialize(bytes).map(ItsMessage::Cam).map_err(err),
            MessageType::Vam => bincode::deserialize(bytes).map(ItsMessage::Vam).map_err(err),
            MessageType::Cpm => bincode::deserialize(bytes).map(ItsMessage::Cpm).map_err(err),
            MessageType::Mcm => bincode::deserialize(bytes).map(ItsMessage::Mcm).map_err(err),
            MessageType::Denm => Err(CodecError::Unsupported(message_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::pdu::{Cam, Cpm, PerceivedObject};

    #[test]
    fn test_cpm_payload() {
        let mut cpm = Cpm::new(77, 590_000_000_000).with_segment(2, 3);
        cpm.perceived_objects.push(PerceivedObject {
            object_id: 4,
            x_distance: -1250,
            existence_probability: 90,
            ..PerceivedObject::default()
        });
        let msg = ItsMessage::Cpm(cpm);

        let bytes = BincodeCodec.encode(&msg).unwrap();
        let decoded = BincodeCodec.decode(MessageType::Cpm, &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_truncated_payload_is_decode_error() {
        let bytes = BincodeCodec.encode(&ItsMessage::Cam(Cam::new(1, 5))).unwrap();
        let err = BincodeCodec
            .decode(MessageType::Cam, &bytes[..bytes.len() / 2])
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::Decode {
                message_type: MessageType::Cam,
                ..
            }
        ));
    }

    #[test]
    fn test_denm_unsupported() {
        let err = BincodeCodec.decode(MessageType::Denm, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(MessageType::Denm)));
    }
}
