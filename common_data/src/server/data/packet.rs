//! Framed packet codec shared by the server and its clients.
//!
//! Every datagram carries exactly one frame:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────┬──────────┐
//! │ HEAD u16 │ code u16 │ len u16  │ payload [L] │ TAIL u16 │
//! │ 0x2B3C   │          │ L        │             │ 0x4D5F   │
//! └──────────┴──────────┴──────────┴─────────────┴──────────┘
//! ```
//!
//! All fields are big-endian. A frame is `8 + L` bytes long and decoding
//! rejects anything that is not exactly that.

use std::fmt;

use thiserror::Error;

pub const PACKET_HEAD: u16 = 0x2B3C;
pub const PACKET_TAIL: u16 = 0x4D5F;

/// Bytes added around the payload (head, code, length, tail).
pub const FRAME_OVERHEAD: usize = 8;

pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Packet code carried in the frame header.
///
/// Codes outside the named set are still valid on the wire; they simply
/// have no handler on the receiving side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketCode(pub u16);

impl PacketCode {
    pub const NONE: PacketCode = PacketCode(0);
    pub const HEART_BEAT_REQ: PacketCode = PacketCode(1);
    pub const HEART_BEAT_RSP: PacketCode = PacketCode(2);
    pub const QUIT_NOTIFY: PacketCode = PacketCode(3);
    pub const FACE_DATA: PacketCode = PacketCode(4);
    pub const POSE_DATA: PacketCode = PacketCode(5);

    pub fn name(self) -> Option<&'static str> {
        match self {
            PacketCode::NONE => Some("NONE"),
            PacketCode::HEART_BEAT_REQ => Some("HEART_BEAT_REQ"),
            PacketCode::HEART_BEAT_RSP => Some("HEART_BEAT_RSP"),
            PacketCode::QUIT_NOTIFY => Some("QUIT_NOTIFY"),
            PacketCode::FACE_DATA => Some("FACE_DATA"),
            PacketCode::POSE_DATA => Some("POSE_DATA"),
            _ => None,
        }
    }
}

impl From<u16> for PacketCode {
    fn from(value: u16) -> Self {
        PacketCode(value)
    }
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

impl fmt::Debug for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketCode({})", self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload of {0} bytes does not fit a 16-bit length field")]
    PayloadTooLarge(usize),
}

/// Why a datagram was not accepted as a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("bad head constant {0:#06x}")]
    BadHead(u16),

    #[error("declared frame size {declared} does not match datagram size {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("bad tail constant {0:#06x}")]
    BadTail(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    code: PacketCode,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(code: PacketCode, payload: Vec<u8>) -> Result<Packet, PacketError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PacketError::PayloadTooLarge(payload.len()));
        }

        Ok(Packet { code, payload })
    }

    /// Header-only control packet.
    pub fn empty(code: PacketCode) -> Packet {
        Packet {
            code,
            payload: Vec::new(),
        }
    }

    pub fn code(&self) -> PacketCode {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the encoded frame in bytes.
    pub fn frame_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.frame_len());
        self.encode_into(&mut buffer);
        buffer
    }

    /// Appends the encoded frame to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.reserve(self.frame_len());
        buffer.extend_from_slice(&PACKET_HEAD.to_be_bytes());
        buffer.extend_from_slice(&self.code.0.to_be_bytes());
        // Packet::new keeps the payload within u16 range
        buffer.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer.extend_from_slice(&PACKET_TAIL.to_be_bytes());
    }

    pub fn decode(data: &[u8]) -> Option<Packet> {
        Packet::try_decode(data).ok()
    }

    pub fn try_decode(data: &[u8]) -> Result<Packet, FrameError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(FrameError::TooShort(data.len()));
        }

        let head = read_u16(data, 0);
        if head != PACKET_HEAD {
            return Err(FrameError::BadHead(head));
        }

        let payload_len = read_u16(data, 4) as usize;
        let declared = FRAME_OVERHEAD + payload_len;
        if declared != data.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let tail = read_u16(data, 6 + payload_len);
        if tail != PACKET_TAIL {
            return Err(FrameError::BadTail(tail));
        }

        Ok(Packet {
            code: PacketCode(read_u16(data, 2)),
            payload: data[6..6 + payload_len].to_vec(),
        })
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn heart_beat_frame_bytes() {
        let bytes = Packet::empty(PacketCode(0x0001)).encode();
        assert_eq!(bytes, vec![0x2B, 0x3C, 0x00, 0x01, 0x00, 0x00, 0x4D, 0x5F]);

        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.code(), PacketCode::HEART_BEAT_REQ);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn payload_is_length_prefixed() {
        let packet = Packet::new(PacketCode::FACE_DATA, vec![0xAA, 0xBB, 0xCC]).unwrap();
        let bytes = packet.encode();
        assert_eq!(
            bytes,
            vec![0x2B, 0x3C, 0x00, 0x04, 0x00, 0x03, 0xAA, 0xBB, 0xCC, 0x4D, 0x5F]
        );
        assert_eq!(bytes.len(), packet.frame_len());
    }

    #[test]
    fn encode_into_appends() {
        let mut buffer = vec![0xFF];
        Packet::empty(PacketCode::QUIT_NOTIFY).encode_into(&mut buffer);
        assert_eq!(buffer.len(), 1 + FRAME_OVERHEAD);
        assert_eq!(buffer[0], 0xFF);
        assert_eq!(Packet::decode(&buffer[1..]).unwrap().code(), PacketCode::QUIT_NOTIFY);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let err = Packet::new(PacketCode::FACE_DATA, vec![0; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(err, PacketError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1));
    }

    #[test]
    fn largest_payload_fits() {
        let packet = Packet::new(PacketCode::POSE_DATA, vec![7; MAX_PAYLOAD_LEN]).unwrap();
        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.payload().len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(Packet::try_decode(&[]), Err(FrameError::TooShort(0)));
        assert!(Packet::decode(&[]).is_none());
    }

    #[test]
    fn rejects_short_input() {
        let bytes = [0x2B, 0x3C, 0x00, 0x01, 0x00, 0x00, 0x4D];
        assert_eq!(Packet::try_decode(&bytes), Err(FrameError::TooShort(7)));
    }

    #[test]
    fn rejects_corrupted_head() {
        let mut bytes = Packet::empty(PacketCode::HEART_BEAT_REQ).encode();
        bytes[0] = 0x2C;
        assert_eq!(Packet::try_decode(&bytes), Err(FrameError::BadHead(0x2C3C)));
    }

    #[test]
    fn rejects_corrupted_tail() {
        let mut bytes = Packet::new(PacketCode::FACE_DATA, b"abc".to_vec())
            .unwrap()
            .encode();
        let last = bytes.len() - 1;
        bytes[last] = 0x00;
        assert_eq!(Packet::try_decode(&bytes), Err(FrameError::BadTail(0x4D00)));
    }

    #[test]
    fn rejects_truncated_frame() {
        let bytes = Packet::new(PacketCode::FACE_DATA, b"abcdef".to_vec())
            .unwrap()
            .encode();
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(
            Packet::try_decode(truncated),
            Err(FrameError::LengthMismatch {
                declared: 14,
                actual: 12
            })
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = Packet::empty(PacketCode::HEART_BEAT_REQ).encode();
        bytes.push(0x00);
        assert_eq!(
            Packet::try_decode(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 8,
                actual: 9
            })
        );
    }

    #[test]
    fn unknown_codes_still_decode() {
        let bytes = Packet::empty(PacketCode(0x7777)).encode();
        let packet = Packet::decode(&bytes).unwrap();
        assert_eq!(packet.code(), PacketCode(0x7777));
        assert_eq!(packet.code().name(), None);
        assert_eq!(packet.code().to_string(), "0x7777");
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(code: u16, payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let packet = Packet::new(PacketCode(code), payload.clone()).unwrap();
            let decoded = Packet::decode(&packet.encode()).unwrap();
            prop_assert_eq!(decoded.code(), PacketCode(code));
            prop_assert_eq!(decoded.payload(), &payload[..]);
        }

        #[test]
        fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = Packet::decode(&data);
        }
    }
}
