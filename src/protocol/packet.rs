// Packet wire format, checksum and serialization
//
// Layout (all integers big-endian):
//
//   type(1) | seq_num(4) | payload_len(2) | checksum(2) | payload(payload_len)
//
// The checksum is a 16-bit one's-complement sum over type, seq_num,
// payload_len and payload. The checksum field itself is not covered.

use std::fmt;
use bytes::{Buf, BufMut, BytesMut};

use crate::common::types::{SeqNum, HEADER_SIZE, MAX_PAYLOAD};

/// Packet kinds as they appear in the type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Request = 1,
    Data = 2,
    Ack = 3,
    Eof = 4,
    Error = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(PacketType::Request),
            2 => Ok(PacketType::Data),
            3 => Ok(PacketType::Ack),
            4 => Ok(PacketType::Eof),
            5 => Ok(PacketType::Error),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

/// Reasons a received datagram is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the fixed header
    TooShort(usize),
    /// Declared payload length exceeds the bytes available
    TruncatedPayload { declared: usize, available: usize },
    ChecksumMismatch { received: u16, computed: u16 },
    /// Checksum was valid but the type byte is not a known packet type
    UnknownType(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort(len) => {
                write!(f, "datagram too short: {} bytes (header is {})", len, HEADER_SIZE)
            }
            DecodeError::TruncatedPayload { declared, available } => write!(
                f,
                "payload truncated: declared {} bytes, {} available",
                declared, available
            ),
            DecodeError::ChecksumMismatch { received, computed } => write!(
                f,
                "checksum mismatch: received {:#06x}, computed {:#06x}",
                received, computed
            ),
            DecodeError::UnknownType(t) => write!(f, "unknown packet type {}", t),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A validated protocol packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub seq_num: SeqNum,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, trimming the payload to [`MAX_PAYLOAD`]
    pub fn new(kind: PacketType, seq_num: SeqNum, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD);
        Self {
            kind,
            seq_num,
            payload: payload[..len].to_vec(),
        }
    }

    pub fn request(file_name: &str) -> Self {
        Self::new(PacketType::Request, 0, file_name.as_bytes())
    }

    pub fn data(seq_num: SeqNum, chunk: &[u8]) -> Self {
        Self::new(PacketType::Data, seq_num, chunk)
    }

    pub fn ack(seq_num: SeqNum) -> Self {
        Self::new(PacketType::Ack, seq_num, &[])
    }

    /// EOF carries the DATA packet count and an optional file digest
    pub fn eof(seq_num: SeqNum, digest: &[u8]) -> Self {
        Self::new(PacketType::Eof, seq_num, digest)
    }

    pub fn error(message: &str) -> Self {
        Self::new(PacketType::Error, 0, message.as_bytes())
    }

    /// Payload interpreted as UTF-8 text (REQUEST file names, ERROR messages)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn checksum(&self) -> u16 {
        compute_checksum(self.kind as u8, self.seq_num, &self.payload)
    }

    /// Serialize into a datagram
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.seq_num);
        buf.put_u16(self.payload.len() as u16);
        buf.put_u16(self.checksum());
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Parse and validate a datagram
    ///
    /// Bytes beyond the declared payload length are ignored.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        if datagram.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort(datagram.len()));
        }

        let mut header = &datagram[..HEADER_SIZE];
        let type_byte = header.get_u8();
        let seq_num = header.get_u32();
        let declared = header.get_u16() as usize;
        let received = header.get_u16();

        let available = datagram.len() - HEADER_SIZE;
        if declared > available {
            return Err(DecodeError::TruncatedPayload { declared, available });
        }

        let payload = &datagram[HEADER_SIZE..HEADER_SIZE + declared];
        let computed = compute_checksum(type_byte, seq_num, payload);
        if computed != received {
            return Err(DecodeError::ChecksumMismatch { received, computed });
        }

        Ok(Self {
            kind: PacketType::try_from(type_byte)?,
            seq_num,
            payload: payload.to_vec(),
        })
    }
}

/// One's-complement sum of 16-bit words over `type | seq | len | payload`
///
/// An odd trailing byte is the high byte of a zero-padded word.
pub fn compute_checksum(type_byte: u8, seq_num: SeqNum, payload: &[u8]) -> u16 {
    let mut pseudo = [0u8; 7];
    pseudo[0] = type_byte;
    pseudo[1..5].copy_from_slice(&seq_num.to_be_bytes());
    pseudo[5..7].copy_from_slice(&(payload.len() as u16).to_be_bytes());

    let mut sum: u32 = 0;
    let mut bytes = pseudo.iter().chain(payload.iter()).copied();
    loop {
        match (bytes.next(), bytes.next()) {
            (Some(hi), Some(lo)) => sum += u32::from(u16::from_be_bytes([hi, lo])),
            (Some(hi), None) => {
                sum += u32::from(hi) << 8;
                break;
            }
            _ => break,
        }
        if sum > 0xffff {
            sum = (sum & 0xffff) + (sum >> 16);
        }
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
