// Protocol module - wire format and checksum

pub mod packet;

pub use packet::{compute_checksum, DecodeError, Packet, PacketType};
