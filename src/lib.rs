//! Reliable file transfer over UDP.
//!
//! Two ARQ protocols are provided: Stop-and-Wait, with one DATA packet in
//! flight, and Go-Back-N, with a sliding window and a single retransmission
//! timer. Every outgoing datagram on the serving side can be routed through
//! an [`simulator::ErrorSimulator`] that drops or corrupts it, so both
//! protocols can be exercised on a perfect local link.
//!
//! Layout:
//! * [`protocol`] - packet wire format and checksum
//! * [`simulator`] - loss and corruption injection
//! * [`transport`] - the datagram [`transport::Channel`] abstraction
//! * [`server`] / [`client`] - sending and receiving engines plus session drivers
//! * [`chunking`], [`validation`] - file segmentation and digests

pub mod chunking;
pub mod client;
pub mod common;
pub mod protocol;
pub mod server;
pub mod simulator;
pub mod transport;
pub mod validation;

pub use client::Client;
pub use common::{ArqConfig, ClientConfig, Error, PartialStats, Protocol, Result, ServerConfig, TransferOutcome};
pub use protocol::{Packet, PacketType};
pub use server::Server;
pub use simulator::{ErrorSimulator, Impairment};
