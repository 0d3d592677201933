// Datagram transport layer
//
// The ARQ engines never touch a socket directly. They exchange datagrams
// through a `Channel`, which is either a UDP socket bound to one peer or an
// in-memory pair used by tests.

pub mod memory;
pub mod udp;

use std::time::Duration;

use crate::common::error::Result;
use crate::protocol::packet::{DecodeError, Packet};
use crate::simulator::Impairment;

pub use memory::MemoryChannel;
pub use udp::UdpPeer;

/// A bidirectional datagram link to a single peer
pub trait Channel {
    fn send(&mut self, datagram: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next datagram from the peer.
    ///
    /// Returns `Ok(None)` when the timeout expires with nothing received.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

impl<T: Channel + ?Sized> Channel for &mut T {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        (**self).send(datagram)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).recv(timeout)
    }
}

/// What a single receive attempt produced
#[derive(Debug)]
pub enum Incoming {
    Packet(Packet),
    /// A datagram arrived but failed validation
    Invalid(DecodeError),
    TimedOut,
}

/// Receive one datagram and decode it
pub fn recv_packet<C: Channel + ?Sized>(channel: &mut C, timeout: Duration) -> Result<Incoming> {
    Ok(match channel.recv(timeout)? {
        Some(datagram) => match Packet::decode(&datagram) {
            Ok(packet) => Incoming::Packet(packet),
            Err(e) => Incoming::Invalid(e),
        },
        None => Incoming::TimedOut,
    })
}

/// Send a packet without impairment
pub fn send_packet<C: Channel + ?Sized>(channel: &mut C, packet: &Packet) -> Result<()> {
    channel.send(&packet.encode())
}

/// Encode a packet and pass it through `impairment` on its way out
///
/// # Returns
/// `true` if the datagram was handed to the channel, `false` if it was dropped
pub fn send_impaired<C, I>(channel: &mut C, impairment: &mut I, packet: &Packet) -> Result<bool>
where
    C: Channel + ?Sized,
    I: Impairment + ?Sized,
{
    match impairment.process(packet.encode(), Some(packet.seq_num)) {
        Some(datagram) => {
            channel.send(&datagram)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
