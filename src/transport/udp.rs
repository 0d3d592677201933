// UDP socket bound to a single peer

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::error::{Error, Result};
use crate::common::types::MAX_DATAGRAM_SIZE;
use crate::transport::Channel;

/// Longest single blocking read, so cancellation is noticed promptly
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Receive buffer; larger than any valid datagram so oversize input is still read whole
const RECV_BUFFER_SIZE: usize = 2 * MAX_DATAGRAM_SIZE;

/// A borrowed socket that talks to exactly one remote address.
///
/// Datagrams from any other source are discarded.
pub struct UdpPeer<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
    cancel: Option<Arc<AtomicBool>>,
    buf: Vec<u8>,
}

impl<'a> UdpPeer<'a> {
    pub fn new(socket: &'a UdpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            cancel: None,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Abort pending receives with [`Error::Cancelled`] once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Channel for UdpPeer<'_> {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        if self.cancelled() {
            return Err(Error::Cancelled);
        }
        self.socket.send_to(datagram, self.peer)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.cancelled() {
                return Err(Error::Cancelled);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            self.socket.set_read_timeout(Some(remaining.min(POLL_SLICE)))?;
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, from)) if from == self.peer => {
                    return Ok(Some(self.buf[..len].to_vec()));
                }
                Ok((len, from)) => {
                    log::debug!("Ignoring {} bytes from unexpected address {}", len, from);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                // ICMP port unreachable surfaces here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    log::debug!("recv_from: {}", e);
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }
}
