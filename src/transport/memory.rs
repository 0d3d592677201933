// In-process datagram channel

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::common::error::Result;
use crate::transport::Channel;

/// One end of an in-memory datagram link.
///
/// Behaves like an unconnected UDP socket: sending to a peer that has gone
/// away silently loses the datagram, and waiting on it just times out.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryChannel {
    /// Create two connected ends
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            MemoryChannel { tx: a_tx, rx: a_rx },
            MemoryChannel { tx: b_tx, rx: b_rx },
        )
    }

    /// Datagrams queued for this end and not yet received
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        if self.tx.send(datagram.to_vec()).is_err() {
            log::debug!("peer gone, datagram of {} bytes lost", datagram.len());
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_pair_is_bidirectional() {
        let (mut a, mut b) = MemoryChannel::pair();
        a.send(b"ping").unwrap();
        b.send(b"pong").unwrap();
        assert_eq!(b.pending(), 1);
        assert_eq!(b.recv(Duration::from_millis(50)).unwrap(), Some(b"ping".to_vec()));
        assert_eq!(a.recv(Duration::from_millis(50)).unwrap(), Some(b"pong".to_vec()));
    }

    #[test]
    fn test_recv_times_out() {
        let (mut a, _b) = MemoryChannel::pair();
        let start = Instant::now();
        assert_eq!(a.recv(Duration::from_millis(20)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_closed_peer_behaves_like_silence() {
        let (mut a, b) = MemoryChannel::pair();
        drop(b);
        a.send(b"lost").unwrap();
        assert_eq!(a.recv(Duration::from_millis(5)).unwrap(), None);
    }
}
