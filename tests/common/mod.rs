// Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arqx::common::error::Result;
use arqx::common::types::SeqNum;
use arqx::protocol::{Packet, PacketType};
use arqx::simulator::Impairment;
use arqx::transport::Channel;

/// Deterministic, non-repeating-ish test content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 256) as u8).collect()
}

/// One datagram offered to an impairment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offered {
    pub kind: PacketType,
    pub seq: SeqNum,
    pub dropped: bool,
}

/// Drops chosen packets and records everything it sees
#[derive(Clone, Default)]
pub struct Scripted {
    /// DATA seqs whose first transmission is lost
    drop_first_data: HashSet<SeqNum>,
    /// DATA seqs lost on every transmission
    drop_every_data: HashSet<SeqNum>,
    /// Packet kinds that are always lost
    drop_kinds: Vec<PacketType>,
    seen_data: HashSet<SeqNum>,
    pub log: Arc<Mutex<Vec<Offered>>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_first_data(mut self, seq: SeqNum) -> Self {
        self.drop_first_data.insert(seq);
        self
    }

    pub fn drop_every_data(mut self, seq: SeqNum) -> Self {
        self.drop_every_data.insert(seq);
        self
    }

    pub fn drop_all(mut self, kind: PacketType) -> Self {
        self.drop_kinds.push(kind);
        self
    }

    pub fn offered(&self) -> Vec<Offered> {
        self.log.lock().unwrap().clone()
    }

    /// DATA seqs in the order they were offered
    pub fn data_seqs(&self) -> Vec<SeqNum> {
        self.offered()
            .into_iter()
            .filter(|o| o.kind == PacketType::Data)
            .map(|o| o.seq)
            .collect()
    }
}

impl Impairment for Scripted {
    fn process(&mut self, datagram: Vec<u8>, _seq: Option<SeqNum>) -> Option<Vec<u8>> {
        let packet = Packet::decode(&datagram).expect("sender produced an invalid packet");
        let first = packet.kind == PacketType::Data && self.seen_data.insert(packet.seq_num);
        let is_data = packet.kind == PacketType::Data;
        let dropped = self.drop_kinds.contains(&packet.kind)
            || (first && self.drop_first_data.contains(&packet.seq_num))
            || (is_data && self.drop_every_data.contains(&packet.seq_num));

        self.log.lock().unwrap().push(Offered {
            kind: packet.kind,
            seq: packet.seq_num,
            dropped,
        });

        if dropped {
            None
        } else {
            Some(datagram)
        }
    }
}

/// Channel wrapper that loses the n-th datagram it sends (0-based)
pub struct LoseNth<C> {
    inner: C,
    target: usize,
    sent: usize,
}

impl<C: Channel> LoseNth<C> {
    pub fn new(inner: C, target: usize) -> Self {
        Self { inner, target, sent: 0 }
    }
}

impl<C: Channel> Channel for LoseNth<C> {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let index = self.sent;
        self.sent += 1;
        if index == self.target {
            return Ok(());
        }
        self.inner.send(datagram)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.inner.recv(timeout)
    }
}

/// Sender-side event, in the order the sender experienced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Sent(PacketType, SeqNum),
    Acked(SeqNum),
}

/// Channel wrapper recording every send and every received ACK
pub struct Recording<C> {
    inner: C,
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl<C: Channel> Recording<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<C: Channel> Channel for Recording<C> {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        if let Ok(p) = Packet::decode(datagram) {
            self.events.lock().unwrap().push(Event::Sent(p.kind, p.seq_num));
        }
        self.inner.send(datagram)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let datagram = self.inner.recv(timeout)?;
        if let Some(bytes) = &datagram {
            if let Ok(p) = Packet::decode(bytes) {
                if p.kind == PacketType::Ack {
                    self.events.lock().unwrap().push(Event::Acked(p.seq_num));
                }
            }
        }
        Ok(datagram)
    }
}
