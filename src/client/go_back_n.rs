// Go-Back-N receiver

use std::io::Write;
use std::time::Instant;

use log::{debug, info, warn};

use crate::common::config::ArqConfig;
use crate::common::error::{Error, Result};
use crate::common::stats::ReceiverReport;
use crate::common::types::{Protocol, SeqNum};
use crate::protocol::packet::{Packet, PacketType};
use crate::transport::{recv_packet, send_packet, Channel, Incoming};
use crate::validation::hash::{verify_digest, FileDigest, DIGEST_LEN};

/// Receives one file from a Go-Back-N sender.
///
/// Only the next expected packet is accepted; anything ahead of a gap is
/// discarded and the last in-order packet is re-acknowledged. Accepted
/// payloads go straight to the sink.
pub struct GbnReceiver {
    config: ArqConfig,
    expected_seq: SeqNum,
}

impl GbnReceiver {
    pub fn new(config: ArqConfig) -> Self {
        Self {
            config,
            expected_seq: 0,
        }
    }

    pub fn expected_seq(&self) -> SeqNum {
        self.expected_seq
    }

    /// Run until EOF (plus the linger period) and stream accepted payloads
    /// into `sink`. Errors carry the statistics counted up to the failure.
    pub fn run<C, W>(&mut self, channel: &mut C, sink: &mut W) -> Result<ReceiverReport>
    where
        C: Channel + ?Sized,
        W: Write,
    {
        let start = Instant::now();
        let mut report = ReceiverReport::new(Protocol::GoBackN);

        let result = self.receive(channel, sink, &mut report);
        report.finish(start.elapsed());

        match result {
            Ok(()) => Ok(report),
            Err(e) => Err(e.with_stats(report)),
        }
    }

    fn receive<C, W>(&mut self, channel: &mut C, sink: &mut W, report: &mut ReceiverReport) -> Result<()>
    where
        C: Channel + ?Sized,
        W: Write,
    {
        let mut digest = FileDigest::new();
        let mut idle: u32 = 0;

        let eof = loop {
            let timeout = if report.total_packets == 0 {
                self.config.first_response_timeout
            } else {
                self.config.receive_timeout
            };

            let packet = match recv_packet(channel, timeout)? {
                Incoming::Packet(packet) => packet,
                Incoming::Invalid(e) => {
                    idle = 0;
                    report.corrupted_packets += 1;
                    warn!("Corrupted packet discarded: {}", e);
                    continue;
                }
                Incoming::TimedOut => {
                    idle += 1;
                    if idle >= self.config.gbn_max_idle_timeouts {
                        return Err(Error::Timeout(format!(
                            "no packet from sender after {} consecutive timeouts (expected #{})",
                            idle, self.expected_seq
                        )));
                    }
                    debug!("Receive timeout ({}/{})", idle, self.config.gbn_max_idle_timeouts);
                    continue;
                }
            };

            idle = 0;
            report.total_packets += 1;

            match packet.kind {
                PacketType::Data => {
                    let seq = packet.seq_num;
                    if seq == self.expected_seq {
                        sink.write_all(&packet.payload)?;
                        digest.update(&packet.payload);
                        report.bytes += packet.payload.len() as u64;
                        self.expected_seq += 1;
                        debug!("Accepted #{} ({} bytes)", seq, packet.payload.len());
                    } else if seq < self.expected_seq {
                        report.duplicate_packets += 1;
                        debug!("Duplicate #{} (expected #{})", seq, self.expected_seq);
                    } else {
                        report.out_of_order_packets += 1;
                        debug!("Out of order #{} (expected #{}), discarded", seq, self.expected_seq);
                    }
                    self.ack_in_order(channel)?;
                }
                PacketType::Eof if packet.seq_num == self.expected_seq => {
                    send_packet(channel, &Packet::ack(packet.seq_num))?;
                    info!("Received EOF seq={}", packet.seq_num);
                    break packet;
                }
                PacketType::Eof => {
                    debug!("Early EOF seq={} (expected #{})", packet.seq_num, self.expected_seq);
                    self.ack_in_order(channel)?;
                }
                PacketType::Error => {
                    let msg = packet.text();
                    warn!("Server error: {}", msg);
                    return Err(Error::PeerError(msg));
                }
                other => debug!("Ignoring unexpected {:?} packet", other),
            }
        };

        sink.flush()?;

        match eof.payload.len() {
            0 => {}
            DIGEST_LEN => {
                let verified = verify_digest(&eof.payload, &digest.finish());
                report.digest_verified = Some(verified.is_ok());
                verified?;
            }
            n => warn!("Ignoring {}-byte EOF payload, not a SHA-256 digest", n),
        }

        self.linger(channel, eof.seq_num)
    }

    /// Cumulative ACK for the last in-order packet.
    ///
    /// Nothing is sent before packet 0 has arrived. The sender treats any
    /// ACK(n) inside its window as cumulative, so an ACK(0) here would slide
    /// its base past a lost packet 0 that would then never be retransmitted
    /// and the transfer could not complete.
    fn ack_in_order<C: Channel + ?Sized>(&mut self, channel: &mut C) -> Result<()> {
        match self.expected_seq.checked_sub(1) {
            Some(last) => send_packet(channel, &Packet::ack(last)),
            None => {
                debug!("Nothing received in order yet, ACK suppressed");
                Ok(())
            }
        }
    }

    /// Answer retransmitted EOFs for a while in case our ACK was lost
    fn linger<C: Channel + ?Sized>(&mut self, channel: &mut C, eof_seq: SeqNum) -> Result<()> {
        let deadline = Instant::now() + self.config.eof_linger;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match recv_packet(channel, remaining)? {
                Incoming::Packet(p) if p.kind == PacketType::Eof && p.seq_num == eof_seq => {
                    debug!("Duplicate EOF, re-ACK");
                    send_packet(channel, &Packet::ack(eof_seq))?;
                }
                Incoming::TimedOut => return Ok(()),
                _ => {}
            }
        }
    }
}
