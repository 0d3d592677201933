// Stop-and-Wait receiver

use std::collections::BTreeMap;
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

/// Receives one file sent by a Stop-and-Wait sender.
///
/// Payloads are held in memory keyed by sequence number and written to the
/// sink in order once the transfer completes.
pub struct SawReceiver {
    config: ArqConfig,
    expected_seq: SeqNum,
    assembled: BTreeMap<SeqNum, Vec<u8>>,
}

impl SawReceiver {
    pub fn new(config: ArqConfig) -> Self {
        Self {
            config,
            expected_seq: 0,
            assembled: BTreeMap::new(),
        }
    }

    pub fn expected_seq(&self) -> SeqNum {
        self.expected_seq
    }

    /// Run until EOF, then write the assembled file into `sink`
    ///
    /// Three consecutive receive timeouts end the transfer: as a failure if
    /// nothing has arrived yet, otherwise as an assumed EOF. Errors carry the
    /// statistics counted up to the failure.
    pub fn run<C, W>(&mut self, channel: &mut C, sink: &mut W) -> Result<ReceiverReport>
    where
        C: Channel + ?Sized,
        W: Write,
    {
        let start = Instant::now();
        let mut report = ReceiverReport::new(Protocol::StopAndWait);

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
        let mut timeouts: u32 = 0;
        let mut eof_digest: Option<Vec<u8>> = None;

        loop {
            let timeout = if report.total_packets == 0 {
                self.config.first_response_timeout
            } else {
                self.config.receive_timeout
            };

            let packet = match recv_packet(channel, timeout)? {
                Incoming::Packet(packet) => packet,
                Incoming::Invalid(e) => {
                    timeouts = 0;
                    report.corrupted_packets += 1;
                    warn!("Corrupted packet discarded: {}", e);
                    continue;
                }
                Incoming::TimedOut => {
                    timeouts += 1;
                    if timeouts < self.config.max_consecutive_timeouts {
                        debug!("Receive timeout ({}/{})", timeouts, self.config.max_consecutive_timeouts);
                        continue;
                    }
                    if self.assembled.is_empty() {
                        return Err(Error::Timeout(format!(
                            "no data received after {} consecutive timeouts",
                            timeouts
                        )));
                    }
                    warn!("Timeout x{} - assuming transfer complete", timeouts);
                    report.implicit_eof = true;
                    break;
                }
            };

            timeouts = 0;
            report.total_packets += 1;

            match packet.kind {
                PacketType::Data => self.on_data(channel, packet, report)?,
                PacketType::Eof => {
                    if packet.seq_num != self.expected_seq {
                        warn!(
                            "EOF seq={} but {} data packets received",
                            packet.seq_num, self.expected_seq
                        );
                    }
                    match packet.payload.len() {
                        0 => {}
                        DIGEST_LEN => eof_digest = Some(packet.payload.clone()),
                        n => warn!("Ignoring {}-byte EOF payload, not a SHA-256 digest", n),
                    }
                    send_packet(channel, &Packet::ack(packet.seq_num))?;
                    info!("Received EOF seq={}", packet.seq_num);
                    break;
                }
                PacketType::Error => {
                    let msg = packet.text();
                    warn!("Server error: {}", msg);
                    return Err(Error::PeerError(msg));
                }
                other => debug!("Ignoring unexpected {:?} packet", other),
            }
        }

        let mut digest = FileDigest::new();
        for payload in self.assembled.values() {
            sink.write_all(payload)?;
            digest.update(payload);
        }
        sink.flush()?;

        if let Some(expected) = eof_digest {
            let verified = verify_digest(&expected, &digest.finish());
            report.digest_verified = Some(verified.is_ok());
            verified?;
        }

        info!("Assembled {} packets ({} bytes)", self.assembled.len(), report.bytes);
        Ok(())
    }

    fn on_data<C: Channel + ?Sized>(
        &mut self,
        channel: &mut C,
        packet: Packet,
        report: &mut ReceiverReport,
    ) -> Result<()> {
        let seq = packet.seq_num;

        if seq == self.expected_seq {
            debug!("Received packet #{} ({} bytes)", seq, packet.payload.len());
            report.bytes += packet.payload.len() as u64;
            self.assembled.insert(seq, packet.payload);
            send_packet(channel, &Packet::ack(seq))?;
            self.expected_seq += 1;
        } else if seq < self.expected_seq {
            report.duplicate_packets += 1;
            debug!("Duplicate #{} (expected #{}), re-ACK", seq, self.expected_seq);
            send_packet(channel, &Packet::ack(seq))?;
        } else {
            warn!("Out of order: got #{}, expected #{}", seq, self.expected_seq);
        }

        Ok(())
    }
}
