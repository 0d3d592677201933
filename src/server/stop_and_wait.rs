// Stop-and-Wait sender

use std::io::Read;
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, error, info, warn};

use crate::chunking::Chunker;
use crate::common::config::ArqConfig;
use crate::common::error::{Error, Result};
use crate::common::stats::SenderReport;
use crate::common::types::{Protocol, SeqNum};
use crate::protocol::packet::{Packet, PacketType};
use crate::simulator::Impairment;
use crate::transport::{recv_packet, send_impaired, Channel, Incoming};

/// What came back while waiting for one ACK
enum AckWait {
    Acked,
    TimedOut,
    Mismatch(SeqNum),
    Corrupted,
}

/// Sends one file, one DATA packet in flight at a time.
pub struct SawSender {
    config: ArqConfig,
    progress: ProgressBar,
}

impl SawSender {
    pub fn new(config: ArqConfig) -> Self {
        Self {
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `bar` by the payload bytes of each acknowledged packet
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Transfer everything `chunker` yields, then announce EOF
    ///
    /// # Arguments
    /// * `channel` - Link to the receiving peer
    /// * `impairment` - Applied to every outgoing DATA and EOF datagram
    /// * `chunker` - Source of payloads
    ///
    /// # Returns
    /// Sender statistics, or `RetriesExhausted` once one packet has been
    /// sent `max_retries + 1` times without a matching ACK. Errors carry
    /// the statistics counted up to the failure.
    pub fn run<C, I, R>(
        &mut self,
        channel: &mut C,
        impairment: &mut I,
        chunker: &mut Chunker<R>,
    ) -> Result<SenderReport>
    where
        C: Channel + ?Sized,
        I: Impairment + ?Sized,
        R: Read,
    {
        let start = Instant::now();
        let mut report = SenderReport::new(Protocol::StopAndWait);

        let result = self.send_file(channel, impairment, chunker, &mut report);
        self.progress.finish_and_clear();
        report.finish(start.elapsed());

        match result {
            Ok(()) => Ok(report),
            Err(e) => Err(e.with_stats(report)),
        }
    }

    fn send_file<C, I, R>(
        &mut self,
        channel: &mut C,
        impairment: &mut I,
        chunker: &mut Chunker<R>,
        report: &mut SenderReport,
    ) -> Result<()>
    where
        C: Channel + ?Sized,
        I: Impairment + ?Sized,
        R: Read,
    {
        let mut seq: SeqNum = 0;

        if let Some(size) = chunker.total_size() {
            self.progress.set_length(size);
        }
        if let Some(chunks) = chunker.total_chunks() {
            info!("Stop-and-Wait: sending {} packets", chunks);
        }

        while let Some(chunk) = chunker.next_chunk()? {
            let packet = Packet::data(seq, &chunk);
            self.deliver(channel, impairment, &packet, report)?;

            report.data_packets += 1;
            report.bytes += chunk.len() as u64;
            self.progress.inc(chunk.len() as u64);
            debug!("seq={} delivered, {:.0}% of input sent", seq, chunker.progress() * 100.0);

            seq = seq
                .checked_add(1)
                .ok_or_else(|| Error::Protocol("Sequence number space exhausted".into()))?;
        }

        // EOF is fire-and-forget, repeated to survive loss
        let eof = Packet::eof(seq, &chunker.digest());
        for _ in 0..self.config.eof_repeat {
            send_impaired(channel, impairment, &eof)?;
        }
        info!("Sent EOF seq={} ({} data packets, {} bytes)", seq, report.data_packets, chunker.bytes_read());
        Ok(())
    }

    fn deliver<C, I>(
        &mut self,
        channel: &mut C,
        impairment: &mut I,
        packet: &Packet,
        report: &mut SenderReport,
    ) -> Result<()>
    where
        C: Channel + ?Sized,
        I: Impairment + ?Sized,
    {
        let seq = packet.seq_num;
        let mut retries: u32 = 0;

        loop {
            report.transmissions += 1;
            if retries > 0 {
                report.retransmissions += 1;
            }
            send_impaired(channel, impairment, packet)?;
            debug!("Sent seq={} (len={})", seq, packet.payload.len());

            match self.await_ack(channel, seq)? {
                AckWait::Acked => {
                    debug!("ACK received for seq={}", seq);
                    return Ok(());
                }
                AckWait::TimedOut => {
                    report.timeouts += 1;
                    warn!("Timeout -> retransmit seq={} (retry={})", seq, retries + 1);
                }
                AckWait::Mismatch(ackno) => {
                    warn!("ACK {} does not match seq={} -> retransmit (retry={})", ackno, seq, retries + 1);
                }
                AckWait::Corrupted => {
                    warn!("Corrupted ACK -> retransmit seq={} (retry={})", seq, retries + 1);
                }
            }

            retries += 1;
            if retries > self.config.max_retries {
                error!("Too many retries for seq={}, aborting transfer", seq);
                return Err(Error::RetriesExhausted { seq, attempts: retries });
            }
        }
    }

    fn await_ack<C: Channel + ?Sized>(&mut self, channel: &mut C, seq: SeqNum) -> Result<AckWait> {
        Ok(match recv_packet(channel, self.config.ack_timeout)? {
            Incoming::Packet(p) if p.kind == PacketType::Ack && p.seq_num == seq => AckWait::Acked,
            Incoming::Packet(p) if p.kind == PacketType::Error => {
                return Err(Error::PeerError(p.text()));
            }
            Incoming::Packet(p) => AckWait::Mismatch(p.seq_num),
            Incoming::Invalid(e) => {
                debug!("Discarding invalid ACK: {}", e);
                AckWait::Corrupted
            }
            Incoming::TimedOut => AckWait::TimedOut,
        })
    }
}
