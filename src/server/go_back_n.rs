// Go-Back-N sender with a single window timer

use std::io::Read;
use std::time::{Duration, Instant};

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

/// Sliding window bookkeeping.
///
/// Keeps `base <= next_seq <= base + size` at all times.
#[derive(Debug, Clone)]
pub struct Window {
    base: SeqNum,
    next_seq: SeqNum,
    size: u32,
    timer: Option<Instant>,
}

impl Window {
    pub fn new(size: u32) -> Self {
        Self {
            base: 0,
            next_seq: 0,
            size: size.max(1),
            timer: None,
        }
    }

    pub fn base(&self) -> SeqNum {
        self.base
    }

    pub fn next_seq(&self) -> SeqNum {
        self.next_seq
    }

    /// Packets sent but not yet acknowledged
    pub fn outstanding(&self) -> u32 {
        self.next_seq - self.base
    }

    /// Whether another packet below `total` fits in the window
    pub fn can_send(&self, total: SeqNum) -> bool {
        self.next_seq < total && self.outstanding() < self.size
    }

    /// Record a first transmission of `next_seq`
    pub fn on_send(&mut self, now: Instant) {
        if self.base == self.next_seq {
            self.timer = Some(now);
        }
        self.next_seq += 1;
    }

    /// Apply a cumulative ACK; returns how many packets it newly acknowledged
    pub fn on_ack(&mut self, ackno: SeqNum, now: Instant) -> u32 {
        if ackno < self.base || ackno >= self.next_seq {
            return 0;
        }
        let advanced = ackno + 1 - self.base;
        self.base = ackno + 1;
        self.timer = if self.base == self.next_seq { None } else { Some(now) };
        advanced
    }

    pub fn restart_timer(&mut self, now: Instant) {
        self.timer = Some(now);
    }

    /// Time left before the window timer fires, `None` when it is stopped
    pub fn time_left(&self, timeout: Duration, now: Instant) -> Option<Duration> {
        self.timer
            .map(|started| (started + timeout).saturating_duration_since(now))
    }
}

/// Sends one file keeping up to `window_size` DATA packets in flight.
pub struct GbnSender {
    config: ArqConfig,
    progress: ProgressBar,
}

impl GbnSender {
    pub fn new(config: ArqConfig) -> Self {
        Self {
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Transfer the whole input, then run the EOF handshake.
    ///
    /// An unacknowledged EOF is not an error: the report carries
    /// `eof_acked = Some(false)` and the caller decides what it means.
    /// Errors carry the statistics counted up to the failure.
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
        let mut report = SenderReport::new(Protocol::GoBackN);

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
        // whole input is segmented up front
        let packets = chunker.collect_remaining()?;
        let total = SeqNum::try_from(packets.len())
            .map_err(|_| Error::Protocol(format!("File too large: {} packets", packets.len())))?;
        report.data_packets = total;
        report.bytes = packets.iter().map(|p| p.len() as u64).sum();
        self.progress.set_length(report.bytes);

        info!(
            "Go-Back-N: sending {} packets ({} bytes), window={}",
            total, report.bytes, self.config.window_size
        );

        let window_size = u32::try_from(self.config.window_size).unwrap_or(u32::MAX);
        let mut window = Window::new(window_size);
        let mut stalls: u32 = 0;

        while window.base() < total {
            while window.can_send(total) {
                let seq = window.next_seq();
                let packet = Packet::data(seq, &packets[seq as usize]);
                send_impaired(channel, impairment, &packet)?;
                report.transmissions += 1;
                window.on_send(Instant::now());
                debug!("Sent seq={} [base={}, next={}]", seq, window.base(), window.next_seq());
            }

            let wait = window
                .time_left(self.config.ack_timeout, Instant::now())
                .unwrap_or(self.config.ack_timeout);
            if !wait.is_zero() {
                match recv_packet(channel, wait)? {
                    Incoming::Packet(p) if p.kind == PacketType::Ack => {
                        let before = window.base();
                        let advanced = window.on_ack(p.seq_num, Instant::now());
                        if advanced > 0 {
                            stalls = 0;
                            let acked: u64 = packets[before as usize..window.base() as usize]
                                .iter()
                                .map(|p| p.len() as u64)
                                .sum();
                            self.progress.inc(acked);
                            debug!("ACK {} -> base={}", p.seq_num, window.base());
                        } else {
                            debug!("Ignoring ACK {} outside window [{}, {})", p.seq_num, before, window.next_seq());
                        }
                    }
                    Incoming::Packet(p) if p.kind == PacketType::Error => {
                        return Err(Error::PeerError(p.text()));
                    }
                    Incoming::Packet(p) => debug!("Ignoring unexpected {:?} packet", p.kind),
                    Incoming::Invalid(e) => warn!("Discarding corrupted ACK: {}", e),
                    Incoming::TimedOut => {}
                }
            }

            if window.time_left(self.config.ack_timeout, Instant::now()) == Some(Duration::ZERO) {
                report.timeouts += 1;
                stalls += 1;
                if stalls > self.config.max_retries {
                    error!("Window stuck at base={} after {} timeouts, aborting", window.base(), stalls);
                    return Err(Error::RetriesExhausted { seq: window.base(), attempts: stalls });
                }

                warn!("Timeout -> retransmit {}..{}", window.base(), window.next_seq());
                for seq in window.base()..window.next_seq() {
                    let packet = Packet::data(seq, &packets[seq as usize]);
                    send_impaired(channel, impairment, &packet)?;
                    report.transmissions += 1;
                    report.retransmissions += 1;
                }
                window.restart_timer(Instant::now());
            }
        }

        self.progress.finish_and_clear();

        let eof = Packet::eof(total, &chunker.digest());
        let acked = self.eof_handshake(channel, impairment, &eof)?;
        report.eof_acked = Some(acked);
        if acked {
            info!("EOF acknowledged, transfer complete");
        } else {
            warn!("EOF never acknowledged; all data was delivered");
        }
        Ok(())
    }

    /// Stop-and-wait delivery of the EOF packet
    fn eof_handshake<C, I>(&mut self, channel: &mut C, impairment: &mut I, eof: &Packet) -> Result<bool>
    where
        C: Channel + ?Sized,
        I: Impairment + ?Sized,
    {
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            send_impaired(channel, impairment, eof)?;
            debug!("Sent EOF seq={} (attempt {}/{})", eof.seq_num, attempt, attempts);

            let deadline = Instant::now() + self.config.ack_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match recv_packet(channel, remaining)? {
                    Incoming::Packet(p) if p.kind == PacketType::Ack && p.seq_num == eof.seq_num => {
                        return Ok(true);
                    }
                    Incoming::Packet(p) => debug!("Ignoring {:?} {} during EOF wait", p.kind, p.seq_num),
                    Incoming::Invalid(e) => debug!("Discarding corrupted packet during EOF wait: {}", e),
                    Incoming::TimedOut => break,
                }
            }
            warn!("No ACK for EOF (attempt {}/{})", attempt, attempts);
        }

        Ok(false)
    }
}
