// Per-transfer statistics reports

use std::fmt;
use std::time::Duration;
use serde::Serialize;

use crate::common::types::Protocol;

/// Convert a byte count and elapsed time into KB/s
pub fn throughput_kbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) / 1024.0
    } else {
        0.0
    }
}

/// Statistics gathered by a sending engine
#[derive(Debug, Clone, Serialize)]
pub struct SenderReport {
    pub protocol: Protocol,
    /// Number of DATA packets the file was split into
    pub data_packets: u32,
    pub bytes: u64,
    /// Every DATA transmission attempt, including ones the simulator dropped
    pub transmissions: u64,
    /// DATA transmissions beyond the first for each sequence number
    pub retransmissions: u64,
    /// Expired ACK waits (per packet for Stop-and-Wait, per window for Go-Back-N)
    pub timeouts: u64,
    pub elapsed_secs: f64,
    pub throughput_kbps: f64,
    /// Go-Back-N only: whether the EOF handshake was acknowledged
    pub eof_acked: Option<bool>,
}

impl SenderReport {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            data_packets: 0,
            bytes: 0,
            transmissions: 0,
            retransmissions: 0,
            timeouts: 0,
            elapsed_secs: 0.0,
            throughput_kbps: 0.0,
            eof_acked: None,
        }
    }

    /// Stamp elapsed time and derived throughput
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        self.throughput_kbps = throughput_kbps(self.bytes, elapsed);
    }
}

impl fmt::Display for SenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "SENDER STATISTICS ({})", self.protocol)?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "File size:           {} bytes", self.bytes)?;
        writeln!(f, "Data packets:        {}", self.data_packets)?;
        writeln!(f, "Transmissions:       {}", self.transmissions)?;
        writeln!(f, "Retransmissions:     {}", self.retransmissions)?;
        writeln!(f, "Timeouts:            {}", self.timeouts)?;
        writeln!(f, "Transfer time:       {:.2} seconds", self.elapsed_secs)?;
        writeln!(f, "Throughput:          {:.2} KB/s", self.throughput_kbps)?;
        if let Some(acked) = self.eof_acked {
            writeln!(f, "EOF acknowledged:    {}", if acked { "yes" } else { "no" })?;
        }
        write!(f, "{}", "=".repeat(50))
    }
}

/// Statistics gathered by a receiving engine
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverReport {
    pub protocol: Protocol,
    pub bytes: u64,
    /// Packets that passed checksum validation
    pub total_packets: u64,
    /// Datagrams discarded for failing validation
    pub corrupted_packets: u64,
    pub duplicate_packets: u64,
    /// Go-Back-N only: DATA discarded because it arrived ahead of a gap
    pub out_of_order_packets: u64,
    /// Stop-and-Wait only: completion was inferred from silence after data
    pub implicit_eof: bool,
    /// Whether the EOF digest matched; `None` when no digest was received
    pub digest_verified: Option<bool>,
    pub elapsed_secs: f64,
    pub throughput_kbps: f64,
}

impl ReceiverReport {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            bytes: 0,
            total_packets: 0,
            corrupted_packets: 0,
            duplicate_packets: 0,
            out_of_order_packets: 0,
            implicit_eof: false,
            digest_verified: None,
            elapsed_secs: 0.0,
            throughput_kbps: 0.0,
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        self.throughput_kbps = throughput_kbps(self.bytes, elapsed);
    }

    /// Corrupted plus duplicate packets as a percentage of valid packets
    pub fn error_rate(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        (self.corrupted_packets + self.duplicate_packets) as f64 / self.total_packets as f64 * 100.0
    }
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "TRANSFER STATISTICS ({})", self.protocol)?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "File size:           {} bytes", self.bytes)?;
        writeln!(f, "Transfer time:       {:.2} seconds", self.elapsed_secs)?;
        writeln!(f, "Throughput:          {:.2} KB/s", self.throughput_kbps)?;
        writeln!(f, "Total packets:       {}", self.total_packets)?;
        writeln!(f, "Corrupted packets:   {}", self.corrupted_packets)?;
        writeln!(f, "Duplicate packets:   {}", self.duplicate_packets)?;
        if self.protocol == Protocol::GoBackN {
            writeln!(f, "Out-of-order:        {}", self.out_of_order_packets)?;
        }
        if self.total_packets > 0 {
            writeln!(f, "Error rate:          {:.1}%", self.error_rate())?;
        }
        if self.implicit_eof {
            writeln!(f, "EOF:                 assumed after silence")?;
        }
        match self.digest_verified {
            Some(true) => writeln!(f, "Digest:              verified")?,
            Some(false) => writeln!(f, "Digest:              MISMATCH")?,
            None => {}
        }
        write!(f, "{}", "=".repeat(50))
    }
}
