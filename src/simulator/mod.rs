//! Network impairment simulator.
//!
//! Sits between a sending engine and the channel and decides, per datagram,
//! whether it is delivered untouched, silently dropped, or corrupted. The
//! random source is injected at construction so a fixed seed reproduces the
//! exact same sequence of drops and corrupted byte patterns.
//!
//! | Fault      | Effect                                                     |
//! |------------|------------------------------------------------------------|
//! | Loss       | `process` returns `None`                                   |
//! | Corruption | one of: invert a byte, XOR a byte, XOR 2-3 distinct bytes  |

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::common::types::SeqNum;

/// Anything that may drop or mangle an outgoing datagram.
///
/// Engines only talk to this trait, so tests can script exact losses.
pub trait Impairment {
    /// Returns the datagram to put on the wire, or `None` if it is lost.
    fn process(&mut self, datagram: Vec<u8>, seq: Option<SeqNum>) -> Option<Vec<u8>>;
}

impl<T: Impairment + ?Sized> Impairment for &mut T {
    fn process(&mut self, datagram: Vec<u8>, seq: Option<SeqNum>) -> Option<Vec<u8>> {
        (**self).process(datagram, seq)
    }
}

/// Delivers every datagram unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Impairment for Passthrough {
    fn process(&mut self, datagram: Vec<u8>, _seq: Option<SeqNum>) -> Option<Vec<u8>> {
        Some(datagram)
    }
}

/// Counters accumulated by an [`ErrorSimulator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatorStats {
    pub total: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub success: u64,
    pub drop_rate: f64,
    pub corrupt_rate: f64,
}

impl fmt::Display for SimulatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Error Simulation Stats ===")?;
        writeln!(f, "Total: {}", self.total)?;
        writeln!(f, "Dropped: {} ({:.1}%)", self.dropped, self.drop_rate * 100.0)?;
        writeln!(f, "Corrupted: {} ({:.1}%)", self.corrupted, self.corrupt_rate * 100.0)?;
        writeln!(f, "Success: {}", self.success)?;
        write!(f, "{}", "=".repeat(30))
    }
}

/// Probabilistic loss and corruption driven by a seeded PRNG.
#[derive(Debug, Clone)]
pub struct ErrorSimulator<R = StdRng> {
    loss_rate: f64,
    corrupt_rate: f64,
    rng: R,
    total: u64,
    dropped: u64,
    corrupted: u64,
}

impl ErrorSimulator<StdRng> {
    /// Create a simulator; `None` seeds from OS entropy.
    ///
    /// Rates are clamped to `[0.0, 1.0]`.
    pub fn new(loss_rate: f64, corrupt_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(loss_rate, corrupt_rate, rng)
    }

    /// A simulator that never drops or corrupts anything
    pub fn disabled() -> Self {
        Self::new(0.0, 0.0, Some(0))
    }
}

impl<R: Rng> ErrorSimulator<R> {
    pub fn with_rng(loss_rate: f64, corrupt_rate: f64, rng: R) -> Self {
        Self {
            loss_rate: clamp_rate(loss_rate),
            corrupt_rate: clamp_rate(corrupt_rate),
            rng,
            total: 0,
            dropped: 0,
            corrupted: 0,
        }
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn corrupt_rate(&self) -> f64 {
        self.corrupt_rate
    }

    pub fn stats(&self) -> SimulatorStats {
        let (drop_rate, corrupt_rate) = if self.total == 0 {
            (0.0, 0.0)
        } else {
            (
                self.dropped as f64 / self.total as f64,
                self.corrupted as f64 / self.total as f64,
            )
        };
        SimulatorStats {
            total: self.total,
            dropped: self.dropped,
            corrupted: self.corrupted,
            success: self.total - self.dropped - self.corrupted,
            drop_rate,
            corrupt_rate,
        }
    }

    /// Zero the counters; configured rates are kept
    pub fn reset(&mut self) {
        self.total = 0;
        self.dropped = 0;
        self.corrupted = 0;
    }

    fn corrupt(&mut self, datagram: &mut [u8]) {
        let len = datagram.len();
        match self.rng.gen_range(1..=3) {
            1 => {
                let i = self.rng.gen_range(0..len);
                datagram[i] ^= 0xFF;
            }
            2 => {
                let i = self.rng.gen_range(0..len);
                datagram[i] ^= self.rng.gen_range(1..=255u8);
            }
            _ => {
                let count = if len >= 2 { self.rng.gen_range(2..=len.min(3)) } else { 1 };
                for i in index::sample(&mut self.rng, len, count).into_iter() {
                    datagram[i] ^= self.rng.gen_range(1..=255u8);
                }
            }
        }
    }
}

impl<R: Rng> Impairment for ErrorSimulator<R> {
    fn process(&mut self, mut datagram: Vec<u8>, seq: Option<SeqNum>) -> Option<Vec<u8>> {
        self.total += 1;

        if self.rng.gen::<f64>() < self.loss_rate {
            self.dropped += 1;
            if let Some(seq) = seq {
                log::warn!("DROPPED packet #{}", seq);
            }
            return None;
        }

        if self.rng.gen::<f64>() < self.corrupt_rate && !datagram.is_empty() {
            self.corrupted += 1;
            if let Some(seq) = seq {
                log::warn!("CORRUPTED packet #{}", seq);
            }
            self.corrupt(&mut datagram);
        }

        Some(datagram)
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}
