// Configuration types and parsing

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use crate::common::error::{Error, Result};
use crate::common::types::{self, Protocol};

/// Timing and window parameters shared by both ARQ engines
#[derive(Debug, Clone)]
pub struct ArqConfig {
    /// How long a sender waits for an ACK before retransmitting
    pub ack_timeout: Duration,
    /// Retransmissions allowed for one packet before the session is aborted
    pub max_retries: u32,
    /// How many times the Stop-and-Wait sender repeats EOF
    pub eof_repeat: usize,
    /// Go-Back-N window size (W)
    pub window_size: usize,
    /// Receiver wait for the very first packet
    pub first_response_timeout: Duration,
    /// Receiver wait for each following packet
    pub receive_timeout: Duration,
    /// Stop-and-Wait receiver: consecutive timeouts before giving up / assuming EOF
    pub max_consecutive_timeouts: u32,
    /// Go-Back-N receiver: consecutive timeouts before giving up
    pub gbn_max_idle_timeouts: u32,
    /// Go-Back-N receiver: time spent re-ACKing duplicate EOFs after completion
    pub eof_linger: Duration,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            ack_timeout: types::ACK_TIMEOUT,
            max_retries: types::MAX_RETRIES,
            eof_repeat: types::EOF_REPEAT,
            window_size: types::DEFAULT_WINDOW_SIZE,
            first_response_timeout: types::FIRST_RESPONSE_TIMEOUT,
            receive_timeout: types::RECEIVE_TIMEOUT,
            max_consecutive_timeouts: types::MAX_CONSECUTIVE_TIMEOUTS,
            gbn_max_idle_timeouts: types::GBN_MAX_IDLE_TIMEOUTS,
            eof_linger: types::EOF_LINGER,
        }
    }
}

impl ArqConfig {
    pub fn with_window_size(mut self, size: usize) -> Result<Self> {
        if size == 0 || size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "Window size must be between 1 and {}",
                u32::MAX
            )));
        }
        self.window_size = size;
        Ok(self)
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_receive_timeouts(mut self, first: Duration, subsequent: Duration) -> Self {
        self.first_response_timeout = first;
        self.receive_timeout = subsequent;
        self
    }

    pub fn with_eof_linger(mut self, linger: Duration) -> Self {
        self.eof_linger = linger;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Requested file names are resolved relative to this directory
    pub root: PathBuf,
    pub protocol: Protocol,
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub seed: Option<u64>,
    /// Overrides the protocol's default idle timeout when set
    pub idle_timeout: Option<Duration>,
    pub show_progress: bool,
    /// Print per-session statistics as JSON instead of text
    pub json_reports: bool,
    pub arq: ArqConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            root: PathBuf::from("."),
            protocol: Protocol::StopAndWait,
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            seed: None,
            idle_timeout: None,
            show_progress: false,
            json_reports: false,
            arq: ArqConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, protocol: Protocol) -> Self {
        Self {
            bind_addr,
            protocol,
            ..Default::default()
        }
    }

    pub fn with_impairment(mut self, loss_rate: f64, corrupt_rate: f64, seed: Option<u64>) -> Result<Self> {
        for (name, rate) in [("loss", loss_rate), ("corrupt", corrupt_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!(
                    "{} rate must be between 0.0 and 1.0 (got {})",
                    name, rate
                )));
            }
        }
        self.loss_rate = loss_rate;
        self.corrupt_rate = corrupt_rate;
        self.seed = seed;
        Ok(self)
    }

    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_arq(mut self, arq: ArqConfig) -> Self {
        self.arq = arq;
        self
    }

    /// Idle timeout actually in effect
    pub fn effective_idle_timeout(&self) -> Duration {
        self.idle_timeout.unwrap_or_else(|| self.protocol.idle_timeout())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub protocol: Protocol,
    pub arq: ArqConfig,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr, protocol: Protocol) -> Self {
        Self {
            server_addr,
            protocol,
            arq: ArqConfig::default(),
        }
    }

    pub fn with_arq(mut self, arq: ArqConfig) -> Self {
        self.arq = arq;
        self
    }
}
