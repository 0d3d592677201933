// Common type definitions and protocol constants

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::common::error::Error;

pub type SeqNum = u32;

/// ARQ protocol used for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// One unacknowledged packet at a time
    #[value(name = "saw", alias = "stop-and-wait")]
    StopAndWait,
    /// Sliding window with cumulative ACKs
    #[value(name = "gbn", alias = "go-back-n")]
    GoBackN,
}

impl Protocol {
    /// How long a server waits for a REQUEST before shutting down
    pub fn idle_timeout(&self) -> Duration {
        match self {
            Protocol::StopAndWait => SAW_IDLE_TIMEOUT,
            Protocol::GoBackN => GBN_IDLE_TIMEOUT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::StopAndWait => write!(f, "stop-and-wait"),
            Protocol::GoBackN => write!(f, "go-back-n"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "saw" | "stop-and-wait" => Ok(Protocol::StopAndWait),
            "gbn" | "go-back-n" => Ok(Protocol::GoBackN),
            other => Err(Error::Config(format!("Unknown protocol: {}", other))),
        }
    }
}

// Wire constants
pub const HEADER_SIZE: usize = 9;
pub const MAX_PAYLOAD: usize = 1024;
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD;

// Retransmission constants
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_RETRIES: u32 = 5;
pub const EOF_REPEAT: usize = 3;
pub const DEFAULT_WINDOW_SIZE: usize = 4;

// Receiver constants
pub const FIRST_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;
pub const GBN_MAX_IDLE_TIMEOUTS: u32 = 10;
pub const EOF_LINGER: Duration = Duration::from_secs(2);

// Server constants
pub const SAW_IDLE_TIMEOUT: Duration = Duration::from_secs(20);
pub const GBN_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_FILE_NAME_LEN: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("saw".parse::<Protocol>().unwrap(), Protocol::StopAndWait);
        assert_eq!("Go-Back-N".parse::<Protocol>().unwrap(), Protocol::GoBackN);
        assert!("tcp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_datagram_size() {
        assert_eq!(MAX_DATAGRAM_SIZE, 1033);
    }
}
