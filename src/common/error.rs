// Error types and error handling

use std::io;
use std::fmt;
use serde::Serialize;

use crate::common::stats::{ReceiverReport, SenderReport};
use crate::common::types::SeqNum;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Protocol(String),
    Config(String),
    FileNotFound(String),
    InvalidFileName(String),
    RetriesExhausted { seq: SeqNum, attempts: u32 },
    PeerError(String),
    Timeout(String),
    DigestMismatch { expected: Vec<u8>, actual: Vec<u8> },
    Cancelled,
    /// A transfer stopped early; `stats` holds what was counted up to then
    Aborted {
        cause: Box<Error>,
        stats: Box<PartialStats>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::FileNotFound(path) => write!(f, "File not found: {}", path),
            Error::InvalidFileName(name) => write!(f, "Invalid file name: {}", name),
            Error::RetriesExhausted { seq, attempts } => {
                write!(f, "Gave up on seq {} after {} attempts", seq, attempts)
            }
            Error::PeerError(msg) => write!(f, "Peer reported error: {}", msg),
            Error::Timeout(what) => write!(f, "Timeout: {}", what),
            Error::DigestMismatch { expected, actual } => write!(
                f,
                "Digest mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(actual)
            ),
            Error::Cancelled => write!(f, "Transfer cancelled"),
            Error::Aborted { cause, .. } => write!(f, "{}", cause),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Statistics an engine had gathered when its transfer stopped
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PartialStats {
    Sender(SenderReport),
    Receiver(ReceiverReport),
}

impl From<SenderReport> for PartialStats {
    fn from(report: SenderReport) -> Self {
        PartialStats::Sender(report)
    }
}

impl From<ReceiverReport> for PartialStats {
    fn from(report: ReceiverReport) -> Self {
        PartialStats::Receiver(report)
    }
}

impl fmt::Display for PartialStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialStats::Sender(report) => write!(f, "{}", report),
            PartialStats::Receiver(report) => write!(f, "{}", report),
        }
    }
}

/// Terminal outcome of one transfer, as seen by the process running it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Success,
    Failed,
    Timeout,
    PeerError,
    RetriesExhausted,
    DigestMismatch,
    /// All DATA was acknowledged but the EOF handshake never completed
    EofUnconfirmed,
    Cancelled,
}

impl TransferOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            TransferOutcome::Success => 0,
            TransferOutcome::Failed => 1,
            TransferOutcome::Timeout => 3,
            TransferOutcome::PeerError => 4,
            TransferOutcome::RetriesExhausted => 5,
            TransferOutcome::DigestMismatch => 6,
            TransferOutcome::EofUnconfirmed => 7,
            TransferOutcome::Cancelled => 130,
        }
    }
}

impl Error {
    /// Attach the statistics gathered before the failure.
    ///
    /// An error that already carries statistics keeps the first set.
    pub fn with_stats(self, stats: impl Into<PartialStats>) -> Error {
        match self {
            Error::Aborted { .. } => self,
            cause => Error::Aborted {
                cause: Box::new(cause),
                stats: Box::new(stats.into()),
            },
        }
    }

    /// The underlying failure, looking through attached statistics
    pub fn cause(&self) -> &Error {
        match self {
            Error::Aborted { cause, .. } => cause.cause(),
            other => other,
        }
    }

    pub fn stats(&self) -> Option<&PartialStats> {
        match self {
            Error::Aborted { stats, .. } => Some(&**stats),
            _ => None,
        }
    }

    /// Classify this error as a terminal transfer outcome
    pub fn outcome(&self) -> TransferOutcome {
        match self {
            Error::Aborted { cause, .. } => cause.outcome(),
            Error::Timeout(_) => TransferOutcome::Timeout,
            Error::PeerError(_) | Error::FileNotFound(_) | Error::InvalidFileName(_) => {
                TransferOutcome::PeerError
            }
            Error::RetriesExhausted { .. } => TransferOutcome::RetriesExhausted,
            Error::DigestMismatch { .. } => TransferOutcome::DigestMismatch,
            Error::Cancelled => TransferOutcome::Cancelled,
            _ => TransferOutcome::Failed,
        }
    }
}
