// Common utilities and shared code

pub mod error;
pub mod config;
pub mod types;
pub mod stats;

pub use error::{Error, PartialStats, Result, TransferOutcome};
pub use config::{ArqConfig, ClientConfig, ServerConfig};
pub use types::*;
