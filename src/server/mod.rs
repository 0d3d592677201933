// Server module - serves files to one client at a time

pub mod go_back_n;
pub mod stop_and_wait;

pub use go_back_n::{GbnSender, Window};
pub use stop_and_wait::SawSender;

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::chunking::FileChunker;
use crate::common::config::ServerConfig;
use crate::common::error::{Error, PartialStats, Result, TransferOutcome};
use crate::common::stats::SenderReport;
use crate::common::types::{Protocol, MAX_DATAGRAM_SIZE, MAX_FILE_NAME_LEN};
use crate::protocol::packet::{Packet, PacketType};
use crate::simulator::{ErrorSimulator, SimulatorStats};
use crate::transport::{send_packet, UdpPeer};

const POLL_SLICE: Duration = Duration::from_millis(100);

/// Everything known about one completed transfer
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub file_name: String,
    pub peer: SocketAddr,
    pub sender: SenderReport,
    pub simulator: SimulatorStats,
}

impl SessionReport {
    pub fn outcome(&self) -> TransferOutcome {
        match self.sender.eof_acked {
            Some(false) => TransferOutcome::EofUnconfirmed,
            _ => TransferOutcome::Success,
        }
    }
}

/// UDP file server
pub struct Server {
    config: ServerConfig,
    socket: UdpSocket,
    simulator: ErrorSimulator,
    cancel: Option<Arc<AtomicBool>>,
}

impl Server {
    /// Bind the listening socket
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr)?;
        let simulator = ErrorSimulator::new(config.loss_rate, config.corrupt_rate, config.seed);
        info!(
            "Server listening on {} ({}, loss={:.0}%, corrupt={:.0}%)",
            socket.local_addr()?,
            config.protocol,
            config.loss_rate * 100.0,
            config.corrupt_rate * 100.0
        );

        Ok(Self {
            config,
            socket,
            simulator,
            cancel: None,
        })
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests until no client shows up within the idle timeout.
    ///
    /// A failed session is logged and the server moves on to the next
    /// request. Only socket failures and cancellation end the loop early.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let (file_name, from) = match self.next_request()? {
                Some(request) => request,
                None => {
                    info!(
                        "No client request for {:?}, shutting down",
                        self.config.effective_idle_timeout()
                    );
                    return Ok(());
                }
            };

            match self.handle_request(&file_name, from) {
                Ok(report) => {
                    info!(
                        "Session with {} finished: {:?}",
                        from,
                        report.outcome()
                    );
                    self.print_session(&report);
                }
                Err(e) if matches!(e.cause(), Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!("Session with {} failed: {}", from, e);
                    if let Some(stats) = e.stats() {
                        self.print_failure(&file_name, from, &e, stats);
                    }
                }
            }

            info!("Ready for next client");
        }
    }

    /// Wait for one request and serve it
    ///
    /// # Returns
    /// `None` if the idle timeout expired before any request arrived
    pub fn serve_one(&mut self) -> Result<Option<SessionReport>> {
        match self.next_request()? {
            Some((file_name, from)) => self.handle_request(&file_name, from).map(Some),
            None => Ok(None),
        }
    }

    fn print_session(&self, report: &SessionReport) {
        if self.config.json_reports {
            match serde_json::to_string_pretty(report) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Could not serialize session report: {}", e),
            }
        } else {
            println!("{}", report.sender);
            println!("{}", report.simulator);
        }
    }

    /// Statistics of a session that ended early, with the simulator's view of it
    fn print_failure(&self, file_name: &str, from: SocketAddr, err: &Error, stats: &PartialStats) {
        let simulator = self.simulator.stats();
        if self.config.json_reports {
            let value = serde_json::json!({
                "file_name": file_name,
                "peer": from,
                "outcome": err.outcome(),
                "error": err.to_string(),
                "sender": stats,
                "simulator": simulator,
            });
            println!("{}", value);
        } else {
            println!("{}", stats);
            println!("{}", simulator);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Block until a valid REQUEST arrives or the idle timeout expires
    fn next_request(&mut self) -> Result<Option<(String, SocketAddr)>> {
        let deadline = Instant::now() + self.config.effective_idle_timeout();
        let mut buf = vec![0u8; 2 * MAX_DATAGRAM_SIZE];

        loop {
            if self.cancelled() {
                return Err(Error::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            self.socket.set_read_timeout(Some(remaining.min(POLL_SLICE)))?;
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset) => {
                    continue
                }
                Err(e) => return Err(Error::from(e)),
            };

            match Packet::decode(&buf[..len]) {
                Ok(packet) if packet.kind == PacketType::Request => {
                    let file_name = packet.text();
                    info!("Client {} requested file: {}", from, file_name);
                    return Ok(Some((file_name, from)));
                }
                Ok(packet) => debug!("Ignoring {:?} from {} while idle", packet.kind, from),
                Err(e) => debug!("Ignoring invalid datagram from {}: {}", from, e),
            }
        }
    }

    fn handle_request(&mut self, file_name: &str, from: SocketAddr) -> Result<SessionReport> {
        let mut peer = UdpPeer::new(&self.socket, from);
        if let Some(flag) = &self.cancel {
            peer = peer.with_cancel(flag.clone());
        }

        let opened = resolve_path(&self.config.root, file_name).and_then(|path| FileChunker::open(&path));
        let mut chunker = match opened {
            Ok(chunker) => chunker,
            Err(e) => {
                let reply = match &e {
                    Error::InvalidFileName(_) => "Invalid file name",
                    _ => "File not found",
                };
                // sent directly, never impaired
                send_packet(&mut peer, &Packet::error(reply))?;
                warn!("{}, sent ERROR to {}", e, from);
                return Err(e);
            }
        };

        self.simulator.reset();
        let progress = if self.config.show_progress {
            progress_bar()
        } else {
            ProgressBar::hidden()
        };

        let arq = self.config.arq.clone();
        let sender = match self.config.protocol {
            Protocol::StopAndWait => SawSender::new(arq)
                .with_progress(progress)
                .run(&mut peer, &mut self.simulator, &mut chunker)?,
            Protocol::GoBackN => GbnSender::new(arq)
                .with_progress(progress)
                .run(&mut peer, &mut self.simulator, &mut chunker)?,
        };

        info!("Finished sending {} to {}", file_name, from);
        Ok(SessionReport {
            file_name: file_name.to_string(),
            peer: from,
            sender,
            simulator: self.simulator.stats(),
        })
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    match ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
    ) {
        Ok(style) => bar.set_style(style.progress_chars("#>-")),
        Err(e) => debug!("progress template: {}", e),
    }
    bar
}

/// Map a requested file name onto the serve root
///
/// Rejects empty or overlong names, absolute paths and any `..` component.
pub fn resolve_path(root: &Path, file_name: &str) -> Result<PathBuf> {
    if file_name.is_empty() || file_name.len() > MAX_FILE_NAME_LEN || file_name.contains('\0') {
        return Err(Error::InvalidFileName(file_name.to_string()));
    }

    let requested = Path::new(file_name);
    let safe = requested
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(Error::InvalidFileName(file_name.to_string()));
    }

    Ok(root.join(requested))
}
