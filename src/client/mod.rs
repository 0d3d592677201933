// Client module - requests a file and runs the matching receiver

mod receiver;
pub mod go_back_n;
pub mod stop_and_wait;

pub use go_back_n::GbnReceiver;
pub use receiver::PartFile;
pub use stop_and_wait::SawReceiver;

use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::info;

use crate::common::config::ClientConfig;
use crate::common::error::Result;
use crate::common::stats::ReceiverReport;
use crate::common::types::Protocol;
use crate::protocol::packet::Packet;
use crate::transport::{send_packet, UdpPeer};

/// Main client interface
pub struct Client {
    config: ClientConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, cancel: None }
    }

    /// Stop the transfer (and clean up partial output) once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Request `file_name` from the server and save it as `save_as`
    ///
    /// # Returns
    /// Receiver statistics. On any error the partial output is removed.
    pub fn fetch(&self, file_name: &str, save_as: &Path) -> Result<ReceiverReport> {
        let server = self.config.server_addr;
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;

        let mut peer = UdpPeer::new(&socket, server);
        if let Some(flag) = &self.cancel {
            peer = peer.with_cancel(flag.clone());
        }

        let mut output = PartFile::create(save_as)?;

        info!("Requesting '{}' from {} ({})", file_name, server, self.config.protocol);
        send_packet(&mut peer, &Packet::request(file_name))?;

        let arq = self.config.arq.clone();
        let report = match self.config.protocol {
            Protocol::StopAndWait => SawReceiver::new(arq).run(&mut peer, &mut output)?,
            Protocol::GoBackN => GbnReceiver::new(arq).run(&mut peer, &mut output)?,
        };

        output.commit()?;
        Ok(report)
    }
}
