// Full client/server sessions over loopback UDP
// Run with: cargo test --test udp_loopback

mod common;

use std::fs;
use std::thread;
use std::time::Duration;

use arqx::common::config::{ArqConfig, ClientConfig, ServerConfig};
use arqx::common::error::{Error, PartialStats, TransferOutcome};
use arqx::common::types::Protocol;
use arqx::{Client, Server};

use common::pattern;

fn arq() -> ArqConfig {
    ArqConfig::default()
        .with_ack_timeout(Duration::from_millis(100))
        .with_receive_timeouts(Duration::from_secs(3), Duration::from_secs(1))
        .with_eof_linger(Duration::from_millis(200))
}

fn start_server(
    protocol: Protocol,
    root: &std::path::Path,
    loss: f64,
    corrupt: f64,
) -> (std::net::SocketAddr, thread::JoinHandle<arqx::Result<Option<arqx::server::SessionReport>>>) {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), protocol)
        .with_root(root.to_path_buf())
        .with_impairment(loss, corrupt, Some(7))
        .unwrap()
        .with_idle_timeout(Duration::from_secs(5))
        .with_arq(arq());
    let mut server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    (addr, thread::spawn(move || server.serve_one()))
}

#[test]
fn test_stop_and_wait_over_udp() {
    let root = tempfile::tempdir().unwrap();
    let data = pattern(20_000);
    fs::write(root.path().join("sample.bin"), &data).unwrap();

    let (addr, server) = start_server(Protocol::StopAndWait, root.path(), 0.0, 0.0);

    let out_dir = tempfile::tempdir().unwrap();
    let save_as = out_dir.path().join("recv_sample.bin");
    let client = Client::new(ClientConfig::new(addr, Protocol::StopAndWait).with_arq(arq()));
    let report = client.fetch("sample.bin", &save_as).unwrap();

    assert_eq!(fs::read(&save_as).unwrap(), data);
    assert_eq!(report.bytes, 20_000);
    assert_eq!(report.digest_verified, Some(true));

    let session = server.join().unwrap().unwrap().unwrap();
    assert_eq!(session.file_name, "sample.bin");
    assert_eq!(session.sender.data_packets, 20);
    assert_eq!(session.outcome(), TransferOutcome::Success);
}

#[test]
fn test_go_back_n_over_udp_with_loss() {
    let root = tempfile::tempdir().unwrap();
    let data = pattern(30_000);
    fs::write(root.path().join("lossy.bin"), &data).unwrap();

    let (addr, server) = start_server(Protocol::GoBackN, root.path(), 0.1, 0.05);

    let out_dir = tempfile::tempdir().unwrap();
    let save_as = out_dir.path().join("lossy.bin");
    let client = Client::new(ClientConfig::new(addr, Protocol::GoBackN).with_arq(arq()));
    let report = client.fetch("lossy.bin", &save_as).unwrap();

    assert_eq!(fs::read(&save_as).unwrap(), data);
    assert_eq!(report.digest_verified, Some(true));

    let session = server.join().unwrap().unwrap().unwrap();
    assert_eq!(session.sender.data_packets, 30);
    assert_eq!(session.sender.eof_acked, Some(true));
    // every DATA transmission plus at least one EOF went through the simulator
    assert!(session.simulator.total > session.sender.transmissions);
}

#[test]
fn test_missing_file_reported_as_peer_error() {
    let root = tempfile::tempdir().unwrap();
    let (addr, server) = start_server(Protocol::StopAndWait, root.path(), 0.0, 0.0);

    let out_dir = tempfile::tempdir().unwrap();
    let save_as = out_dir.path().join("nothing.bin");
    let client = Client::new(ClientConfig::new(addr, Protocol::StopAndWait).with_arq(arq()));
    let err = client.fetch("nothing.bin", &save_as).unwrap_err();

    assert!(matches!(err.cause(), Error::PeerError(msg) if msg == "File not found"));
    assert_eq!(err.outcome(), TransferOutcome::PeerError);
    match err.stats() {
        Some(PartialStats::Receiver(report)) => {
            assert_eq!(report.total_packets, 1);
            assert_eq!(report.bytes, 0);
        }
        other => panic!("expected receiver stats, got {:?}", other),
    }
    assert!(!save_as.exists());
    assert!(!out_dir.path().join("nothing.bin.part").exists());

    assert!(matches!(server.join().unwrap(), Err(Error::FileNotFound(_))));
}

#[test]
fn test_path_escape_rejected() {
    let root = tempfile::tempdir().unwrap();
    let (addr, server) = start_server(Protocol::GoBackN, root.path(), 0.0, 0.0);

    let out_dir = tempfile::tempdir().unwrap();
    let client = Client::new(ClientConfig::new(addr, Protocol::GoBackN).with_arq(arq()));
    let err = client
        .fetch("../../etc/passwd", &out_dir.path().join("passwd"))
        .unwrap_err();

    assert!(matches!(err.cause(), Error::PeerError(_)));
    assert!(matches!(server.join().unwrap(), Err(Error::InvalidFileName(_))));
}

#[test]
fn test_abandoned_session_reports_sender_stats() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("big.bin"), pattern(10_000)).unwrap();
    let (addr, server) = start_server(Protocol::StopAndWait, root.path(), 0.0, 0.0);

    // request the file, then never acknowledge anything
    let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .send_to(&arqx::Packet::request("big.bin").encode(), addr)
        .unwrap();

    let err = server.join().unwrap().unwrap_err();
    assert!(matches!(err.cause(), Error::RetriesExhausted { seq: 0, attempts: 6 }));
    match err.stats() {
        Some(PartialStats::Sender(report)) => {
            assert_eq!(report.data_packets, 0);
            assert_eq!(report.transmissions, 6);
            assert_eq!(report.timeouts, 6);
        }
        other => panic!("expected sender stats, got {:?}", other),
    }
}
