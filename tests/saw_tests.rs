// Stop-and-Wait transfers over in-memory channels
// Run with: cargo test --test saw_tests

mod common;

use std::thread;
use std::time::Duration;

use arqx::chunking::Chunker;
use arqx::client::SawReceiver;
use arqx::common::config::ArqConfig;
use arqx::common::error::{Error, PartialStats};
use arqx::protocol::{Packet, PacketType};
use arqx::server::SawSender;
use arqx::simulator::{ErrorSimulator, Passthrough};
use arqx::transport::{Channel, MemoryChannel};

use common::{pattern, Event, LoseNth, Recording, Scripted};

fn fast_config() -> ArqConfig {
    ArqConfig::default()
        .with_ack_timeout(Duration::from_millis(100))
        .with_receive_timeouts(Duration::from_secs(2), Duration::from_millis(300))
}

#[test]
fn test_lossless_transfer_one_round_trip_per_chunk() {
    let data = pattern(5000);
    let (tx, mut rx) = MemoryChannel::pair();
    let mut tx = Recording::new(tx);
    let events = tx.events.clone();

    let input = data.clone();
    let sender = thread::spawn(move || {
        let mut chunker = Chunker::from_bytes(input);
        SawSender::new(fast_config()).run(&mut tx, &mut Passthrough, &mut chunker)
    });

    let mut out: Vec<u8> = Vec::new();
    let received = SawReceiver::new(fast_config()).run(&mut rx, &mut out).unwrap();
    let sent = sender.join().unwrap().unwrap();

    assert_eq!(out, data);
    assert_eq!(sent.data_packets, 5);
    assert_eq!(sent.transmissions, 5);
    assert_eq!(sent.retransmissions, 0);
    assert_eq!(received.bytes, 5000);
    assert_eq!(received.digest_verified, Some(true));

    // DATA n is always followed by ACK n before DATA n+1 goes out
    let events = events.lock().unwrap().clone();
    let exchange: Vec<Event> = events
        .into_iter()
        .filter(|e| matches!(e, Event::Sent(PacketType::Data, _) | Event::Acked(_)))
        .collect();
    let expected: Vec<Event> = (0..5)
        .flat_map(|seq| [Event::Sent(PacketType::Data, seq), Event::Acked(seq)])
        .collect();
    assert_eq!(exchange, expected);
}

#[test]
fn test_gives_up_after_max_retries_plus_one_attempts() {
    let (mut tx, mut rx) = MemoryChannel::pair();
    let config = ArqConfig::default()
        .with_ack_timeout(Duration::from_millis(20))
        .with_max_retries(5);

    let mut chunker = Chunker::from_bytes(pattern(3000));
    let err = SawSender::new(config)
        .run(&mut tx, &mut Passthrough, &mut chunker)
        .unwrap_err();
    assert!(matches!(err.cause(), Error::RetriesExhausted { seq: 0, attempts: 6 }));

    let mut seen = Vec::new();
    while let Some(d) = rx.recv(Duration::from_millis(10)).unwrap() {
        seen.push(Packet::decode(&d).unwrap());
    }
    assert_eq!(seen.len(), 6);
    assert!(seen.iter().all(|p| p.kind == PacketType::Data && p.seq_num == 0));
}

#[test]
fn test_unreachable_packet_stops_transfer_midway() {
    let data = pattern(5 * 1024);
    let (mut tx, mut rx) = MemoryChannel::pair();
    let script = Scripted::new().drop_every_data(2);
    let log = script.clone();

    let receiver = thread::spawn(move || {
        let mut out: Vec<u8> = Vec::new();
        let _ = SawReceiver::new(fast_config()).run(&mut rx, &mut out);
        out
    });

    let mut script = script;
    let mut chunker = Chunker::from_bytes(data.clone());
    let err = SawSender::new(fast_config().with_max_retries(5))
        .run(&mut tx, &mut script, &mut chunker)
        .unwrap_err();
    drop(tx);
    let delivered = receiver.join().unwrap();

    assert!(matches!(err.cause(), Error::RetriesExhausted { seq: 2, attempts: 6 }));
    assert_eq!(log.data_seqs(), vec![0, 1, 2, 2, 2, 2, 2, 2]);
    assert!(log.offered().iter().all(|o| o.kind != PacketType::Eof));
    assert_eq!(delivered, &data[..2 * 1024]);

    match err.stats() {
        Some(PartialStats::Sender(sent)) => {
            assert_eq!(sent.data_packets, 2);
            assert_eq!(sent.retransmissions, 5);
        }
        other => panic!("expected sender stats, got {:?}", other),
    }
}

#[test]
fn test_lost_data_is_retransmitted() {
    let data = pattern(4096);
    let (mut tx, mut rx) = MemoryChannel::pair();
    let script = Scripted::new().drop_first_data(2);
    let log = script.clone();

    let input = data.clone();
    let sender = thread::spawn(move || {
        let mut script = script;
        let mut chunker = Chunker::from_bytes(input);
        SawSender::new(fast_config()).run(&mut tx, &mut script, &mut chunker)
    });

    let mut out: Vec<u8> = Vec::new();
    SawReceiver::new(fast_config()).run(&mut rx, &mut out).unwrap();
    let sent = sender.join().unwrap().unwrap();

    assert_eq!(out, data);
    assert_eq!(sent.retransmissions, 1);
    assert_eq!(sent.timeouts, 1);
    assert_eq!(log.data_seqs(), vec![0, 1, 2, 2, 3]);
}

#[test]
fn test_lost_ack_produces_duplicate() {
    let data = pattern(3000);
    let (mut tx, rx) = MemoryChannel::pair();
    // the receiver's second datagram is ACK(1)
    let mut rx = LoseNth::new(rx, 1);

    let input = data.clone();
    let sender = thread::spawn(move || {
        let mut chunker = Chunker::from_bytes(input);
        SawSender::new(fast_config()).run(&mut tx, &mut Passthrough, &mut chunker)
    });

    let mut out: Vec<u8> = Vec::new();
    let received = SawReceiver::new(fast_config()).run(&mut rx, &mut out).unwrap();
    let sent = sender.join().unwrap().unwrap();

    assert_eq!(out, data);
    assert_eq!(received.duplicate_packets, 1);
    assert_eq!(sent.retransmissions, 1);
}

#[test]
fn test_missing_eof_assumed_after_silence() {
    let data = pattern(2500);
    let (mut tx, mut rx) = MemoryChannel::pair();
    let script = Scripted::new().drop_all(PacketType::Eof);

    let input = data.clone();
    let sender = thread::spawn(move || {
        let mut script = script;
        let mut chunker = Chunker::from_bytes(input);
        let report = SawSender::new(fast_config()).run(&mut tx, &mut script, &mut chunker);
        // keep the link open while the receiver waits out its timeouts
        thread::sleep(Duration::from_millis(1200));
        report
    });

    let config = fast_config().with_receive_timeouts(Duration::from_secs(2), Duration::from_millis(100));
    let mut out: Vec<u8> = Vec::new();
    let received = SawReceiver::new(config).run(&mut rx, &mut out).unwrap();
    sender.join().unwrap().unwrap();

    assert_eq!(out, data);
    assert!(received.implicit_eof);
    assert_eq!(received.digest_verified, None);
}

#[test]
fn test_end_to_end_with_impairment() {
    let data = pattern(5000);
    let (mut tx, mut rx) = MemoryChannel::pair();

    let input = data.clone();
    let sender = thread::spawn(move || {
        let mut sim = ErrorSimulator::new(0.1, 0.05, Some(42));
        let mut chunker = Chunker::from_bytes(input);
        let config = fast_config().with_ack_timeout(Duration::from_millis(50));
        let report = SawSender::new(config).run(&mut tx, &mut sim, &mut chunker);
        (report, sim.stats())
    });

    let mut out: Vec<u8> = Vec::new();
    let received = SawReceiver::new(fast_config()).run(&mut rx, &mut out);
    let (sent, stats) = sender.join().unwrap();
    let sent = sent.unwrap();
    let received = received.unwrap();

    assert_eq!(out, data);
    assert!(stats.dropped + stats.corrupted > 0);
    assert!(sent.retransmissions > 0);
    assert_eq!(received.bytes, 5000);
    assert_eq!(received.digest_verified, Some(true));
}
