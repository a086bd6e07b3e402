//! Integration tests for the client receive path and operator control

use std::io::{self, Cursor};
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mcradio_client::control::{run_operator_loop, OperatorExit, MAX_DIRECTORY_ENTRIES};
use mcradio_client::receiver::{receive_loop, Disposition};
use mcradio_client::{
    ChannelDirectory, ChannelSelection, Demultiplexer, Error, MulticastReceiver, PayloadSink,
    WriterSink,
};
use mcradio_common::PacketHeader;

// ============================================================================
// Test Helpers
// ============================================================================

fn datagram(channel_id: u16, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader::new(channel_id, sequence, payload.len()).unwrap();
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn demux(selected: Option<u16>) -> (Arc<ChannelSelection>, Demultiplexer<WriterSink<Vec<u8>>>) {
    let selection = Arc::new(ChannelSelection::new());
    if let Some(id) = selected {
        selection.set(id);
    }
    let demux = Demultiplexer::new(Arc::clone(&selection), WriterSink::new(Vec::new()));
    (selection, demux)
}

// ============================================================================
// Demultiplexer
// ============================================================================

#[test]
fn test_only_selected_channel_reaches_sink() {
    let (_selection, mut demux) = demux(Some(2));

    assert_eq!(demux.handle(&datagram(1, 0, b"one")).unwrap(), Disposition::Filtered);
    assert_eq!(demux.handle(&datagram(2, 1, b"two")).unwrap(), Disposition::Forwarded(3));
    assert_eq!(demux.handle(&datagram(3, 2, b"three")).unwrap(), Disposition::Filtered);
    assert_eq!(demux.handle(&datagram(2, 3, b"TWO")).unwrap(), Disposition::Forwarded(3));

    assert_eq!(demux.sink().get_ref(), b"twoTWO");
    assert_eq!(demux.stats().forwarded, 2);
    assert_eq!(demux.stats().filtered, 2);
}

#[test]
fn test_nothing_forwarded_before_selection() {
    let (selection, mut demux) = demux(None);

    assert_eq!(demux.handle(&datagram(1, 0, b"early")).unwrap(), Disposition::Filtered);
    selection.set(1);
    assert_eq!(demux.handle(&datagram(1, 1, b"late")).unwrap(), Disposition::Forwarded(4));

    assert_eq!(demux.into_sink().into_inner(), b"late");
}

#[test]
fn test_switching_channels_mid_stream() {
    let (selection, mut demux) = demux(Some(1));

    demux.handle(&datagram(1, 0, b"a1")).unwrap();
    demux.handle(&datagram(2, 1, b"b1")).unwrap();
    selection.set(2);
    demux.handle(&datagram(1, 2, b"a2")).unwrap();
    demux.handle(&datagram(2, 3, b"b2")).unwrap();

    assert_eq!(demux.sink().get_ref(), b"a1b2");
}

#[test]
fn test_malformed_and_empty_datagrams_are_dropped() {
    let (_selection, mut demux) = demux(Some(1));

    // Shorter than a header
    assert_eq!(demux.handle(&[0u8; 5]).unwrap(), Disposition::Malformed);

    // Header claims more payload than present
    let mut lying = datagram(1, 0, b"abcd");
    lying.truncate(lying.len() - 1);
    assert_eq!(demux.handle(&lying).unwrap(), Disposition::Malformed);

    // Trailing bytes beyond the declared length
    let mut padded = datagram(1, 1, b"abcd");
    padded.push(0);
    assert_eq!(demux.handle(&padded).unwrap(), Disposition::Malformed);

    assert_eq!(demux.handle(&datagram(1, 2, b"")).unwrap(), Disposition::Empty);

    let stats = demux.stats();
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.empty, 1);
    assert_eq!(stats.received, 4);
    assert!(demux.sink().get_ref().is_empty());
}

#[test]
fn test_sequence_gaps_are_counted_not_corrected() {
    let (_selection, mut demux) = demux(Some(1));

    for sequence in [10, 11, 14, 12, 15] {
        demux.handle(&datagram(1, sequence, &[sequence as u8])).unwrap();
    }

    // Arrival order is kept as-is
    assert_eq!(demux.sink().get_ref(), &[10u8, 11, 14, 12, 15]);
    assert_eq!(demux.stats().gaps, 2);
    assert_eq!(demux.stats().reordered, 1);
}

#[test]
fn test_receive_loop_over_loopback() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let target = socket.local_addr().unwrap();
    let receiver = MulticastReceiver::from_socket(socket);

    let (_selection, mut demux) = demux(Some(7));
    let running = Arc::new(AtomicBool::new(true));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&datagram(7, 0, b"hello "), target).unwrap();
    sender.send_to(&datagram(8, 1, b"noise"), target).unwrap();
    sender.send_to(b"junk", target).unwrap();
    sender.send_to(&datagram(7, 2, b"world"), target).unwrap();

    let stopper = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            running.store(false, Ordering::SeqCst);
        })
    };

    receive_loop(&receiver, &mut demux, &running).unwrap();
    stopper.join().unwrap();

    assert_eq!(demux.sink().get_ref(), b"hello world");
    assert_eq!(demux.stats().received, 4);
    assert_eq!(demux.stats().malformed, 1);
}

/// Sink standing in for a decoder that has exited
struct BrokenPipeSink;

impl PayloadSink for BrokenPipeSink {
    fn write_payload(&mut self, _payload: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "decoder exited"))
    }
}

#[test]
fn test_sink_failure_stops_receive_loop() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let target = socket.local_addr().unwrap();
    let receiver = MulticastReceiver::from_socket(socket);

    let selection = Arc::new(ChannelSelection::new());
    selection.set(3);
    let mut demux = Demultiplexer::new(selection, BrokenPipeSink);
    let running = AtomicBool::new(true);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&datagram(3, 0, b"audio"), target).unwrap();

    let result = receive_loop(&receiver, &mut demux, &running);

    assert!(matches!(result, Err(Error::Decoder(_))));
    assert!(!running.load(Ordering::SeqCst), "running must be cleared");
}

// ============================================================================
// Directory and operator loop
// ============================================================================

#[test]
fn test_directory_skips_malformed_entries() {
    let directory = ChannelDirectory::parse("1,opera|bogus|x,jazz|3,|4,pop||70000,big");
    let ids: Vec<u16> = directory.entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 4]);
}

#[test]
fn test_directory_is_capped() {
    let list: Vec<String> = (1..=30).map(|i| format!("{},ch{}", i, i)).collect();
    let directory = ChannelDirectory::parse(&list.join("|"));
    assert_eq!(directory.len(), MAX_DIRECTORY_ENTRIES);
    assert_eq!(directory.by_position(20).unwrap().id, 20);
}

#[test]
fn test_operator_selects_lists_and_quits() {
    let directory = ChannelDirectory::parse("10,opera|20,traffic|30,pop");
    let selection = ChannelSelection::new();
    let running = AtomicBool::new(true);
    let mut output = Vec::new();

    let exit = run_operator_loop(
        Cursor::new("2\nl\n9\nhuh\nq\n3\n"),
        &mut output,
        &directory,
        &selection,
        &running,
    )
    .unwrap();

    assert_eq!(exit, OperatorExit::Quit);
    assert_eq!(selection.get(), Some(20));
    assert!(!running.load(Ordering::SeqCst));

    let output = String::from_utf8(output).unwrap();
    assert!(output.contains("Now playing: traffic (channel 20)"));
    assert!(output.contains("2. traffic (channel 20) [current]"));
    assert!(output.contains("No channel at position 9"));
}

#[test]
fn test_operator_end_of_input_keeps_running() {
    let directory = ChannelDirectory::parse("1,opera");
    let selection = ChannelSelection::new();
    let running = AtomicBool::new(true);

    let exit = run_operator_loop(
        Cursor::new("1\n"),
        Vec::new(),
        &directory,
        &selection,
        &running,
    )
    .unwrap();

    assert_eq!(exit, OperatorExit::EndOfInput);
    assert_eq!(selection.get(), Some(1));
    assert!(running.load(Ordering::SeqCst));
}
