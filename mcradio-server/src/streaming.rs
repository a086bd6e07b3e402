//! Per-channel streaming loop
//!
//! One `StreamingTask` runs on a pool worker for each channel: read a chunk
//! from the media library straight into the payload region of a reusable
//! datagram buffer, stamp the header in front of it, send, repeat until the
//! shared running flag clears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mcradio_common::packet::{HEADER_LEN, MAX_PAYLOAD};
use mcradio_common::{ChannelId, MediaLibrary, PacketHeader, SequenceGenerator};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_BACKOFF_MS, DEFAULT_SEND_INTERVAL_MS};
use crate::error::{Error, Result};
use crate::sender::DatagramSink;

/// Pacing and sizing of a streaming loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Payload bytes requested per read (1..=MAX_PAYLOAD)
    pub chunk_size: usize,
    /// Pause after a read that yielded nothing
    pub idle_backoff: Duration,
    /// Pause after every send
    pub send_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_backoff: Duration::from_millis(DEFAULT_IDLE_BACKOFF_MS),
            send_interval: Duration::from_millis(DEFAULT_SEND_INTERVAL_MS),
        }
    }
}

/// Result of a single loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Datagram carrying this many payload bytes was sent
    Sent(usize),
    /// Read produced no data or failed
    Idle,
    /// Read exceeded the wire maximum; data discarded
    Dropped,
    /// Socket refused the datagram
    SendFailed,
}

/// Streams one channel to the multicast group
pub struct StreamingTask {
    channel_id: ChannelId,
    library: Arc<MediaLibrary>,
    sink: Arc<dyn DatagramSink>,
    sequence: Arc<SequenceGenerator>,
    settings: StreamSettings,
    running: Arc<AtomicBool>,
    buffer: Vec<u8>,
}

impl StreamingTask {
    pub fn new(
        channel_id: ChannelId,
        library: Arc<MediaLibrary>,
        sink: Arc<dyn DatagramSink>,
        sequence: Arc<SequenceGenerator>,
        settings: StreamSettings,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        if settings.chunk_size == 0 || settings.chunk_size > MAX_PAYLOAD {
            return Err(Error::Config(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_PAYLOAD, settings.chunk_size
            )));
        }

        let buffer = vec![0u8; HEADER_LEN + settings.chunk_size];
        Ok(Self {
            channel_id,
            library,
            sink,
            sequence,
            settings,
            running,
            buffer,
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Loop until the running flag clears
    pub fn run(mut self) {
        info!("Streaming channel {} started", self.channel_id);

        let mut sent: u64 = 0;
        while self.running.load(Ordering::Relaxed) {
            match self.step() {
                StepOutcome::Sent(_) => {
                    sent += 1;
                    thread::sleep(self.settings.send_interval);
                }
                StepOutcome::SendFailed => thread::sleep(self.settings.send_interval),
                StepOutcome::Idle | StepOutcome::Dropped => {
                    thread::sleep(self.settings.idle_backoff)
                }
            }
        }

        info!(
            "Streaming channel {} stopped after {} datagrams",
            self.channel_id, sent
        );
    }

    /// Read, frame and send one datagram
    pub fn step(&mut self) -> StepOutcome {
        let bytes_read = match self.library.read(self.channel_id, &mut self.buffer[HEADER_LEN..]) {
            Ok(0) => {
                debug!("Channel {} read returned no data", self.channel_id);
                return StepOutcome::Idle;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Channel {} read failed: {}", self.channel_id, e);
                return StepOutcome::Idle;
            }
        };

        if bytes_read > MAX_PAYLOAD {
            error!(
                "Channel {} read {} bytes, above the {} byte maximum; dropping",
                self.channel_id, bytes_read, MAX_PAYLOAD
            );
            return StepOutcome::Dropped;
        }

        let sequence = self.sequence.next();
        let header = match PacketHeader::new(self.channel_id, sequence, bytes_read) {
            Ok(header) => header,
            Err(e) => {
                error!("Channel {} could not frame packet: {}", self.channel_id, e);
                return StepOutcome::Dropped;
            }
        };
        header.encode_into(&mut self.buffer[..HEADER_LEN]);

        let datagram = &self.buffer[..HEADER_LEN + bytes_read];
        match self.sink.send(datagram) {
            Ok(_) => {
                debug!(
                    "Channel {} sent packet {} ({} bytes)",
                    self.channel_id, sequence, bytes_read
                );
                StepOutcome::Sent(bytes_read)
            }
            Err(e) => {
                warn!(
                    "Channel {} failed to send packet {}: {}",
                    self.channel_id, sequence, e
                );
                StepOutcome::SendFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcradio_common::LibrarySettings;
    use std::fs;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        datagrams: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl DatagramSink for Recorder {
        fn send(&self, datagram: &[u8]) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "unreachable"));
            }
            self.datagrams.lock().unwrap().push(datagram.to_vec());
            Ok(datagram.len())
        }
    }

    fn one_channel_library(contents: &[u8]) -> (TempDir, Arc<MediaLibrary>) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("news");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("descr.txt"), "News\n").unwrap();
        fs::write(dir.join("a.mp3"), contents).unwrap();
        let library = Arc::new(MediaLibrary::new(tmp.path(), LibrarySettings::default()));
        (tmp, library)
    }

    fn task(
        library: Arc<MediaLibrary>,
        sink: Arc<Recorder>,
        chunk_size: usize,
    ) -> Result<StreamingTask> {
        StreamingTask::new(
            1,
            library,
            sink,
            Arc::new(SequenceGenerator::new()),
            StreamSettings {
                chunk_size,
                ..StreamSettings::default()
            },
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn test_chunk_size_bounds() {
        let (_tmp, library) = one_channel_library(b"abc");
        let sink = Arc::new(Recorder::default());
        assert!(task(Arc::clone(&library), Arc::clone(&sink), 0).is_err());
        assert!(task(Arc::clone(&library), Arc::clone(&sink), MAX_PAYLOAD + 1).is_err());
        assert!(task(library, sink, MAX_PAYLOAD).is_ok());
    }

    #[test]
    fn test_step_frames_payload() {
        let (_tmp, library) = one_channel_library(b"0123456789");
        let sink = Arc::new(Recorder::default());
        let mut task = task(library, Arc::clone(&sink), 4).unwrap();

        assert_eq!(task.step(), StepOutcome::Sent(4));
        assert_eq!(task.step(), StepOutcome::Sent(4));
        assert_eq!(task.step(), StepOutcome::Sent(2));

        let datagrams = sink.datagrams.lock().unwrap();
        let (header, payload) = PacketHeader::decode(&datagrams[2]).unwrap();
        assert_eq!(header.channel_id, 1);
        assert_eq!(header.sequence, 2);
        assert_eq!(payload, b"89");
        assert_eq!(datagrams[2].len(), HEADER_LEN + 2);
    }

    #[test]
    fn test_unknown_channel_is_idle() {
        let (_tmp, library) = one_channel_library(b"abc");
        let sink = Arc::new(Recorder::default());
        let mut task = StreamingTask::new(
            99,
            library,
            Arc::clone(&sink) as Arc<dyn DatagramSink>,
            Arc::new(SequenceGenerator::new()),
            StreamSettings::default(),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        assert_eq!(task.step(), StepOutcome::Idle);
        assert!(sink.datagrams.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_failure_is_reported() {
        let (_tmp, library) = one_channel_library(b"abc");
        let sink = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let mut task = task(library, sink, 16).unwrap();
        assert_eq!(task.step(), StepOutcome::SendFailed);
    }
}
