//! Server assembly
//!
//! Wires the media library, the multicast sender and the worker pool
//! together and owns them for the lifetime of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mcradio_common::{ChannelSummary, MediaLibrary, PoolConfig, SequenceGenerator, WorkerPool};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::sender::{DatagramSink, MulticastSender};
use crate::streaming::{StreamSettings, StreamingTask};

/// Running radio server
pub struct RadioServer {
    library: Arc<MediaLibrary>,
    pool: WorkerPool,
    running: Arc<AtomicBool>,
    sequence: Arc<SequenceGenerator>,
    channels: Vec<ChannelSummary>,
}

impl RadioServer {
    /// Load the library, open the multicast socket and start streaming
    pub fn start(config: &ServerConfig, library: MediaLibrary) -> Result<Self> {
        let sender = MulticastSender::open(&config.network)?;
        Self::start_with_sink(config, library, Arc::new(sender))
    }

    /// Start streaming into an arbitrary datagram sink
    pub fn start_with_sink(
        config: &ServerConfig,
        library: MediaLibrary,
        sink: Arc<dyn DatagramSink>,
    ) -> Result<Self> {
        config.validate()?;

        let library = Arc::new(library);
        library.initialize()?;
        let channels = library.list_channels()?;

        for channel in &channels {
            info!(
                "Channel {}: {} ({} files)",
                channel.id, channel.description, channel.file_count
            );
        }

        let running = Arc::new(AtomicBool::new(true));
        let sequence = Arc::new(SequenceGenerator::new());
        let tasks = match build_tasks(
            &channels,
            &library,
            &sink,
            &sequence,
            &config.stream.to_stream_settings(),
            &running,
        ) {
            Ok(tasks) => tasks,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let pool = WorkerPool::new(pool_config_for(config, channels.len()))?;
        let stagger = config.stream.submit_stagger();

        for task in tasks {
            let channel_id = task.channel_id();
            if let Err(e) = pool.submit(move || task.run()) {
                error!("Channel {} not started: {}", channel_id, e);
                drop(e.into_inner());
            }

            thread::sleep(stagger);
        }

        info!("Streaming {} channels", channels.len());

        Ok(Self {
            library,
            pool,
            running,
            sequence,
            channels,
        })
    }

    pub fn channels(&self) -> &[ChannelSummary] {
        &self.channels
    }

    pub fn library(&self) -> &Arc<MediaLibrary> {
        &self.library
    }

    /// Sequence number the next datagram will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence.peek()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop every streaming task, join the pool and release the library
    ///
    /// Blocks for up to one streaming iteration per channel.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping {} streaming tasks", self.channels.len());
        self.pool.shutdown();
        self.library.teardown();
        info!("Server stopped");
    }
}

impl Drop for RadioServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One streaming task per channel, all sharing the sink, counter and flag
///
/// Built before anything is submitted so a failure leaves no task running.
pub fn build_tasks(
    channels: &[ChannelSummary],
    library: &Arc<MediaLibrary>,
    sink: &Arc<dyn DatagramSink>,
    sequence: &Arc<SequenceGenerator>,
    settings: &StreamSettings,
    running: &Arc<AtomicBool>,
) -> Result<Vec<StreamingTask>> {
    channels
        .iter()
        .map(|channel| {
            StreamingTask::new(
                channel.id,
                Arc::clone(library),
                Arc::clone(sink),
                Arc::clone(sequence),
                settings.clone(),
                Arc::clone(running),
            )
        })
        .collect()
}

/// Pool sizing that gives every channel its own worker
///
/// Streaming tasks never return while the server runs, and the pool only
/// grows while queued tasks outnumber live workers, so both bounds are raised
/// to the channel count.
pub fn pool_config_for(config: &ServerConfig, channel_count: usize) -> PoolConfig {
    let mut pool = config.pool.to_pool_config();

    if pool.max_threads < channel_count {
        warn!(
            "max_threads {} is below the channel count {}; raising it",
            pool.max_threads, channel_count
        );
        pool.max_threads = channel_count;
    }
    if pool.min_threads < channel_count {
        info!(
            "Raising min_threads from {} to {} so every channel starts at once",
            pool.min_threads, channel_count
        );
        pool.min_threads = channel_count;
    }

    pool
}
