//! Multicast Radio Client (mcradio-client) - Main entry point
//!
//! Receives the multicast stream and plays the channel chosen on stdin.
//! Operator prompts go to stderr so `--raw` can use stdout for audio.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mcradio_client::control::{run_operator_loop, OperatorExit};
use mcradio_client::receiver::receive_loop;
use mcradio_client::{
    ChannelDirectory, ChannelSelection, ClientConfig, DecoderProcess, Demultiplexer,
    MulticastReceiver, PayloadSink, WriterSink,
};
use mcradio_common::config::{load_toml, resolve_config_file};
use mcradio_common::logging::init_tracing;
use mcradio_common::ChannelId;
use tracing::{info, warn};

/// Command-line arguments for mcradio-client
#[derive(Parser, Debug)]
#[command(name = "mcradio-client")]
#[command(about = "Multicast channel radio client")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "MCRADIO_CONFIG")]
    config: Option<PathBuf>,

    /// Multicast group address
    #[arg(short, long, env = "MCRADIO_GROUP")]
    group: Option<Ipv4Addr>,

    /// UDP port
    #[arg(short, long, env = "MCRADIO_PORT")]
    port: Option<u16>,

    /// Channel directory, e.g. "1,opera|2,traffic"
    #[arg(long)]
    channels: Option<String>,

    /// Channel id to start playing immediately
    #[arg(long)]
    channel: Option<ChannelId>,

    /// Decoder command fed through stdin
    #[arg(long)]
    decoder: Option<String>,

    /// Write raw payload to stdout instead of starting a decoder
    #[arg(long)]
    raw: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_file(args.config.as_deref());
    let mut config: ClientConfig =
        load_toml(config_path.as_deref()).context("Failed to load configuration")?;

    if let Some(group) = args.group {
        config.network.group = group;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(channels) = args.channels {
        config.channels = channels;
    }
    if let Some(decoder) = args.decoder {
        config.decoder_command = decoder;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging, &["mcradio_client", "mcradio_common"])
        .context("Failed to initialize logging")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting mcradio-client v{}", env!("CARGO_PKG_VERSION"));

    let directory = ChannelDirectory::parse(&config.channels);
    if directory.is_empty() {
        warn!("Channel directory is empty; only --channel can select a channel");
    }

    let selection = Arc::new(ChannelSelection::new());
    if let Some(id) = args.channel {
        if directory.find(id).is_none() {
            warn!("Channel {} is not in the directory", id);
        }
        selection.set(id);
    }

    let receiver = MulticastReceiver::open(&config.network)
        .context("Failed to open multicast receiver")?;
    let running = Arc::new(AtomicBool::new(true));

    let receive_thread = if args.raw {
        spawn_receiver(receiver, WriterSink::new(io::stdout()), &selection, &running)?
    } else {
        let decoder = DecoderProcess::spawn(&config.decoder_command)
            .context("Failed to start decoder")?;
        spawn_receiver(receiver, decoder, &selection, &running)?
    };

    let exit = run_operator_loop(
        io::stdin().lock(),
        io::stderr(),
        &directory,
        &selection,
        &running,
    )
    .context("Operator input failed")?;

    if exit == OperatorExit::EndOfInput {
        info!("Operator input closed; receiving until interrupted");
    }

    let result = receive_thread
        .join()
        .map_err(|_| anyhow!("Receive thread panicked"))?;
    running.store(false, Ordering::SeqCst);
    result.context("Receiver failed")?;

    info!("Client shutdown complete");
    Ok(())
}

fn spawn_receiver<S>(
    receiver: MulticastReceiver,
    sink: S,
    selection: &Arc<ChannelSelection>,
    running: &Arc<AtomicBool>,
) -> Result<thread::JoinHandle<mcradio_client::Result<()>>>
where
    S: PayloadSink + Send + 'static,
{
    let selection = Arc::clone(selection);
    let running = Arc::clone(running);

    thread::Builder::new()
        .name("receiver".to_string())
        .spawn(move || {
            let result = {
                let mut demux = Demultiplexer::new(selection, sink);
                receive_loop(&receiver, &mut demux, &running)
            };

            // The operator loop is blocked on stdin and cannot notice this
            if result.is_err() {
                std::process::exit(1);
            }
            result
        })
        .context("Failed to spawn receive thread")
}
