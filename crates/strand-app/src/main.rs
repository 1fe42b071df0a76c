//! # Strand
//!
//! Encodes an audio file (or a test tone) with the configured codec, decodes
//! it again and plays the result on the default output device.

mod config;
mod pipeline;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use config::AppConfig;
use pipeline::PipelineSpec;
use source::{PcmSource, Tone};
use strand_audio::{output, AudioPlayer, CpalBackend, FileSource};
use strand_core::{AudioCodec, BufferPool, ByteBuffer, CHANNELS, INPUT_BYTES_PER_SAMPLE};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: strand <input-file | --tone> [codec]\n       strand --list-devices";

/// Decoded blocks in flight between the pipeline and the player.
const CHANNEL_DEPTH: usize = 16;

/// Wait between retries while the ring is full.
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(5);

/// Give up on the output once the ring takes nothing for this long.
const STALL_LIMIT: Duration = Duration::from_secs(2);

const TONE_FREQUENCY: f64 = 440.0;
const TONE_SECONDS: f64 = 2.0;

#[derive(Debug, PartialEq)]
enum Command {
    Play {
        input: Input,
        codec: Option<AudioCodec>,
    },
    ListDevices,
}

#[derive(Debug, PartialEq)]
enum Input {
    File(PathBuf),
    Tone,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut args = args.into_iter();
    let first = args.next().ok_or_else(|| anyhow!("missing input"))?;

    let input = match first.as_str() {
        "--list-devices" => return Ok(Command::ListDevices),
        "--tone" => Input::Tone,
        flag if flag.starts_with("--") => bail!("unknown option '{flag}'"),
        path => Input::File(PathBuf::from(path)),
    };

    let codec: Option<AudioCodec> = args.next().map(|name| name.parse()).transpose()?;
    if let Some(extra) = args.next() {
        bail!("unexpected argument '{extra}'");
    }

    Ok(Command::Play { input, codec })
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand=info,strand_codec=info,strand_audio=info".into()),
        )
        .init();

    let command = parse_args(std::env::args().skip(1)).map_err(|e| anyhow!("{e}\n{USAGE}"))?;
    match command {
        Command::ListDevices => list_devices(),
        Command::Play { input, codec } => {
            let mut config = AppConfig::load()?;
            if let Some(codec) = codec {
                config.codec = codec;
            }
            config.validate()?;
            play(&config, input)
        }
    }
}

fn list_devices() -> Result<()> {
    let default = output::default_device_name();
    for name in output::list_output_devices()? {
        let marker = if default.as_ref() == Some(&name) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn play(config: &AppConfig, input: Input) -> Result<()> {
    info!("Starting Strand v{}", env!("CARGO_PKG_VERSION"));

    let source: Box<dyn PcmSource> = match input {
        Input::File(path) => {
            let file = FileSource::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            info!(
                "Opened {}: {} channels at {} Hz, {}",
                path.display(),
                file.channels(),
                file.sample_rate(),
                file.duration()
                    .map_or_else(|| "unknown length".to_string(), |d| format!("{d:.1} s"))
            );
            Box::new(file)
        }
        Input::Tone => Box::new(Tone::new(config.sample_rate, TONE_FREQUENCY, TONE_SECONDS)),
    };
    let sample_rate = source.sample_rate();
    info!(
        "Encoding with {} ({}) at {sample_rate} Hz, {} bps",
        config.codec,
        if config.codec.is_lossy() { "lossy" } else { "lossless" },
        config.bit_rate
    );

    let pool = Arc::new(BufferPool::new(config.pool_size));
    let (tx, rx) = crossbeam_channel::bounded(CHANNEL_DEPTH);
    let spec = PipelineSpec {
        codec: config.codec,
        sample_rate,
        bit_rate: config.bit_rate,
    };
    let worker = pipeline::spawn(source, spec, Arc::clone(&pool), tx)?;

    let backend = match &config.output_device {
        Some(name) => CpalBackend::with_device_name(name),
        None => CpalBackend::new(),
    };
    let mut player = AudioPlayer::new(Box::new(backend));
    player.initialize(sample_rate, config.min_buffer_size, config.max_buffer_size)?;
    player.play()?;

    let mut stalled = false;
    for mut block in &rx {
        let delivered = queue_all(&player, &mut block, STALL_LIMIT);
        pool.free_buffer(block);
        if !delivered {
            warn!("Output stalled, stopping playback");
            stalled = true;
            break;
        }
    }
    // Unblocks a worker waiting on a full channel.
    drop(rx);

    let stats = worker
        .join()
        .map_err(|_| anyhow!("pipeline thread panicked"))?
        .map_err(|e| {
            if e.is_configuration() {
                anyhow!("{e}: {} cannot encode at {sample_rate} Hz", config.codec)
            } else {
                e.into()
            }
        })?;
    debug!("Pipeline stats: {stats:?}");

    if !stalled {
        wait_for_drain(&player, sample_rate, config.min_buffer_size);
    }
    let underruns = player.underruns();
    if underruns > 0 {
        warn!("Output ran dry {underruns} times during playback");
    }
    player.stop();
    player.deinitialize();
    info!("Playback finished");
    Ok(())
}

/// Queue the whole of `block`, waiting while the ring is full.
///
/// Returns `false` when the player is closed or the ring accepts nothing for
/// `stall_limit`; whatever was not queued is left in `block`.
fn queue_all(player: &AudioPlayer, block: &mut ByteBuffer, stall_limit: Duration) -> bool {
    let mut last_progress = Instant::now();
    loop {
        let accepted = player.queue_data(block);
        let remaining = block.used_size() - accepted;
        if remaining == 0 {
            return true;
        }
        if accepted == 0 {
            if !player.is_initialized() {
                warn!("Player closed, dropping {remaining} bytes");
                return false;
            }
            if last_progress.elapsed() >= stall_limit {
                warn!("Ring not drained for {stall_limit:?}, dropping {remaining} bytes");
                return false;
            }
        } else {
            last_progress = Instant::now();
            block.storage_mut().copy_within(accepted..accepted + remaining, 0);
            if block.set_used_size(remaining).is_err() {
                return false;
            }
        }
        std::thread::sleep(BACKPRESSURE_WAIT);
    }
}

/// Block until the ring has played out, plus one device buffer.
fn wait_for_drain(player: &AudioPlayer, sample_rate: u32, device_frames: usize) {
    let bytes_per_second = f64::from(sample_rate) * (CHANNELS * INPUT_BYTES_PER_SAMPLE) as f64;
    let device_buffer = Duration::from_secs_f64(device_frames as f64 / f64::from(sample_rate));
    let limit = Duration::from_secs_f64(player.buffered_bytes() as f64 / bytes_per_second)
        + device_buffer
        + Duration::from_secs(1);

    let started = Instant::now();
    while player.buffered_bytes() > 0 {
        if started.elapsed() > limit {
            warn!(
                "Output stalled with {} bytes queued",
                player.buffered_bytes()
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(device_buffer);
}
