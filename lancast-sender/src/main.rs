//! lancast sender: entry point.
//!
//! ```text
//! lancast-sender                     Broadcast with lancast-sender.toml
//! lancast-sender --config <path>     Load a custom config TOML
//! lancast-sender --gen-config        Write default config to stdout
//! lancast-sender --source camera     Start on the camera
//! lancast-sender --audio             Stream the microphone from the start
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lancast_core::audio::{AudioFormat, AudioInput, ToneGenerator};
use lancast_core::bandwidth::BandwidthAggregator;
use lancast_core::capture::{CameraBackend, NoCamera, SourceKind, TestCamera, TestPattern};
use lancast_core::codec::ZstdCodec;
use lancast_core::session::{AudioOpener, Broadcaster};

use lancast_sender::config::SenderConfig;
use lancast_sender::console::{Command, parse_command, stdin_lines};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lancast-sender", about = "Broadcast screen, camera and microphone over the LAN")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lancast-sender.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the broadcast address.
    #[arg(long)]
    broadcast: Option<String>,

    /// Override the initial video source ("screen" or "camera").
    #[arg(long)]
    source: Option<SourceKind>,

    /// Enable microphone streaming at startup.
    #[arg(long)]
    audio: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = SenderConfig::load(&cli.config);
    if let Some(addr) = cli.broadcast {
        config.network.broadcast_address = addr;
    }
    if let Some(source) = cli.source {
        config.video.initial_source = source;
    }
    if cli.audio {
        config.audio.enabled = true;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    origin.log(&cli.config);

    config.validate()?;

    info!("lancast-sender v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "broadcasting to {} (video {}, audio {})",
        config.network.broadcast_address, config.network.video_port, config.network.audio_port
    );
    info!("initial source: {}", config.video.initial_source);

    if config.capture.camera == "none" {
        run(config, NoCamera).await
    } else {
        let camera = TestCamera::new(config.capture.camera_width, config.capture.camera_height);
        run(config, camera).await
    }
}

async fn run<B: CameraBackend>(
    config: SenderConfig,
    camera: B,
) -> Result<(), Box<dyn std::error::Error>> {
    let codec = Arc::new(ZstdCodec::with_level(config.video.compression_level));
    let bandwidth = Arc::new(BandwidthAggregator::new(config.stats.history_size));

    let tone_hz = config.audio.tone_hz;
    let open_audio: AudioOpener = Arc::new(
        move |format: AudioFormat| -> lancast_core::Result<Box<dyn AudioInput>> {
            Ok(Box::new(ToneGenerator::new(format, tone_hz)))
        },
    );

    let screen = TestPattern::new(config.capture.screen_width, config.capture.screen_height);
    let broadcaster = Broadcaster::start(
        screen,
        camera,
        open_audio,
        codec,
        config.broadcast()?,
        Arc::clone(&bandwidth),
    )
    .await?;

    let cancel = CancellationToken::new();
    let stats_task = config.stats.enabled.then(|| {
        bandwidth.spawn(
            Duration::from_millis(config.stats.interval_ms),
            cancel.clone(),
            |sample| info!("outgoing {sample}"),
        )
    });

    // Ctrl-C handler.
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping broadcast");
        ctrl_c.cancel();
    });

    info!("commands: screen | camera | audio on | audio off | status | quit");
    let mut lines = stdin_lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            // stdin closed; keep broadcasting until Ctrl-C.
            cancel.cancelled().await;
            break;
        };

        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Source(kind))) => {
                if !broadcaster.select_source(kind) {
                    warn!("camera unavailable, staying on the screen");
                }
            }
            Ok(Some(Command::Audio(on))) => {
                if let Err(e) = broadcaster.set_audio_enabled(on).await {
                    warn!("could not enable audio: {e}");
                }
            }
            Ok(Some(Command::Status)) => {
                let latest = bandwidth
                    .snapshot()
                    .latest
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "no samples yet".into());
                info!(
                    "source: {}, audio: {}, {latest}",
                    broadcaster.selection(),
                    if broadcaster.audio_enabled().await { "on" } else { "off" }
                );
            }
            Ok(Some(Command::Quit)) => break,
            Err(e) => warn!("{e}"),
        }
    }

    cancel.cancel();
    let stats = broadcaster.stop().await?;
    if let Some(task) = stats_task {
        let _ = task.await;
    }
    info!(
        "sent {} frames in {} chunks ({} send failures, {} camera fallbacks)",
        stats.frames_sent, stats.chunks_sent, stats.send_failures, stats.fallbacks
    );
    Ok(())
}
