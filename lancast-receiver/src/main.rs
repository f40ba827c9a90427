//! lancast receiver: entry point.
//!
//! ```text
//! lancast-receiver                     Receive with lancast-receiver.toml
//! lancast-receiver --config <path>     Load a custom config TOML
//! lancast-receiver --gen-config        Write default config to stdout
//! lancast-receiver --snapshot out.ppm  Keep the latest frame on disk
//! lancast-receiver --no-audio          Video only
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lancast_core::audio::{AudioReceiver, PacedPlayback};
use lancast_core::codec::ZstdCodec;
use lancast_core::session::ReceiverSession;
use lancast_core::task::LoopExit;
use lancast_core::transport::bind_receiver_addr;
use lancast_core::video::{FrameReceiver, RgbImageDecoder, display_channel, run_presenter};

use lancast_receiver::config::ReceiverConfig;
use lancast_receiver::presenter::SnapshotPresenter;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lancast-receiver", about = "Receive a lancast screen and audio broadcast")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lancast-receiver.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the latest frame to this PPM file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Do not receive audio.
    #[arg(long)]
    no_audio: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = ReceiverConfig::load(&cli.config);
    if let Some(path) = cli.snapshot {
        config.video.snapshot_path = path.display().to_string();
    }
    if cli.no_audio {
        config.audio.enabled = false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    origin.log(&cli.config);

    config.validate()?;
    info!("lancast-receiver v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, leaving the broadcast");
        ctrl_c.cancel();
    });

    let codec = Arc::new(ZstdCodec::new());
    let mut session = ReceiverSession::with_token(cancel);
    let mut presenter_task = None;

    if config.video.enabled {
        match bind_receiver_addr(config.video_addr()?, config.network.share_ports) {
            Ok(socket) => {
                let (publisher, frames) = display_channel();
                let receiver = FrameReceiver::new(
                    socket,
                    Arc::clone(&codec),
                    Arc::new(RgbImageDecoder),
                    publisher,
                )
                .with_max_frame_bytes(config.max_frame_bytes());
                session.spawn_video(receiver);

                let mut presenter =
                    SnapshotPresenter::new(config.snapshot_path(), config.video.snapshot_every);
                let token = session.cancel_token();
                presenter_task = Some(tokio::spawn(async move {
                    run_presenter(frames, &mut presenter, token).await;
                    presenter.finish().await;
                    presenter
                }));
            }
            Err(e) => error!("video disabled: {e}"),
        }
    }

    if config.audio.enabled {
        let format = config.audio.format;
        let output = match config.record_path() {
            Some(path) => PacedPlayback::recording(format, &path).await,
            None => Ok(PacedPlayback::new(format)),
        };
        let socket = bind_receiver_addr(config.audio_addr()?, config.network.share_ports);
        match (socket, output) {
            (Ok(socket), Ok(output)) => {
                session.spawn_audio(AudioReceiver::new(
                    socket,
                    Arc::clone(&codec),
                    Box::new(output),
                    format,
                ));
            }
            (Err(e), _) | (_, Err(e)) => error!("audio disabled: {e}"),
        }
    }

    if session.is_empty() {
        return Err("neither video nor audio could be started".into());
    }

    match session.wait().await {
        LoopExit::Closed => info!("sender closed the broadcast"),
        LoopExit::Cancelled => info!("receiver stopped"),
    }

    if let Some(task) = presenter_task {
        if let Ok(presenter) = task.await {
            info!(
                "{} frames shown, {} superseded before display",
                presenter.presented(),
                presenter.skipped()
            );
        }
    }
    Ok(())
}
