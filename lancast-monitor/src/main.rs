//! lancast monitor: entry point.
//!
//! ```text
//! lancast-monitor                     Monitor with lancast-monitor.toml
//! lancast-monitor --config <path>     Load a custom config TOML
//! lancast-monitor --gen-config        Write default config to stdout
//! lancast-monitor --json              One JSON snapshot per interval
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lancast_core::bandwidth::{BandwidthAggregator, StreamKind};

use lancast_monitor::config::MonitorConfig;
use lancast_monitor::listener::{bind_shared, count_loop};
use lancast_monitor::render::status_line;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lancast-monitor", about = "Show lancast video and audio bandwidth")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lancast-monitor.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Print JSON snapshots instead of text lines.
    #[arg(long)]
    json: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&MonitorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = MonitorConfig::load(&cli.config);
    if cli.json {
        config.display.json = true;
    }

    // Logs go to stderr so stdout stays a clean stream of samples.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    origin.log(&cli.config);

    config.validate()?;
    info!("lancast-monitor v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl_c.cancel();
    });

    let aggregator = Arc::new(BandwidthAggregator::new(config.display.history_size));
    let mut listeners = Vec::new();
    for (name, kind, addr) in [
        ("video", StreamKind::Video, config.video_addr()?),
        ("audio", StreamKind::Audio, config.audio_addr()?),
    ] {
        let Some(socket) = bind_shared(name, addr) else {
            continue;
        };
        info!("counting {name} on {addr}");
        let counter = aggregator.counter(kind);
        listeners.push((name, tokio::spawn(count_loop(socket, counter, cancel.clone()))));
    }
    if listeners.is_empty() {
        return Err("no port could be bound".into());
    }

    let json = config.display.json;
    let trend = config.display.sparkline;
    let reader = Arc::clone(&aggregator);
    aggregator
        .run(config.interval(), cancel.clone(), move |sample| {
            if json {
                match serde_json::to_string(&reader.snapshot()) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("could not encode snapshot: {e}"),
                }
            } else if trend {
                let history = reader.total_history().to_vec();
                println!("{}", status_line(sample, Some(&history)));
            } else {
                println!("{}", status_line(sample, None));
            }
        })
        .await;

    for (name, handle) in listeners {
        match handle.await {
            Ok(Ok(count)) => info!("{name}: {count} datagrams"),
            Ok(Err(e)) => warn!("{name} listener stopped: {e}"),
            Err(e) => warn!("{name} listener panicked: {e}"),
        }
    }
    Ok(())
}
