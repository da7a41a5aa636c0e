//! camstream - camera capture with MJPEG/snapshot/status HTTP endpoints

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camstream::relay::Relay;
use camstream::{app, Config};

#[derive(Parser)]
#[command(name = "camstream", version, about = "Camera capture and HTTP streaming service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Mode>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Mode {
    /// Capture in-process and serve /stream, /frame and /status (default)
    Serve(ServeArgs),
    /// Delegate capture to ffmpeg and a streaming server, supervising both
    Relay(ServeArgs),
}

#[derive(Args, Clone)]
struct ServeArgs {
    /// Configuration file (JSON, YAML or TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera index, device path, `auto`, `testsrc` or a video file
    #[arg(long)]
    camera: Option<String>,
    /// HTTP server port
    #[arg(long)]
    port: Option<u16>,
    /// Frame output directory
    #[arg(long)]
    frame_dir: Option<PathBuf>,
    /// Frames persisted per second
    #[arg(long)]
    frame_fps: Option<u32>,
}

impl ServeArgs {
    fn load(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(camera) = &self.camera {
            config.capture.camera = camera.clone();
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(dir) = &self.frame_dir {
            config.output.frame_dir = dir.clone();
        }
        if let Some(fps) = self.frame_fps {
            config.output.frame_fps = fps;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("camstream=info,tower_http=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Mode::Relay(args)) => run_relay(args.load()?).await,
        Some(Mode::Serve(args)) => run_serve(args.load()?).await,
        None => run_serve(cli.serve.load()?).await,
    }
}

async fn run_serve(config: Config) -> Result<()> {
    info!("camstream {} starting", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", serde_json::to_string(&config)?);
    app::run(config).await
}

async fn run_relay(config: Config) -> Result<()> {
    info!("camstream {} starting in relay mode", env!("CARGO_PKG_VERSION"));
    let relay = Relay::new(config)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = app::shutdown_signal().await {
            error!("Failed to install signal handlers: {}", e);
        }
        signal_cancel.cancel();
    });

    relay.run(cancel).await?;
    info!("Relay stopped");
    Ok(())
}
