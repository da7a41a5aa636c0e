//! In-process service wiring: capture, writer, retention and HTTP tasks

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::capture::{open_source, FrameSource};
use crate::pipeline::retention::count_frames;
use crate::pipeline::{CaptureLoop, Context, FrameWriter, RetentionSweep};
use crate::server::{self, AppState};
use crate::Config;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Run the camera service until a termination signal arrives.
///
/// Camera, port and output-directory failures at startup are returned as
/// errors; everything after startup is handled inside the tasks.
pub async fn run(config: Config) -> Result<()> {
    let ctx = Context::new(config);
    let config = Arc::clone(&ctx.config);

    let mut source = open_source(&config.capture).await?;
    let source = tokio::task::spawn_blocking(move || source.open().map(|()| source))
        .await?
        .wrap_err("Failed to initialize camera")?;

    let addr = format!("{}:{}", config.http.bind, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {addr}"))?;

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(CaptureLoop::new(source, Arc::clone(&ctx)).run(cancel.clone()));

    if config.output.write_frames {
        let writer = FrameWriter::new(Arc::clone(&ctx)).await.wrap_err_with(|| {
            format!("Failed to prepare frame directory {}", config.output.frame_dir.display())
        })?;
        tracker.spawn(writer.run(cancel.clone()));
    } else {
        info!("Frame writer disabled");
    }

    if config.retention.enabled {
        let sweep = RetentionSweep::new(
            config.output.frame_dir.clone(),
            config.output.format.extension(),
            config.retention.max_files,
            Duration::from_secs(config.retention.interval_secs),
        );
        tracker.spawn(sweep.run(cancel.clone()));
    } else if config.output.write_frames {
        info!("Retention disabled - frames will accumulate");
    }

    let state = AppState::new(Arc::clone(&ctx), cancel.clone());
    let mut http = tracker.spawn(server::serve(listener, state));
    tracker.close();

    let outcome = tokio::select! {
        res = shutdown_signal() => {
            res.wrap_err("Failed to install signal handlers")?;
            info!("Shutting down...");
            Ok(())
        }
        res = &mut http => match res {
            Ok(Ok(())) => Err(eyre!("HTTP server exited unexpectedly")),
            Ok(Err(e)) => Err(e).wrap_err("HTTP server failed"),
            Err(e) => Err(e).wrap_err("HTTP server task panicked"),
        },
    };

    cancel.cancel();
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
        warn!("Shutdown timed out after {:?}", DRAIN_TIMEOUT);
    }

    let (dir, ext) = (config.output.frame_dir.clone(), config.output.format.extension());
    let on_disk = tokio::task::spawn_blocking(move || count_frames(&dir, ext))
        .await
        .unwrap_or(0);
    info!(
        "Final: {} frames captured, {} written, {} files on disk",
        ctx.stats.frames_captured(),
        ctx.writer.frames_written(),
        on_disk
    );
    outcome
}
