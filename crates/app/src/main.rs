//! framepace - Main Entry Point
//!
//! Opens a window and draws a spinning quad through the frame pacing engine,
//! rebuilding the swapchain whenever the window is resized or minimized.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use framepace_core::{RendererConfig, Timer};
use framepace_platform::{ResizeSignal, WinitHost};
use framepace_renderer::{FrameReport, Renderer, RendererError};

/// How often the frame rate is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Frame-paced Vulkan demo.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Initial window width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Window title.
    #[arg(long)]
    title: Option<String>,

    /// Enable the Vulkan validation layers.
    #[arg(long, overrides_with = "no_validation")]
    validation: bool,

    /// Disable the Vulkan validation layers.
    #[arg(long, overrides_with = "validation")]
    no_validation: bool,

    /// Stop after this many presented frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,
}

impl Args {
    /// Loads the configuration file, if any, and applies command-line overrides on top.
    fn into_config(self) -> Result<RendererConfig> {
        let mut config = match &self.config {
            Some(path) => RendererConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RendererConfig::default(),
        };

        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if let Some(title) = self.title {
            config.window.title = title;
        }
        if self.validation {
            config.vulkan.validation = true;
        } else if self.no_validation {
            config.vulkan.validation = false;
        }
        if self.max_frames.is_some() {
            config.run.max_frames = self.max_frames;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    framepace_core::init_logging(&config.logging.filter);
    info!("Starting framepace");

    // The renderer is dropped inside run, so teardown finishes before a
    // failure reaches the exit status.
    run(&config).inspect_err(|e| error!("Fatal: {:#}", e))
}

fn run(config: &RendererConfig) -> Result<()> {
    let resize = ResizeSignal::new();
    let mut host = WinitHost::new(config.window.clone(), resize.clone())
        .context("failed to create the event loop")?;

    let window = host.wait_for_window().context("failed to open the window")?;
    let mut renderer =
        Renderer::new(window, config, resize).context("failed to initialize the renderer")?;
    info!("Initialization complete, entering main loop");

    let result = frame_loop(&mut host, &mut renderer, config.run.max_frames);
    let drained = renderer.shutdown().context("failed to drain the device");

    result?;
    drained
}

fn frame_loop(host: &mut WinitHost, renderer: &mut Renderer, max_frames: Option<u64>) -> Result<()> {
    let mut timer = Timer::new();

    while host.pump().context("window event processing failed")? {
        let report = match renderer.run_frame(host) {
            Ok(report) => report,
            Err(RendererError::HostClosed) => {
                info!("Window closed while minimized");
                break;
            }
            Err(e) => return Err(e).context("frame failed"),
        };
        if report == FrameReport::Skipped {
            continue;
        }

        if let Some(fps) = timer.frame(STATS_INTERVAL) {
            let extent = renderer.extent();
            info!(
                "{:.1} fps at {}x{} ({} frames)",
                fps,
                extent.width,
                extent.height,
                timer.total_frames()
            );
        }

        if max_frames.is_some_and(|limit| timer.total_frames() >= limit) {
            info!("Reached frame limit of {}", timer.total_frames());
            break;
        }
    }

    if host.close_requested() {
        info!("Close requested, shutting down");
    }
    Ok(())
}
