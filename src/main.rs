/*
 *  main.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use tokio::sync::mpsc;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

mod backlight;
mod clock;
mod config;
mod controller;
mod dedup;
mod deutils;
mod display;
mod playback;
mod transport;

use crate::backlight::BacklightTimeoutController;
use crate::config::Cli;
use crate::controller::Controller;
use crate::dedup::StateDeduplicator;
use crate::display::{
    BackgroundImageCache, DisplayCompositor, DisplayGeometry, HttpArtworkFetcher, OverlayRenderer,
};
use crate::transport::PushClient;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> Result<(), std::io::Error> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating shutdown.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli).context("loading configuration")?;

    if cli.dump_config {
        println!("{}", config::dump(&cfg)?);
        return Ok(());
    }

    let level = if cli.debug { "debug" } else { cfg.log_level.as_deref().unwrap_or("info") };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - now playing, on the glass", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    // output first: its resolution drives everything else
    let (width, height) = cfg.display_size();
    let sink = display::open_sink(cfg.device(), width, height)
        .with_context(|| format!("opening output {}", cfg.device()))?;
    let (width, height) = sink.dimensions();
    let geometry = DisplayGeometry::for_resolution(width, height);
    info!("Display {}x{} via {}", width, height, sink.name());

    let overlay = OverlayRenderer::from_font_file(cfg.font(), geometry, cfg.rotate_overlay())
        .with_context(|| format!("loading font {}", cfg.font().display()))?;

    let fetcher = HttpArtworkFetcher::new(cfg.host(), cfg.port(), cfg.artwork_timeout())
        .context("building artwork client")?;
    let (retry_base, retry_max) = cfg.artwork_retry();
    let backgrounds = BackgroundImageCache::new(fetcher, cfg.placeholder_art(), retry_base, retry_max);

    let line = backlight::detect(cfg.backlight_pin(), cfg.backlight_sysfs());
    let backlight = BacklightTimeoutController::new(line, cfg.backlight_timeout_ticks());

    let mut controller = Controller::new(
        backlight,
        backgrounds,
        overlay,
        DisplayCompositor::new(sink),
        StateDeduplicator::new(cfg.max_jitter_ms()),
    );

    let client = PushClient::new(cfg.host(), cfg.port()).context("building push client")?;
    let (tx, rx) = mpsc::channel(32);
    info!("Listening to {}:{}", cfg.host(), cfg.port());
    let transport = tokio::spawn(client.run(tx));

    let shutdown = async {
        if let Err(e) = signal_handler().await {
            error!("Signal handlers unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    controller.run(rx, shutdown).await;

    transport.abort();
    info!("{} stopped", env!("CARGO_PKG_NAME"));
    Ok(())
}
