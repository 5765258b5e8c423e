//! # engine_app
//!
//! Frame-loop demo for the storage core. It registers a small component
//! catalog, spawns entity batches from configuration, and runs per-frame
//! systems. Component updates go through queries; expiry then walks the
//! live entity handles to find what to destroy.
//!
//! ## Startup Sequence
//!
//! 1. Load the JSON config (if given) and apply command-line overrides.
//! 2. Apply the `ENGINE_PAGE_CAPACITY` environment override.
//! 3. Build the world and spawn every configured batch.
//! 4. Run the fixed-timestep loop, then log pool occupancy.

mod components;
mod config;
mod spawn;
mod tick;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use engine_storage::{PAGE_CAPACITY_ENV, StorageConfig, World};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use tick::TickLoop;

#[derive(Parser)]
#[command(name = "engine_app", about = "Frame-loop demo for the engine storage core")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to run (0 runs until interrupted)
    #[arg(short, long)]
    frames: Option<u64>,

    /// Records per pool page
    #[arg(short, long)]
    page_capacity: Option<u32>,

    /// Target frames per second
    #[arg(short, long)]
    tick_rate: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        page_capacity = config.storage.page_capacity,
        tick_rate = config.tick.tick_rate,
        frames = config.tick.max_ticks,
        batches = config.spawns.len(),
        "engine starting"
    );

    let world = World::with_config(components::catalog()?, config.storage)?;
    let mut tick_loop = TickLoop::new(config.tick, world);
    for batch in &config.spawns {
        spawn::spawn_batch(tick_loop.world_mut(), batch)?;
    }

    tick_loop.run();
    tick_loop.log_pool_stats();
    if let Some(centroid) = tick_loop.centroid() {
        info!(?centroid, "final transform centroid");
    }

    info!(entities = tick_loop.world().entity_count(), "engine shut down");
    Ok(())
}

/// Merge file, environment, and flag settings, in increasing precedence.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if std::env::var_os(PAGE_CAPACITY_ENV).is_some() {
        config.storage = StorageConfig::from_env()?;
    }
    if let Some(page_capacity) = args.page_capacity {
        config.storage = config.storage.with_page_capacity(page_capacity);
    }
    if let Some(frames) = args.frames {
        config.tick.max_ticks = frames;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick.tick_rate = tick_rate;
    }

    config.storage.validate()?;
    anyhow::ensure!(
        config.tick.tick_rate > 0.0,
        "tick rate must be positive, got {}",
        config.tick.tick_rate
    );
    Ok(config)
}
