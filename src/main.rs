mod assets;
mod camera;
mod config;
mod control;
mod driver;
mod leader;
mod net;
mod obstacles;
mod physics;
mod racer;
mod session;
mod state;
mod track;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::assets::load_track_assets;
use crate::config::RaceConfig;
use crate::control::FollowControl;
use crate::session::RaceSession;
use crate::state::{ServerMessage, SpectatorRegistry};

#[derive(Debug, Parser)]
#[command(
    name = "marble-race-server",
    about = "Marble race simulation with a leader-following camera"
)]
struct Args {
    /// TOML config; built-in defaults when the file is absent
    #[arg(long, default_value = "config/race.toml")]
    config: PathBuf,

    /// Track manifest, overrides server.track
    #[arg(long)]
    track: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting marble race server");

    let mut config = RaceConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(track) = args.track {
        config.server.track = track;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // Load phase: nothing ticks until the assets are complete.
    let assets = load_track_assets(&config.server.track)
        .await
        .with_context(|| format!("loading track {}", config.server.track.display()))?;

    let control = Arc::new(FollowControl::new());
    let session = Arc::new(Mutex::new(RaceSession::new(&config, &assets, Arc::clone(&control))));
    let spectators = Arc::new(Mutex::new(SpectatorRegistry::new()));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!("WebSocket listening on ws://{}", config.server.bind);

    tokio::spawn(net::serve(
        listener,
        Arc::clone(&spectators),
        Arc::clone(&control),
    ));

    session.lock().await.start();

    // Fixed timestep
    let dt = config.server.tick_dt();
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        let snapshot = {
            let mut race = session.lock().await;
            race.tick(dt, started.elapsed());
            race.snapshot()
        };
        let tick = snapshot.tick;

        spectators
            .lock()
            .await
            .broadcast(&ServerMessage::Snapshot(snapshot));

        if args.ticks.is_some_and(|limit| tick >= limit) {
            info!("Reached {tick} ticks, exiting");
            break;
        }
    }

    session.lock().await.stop();
    Ok(())
}
