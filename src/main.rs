use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use brick_arena::config::SimulationConfig;
use brick_arena::error::Result;
use brick_arena::input::KeyEvent;
use brick_arena::net::start_websocket_server;
use brick_arena::simulation::Simulation;
use brick_arena::state::SharedServerState;

/// Brick arena driving sandbox server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON config file; missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket bind address, overrides the config.
    #[arg(long)]
    bind: Option<String>,

    /// Arena RNG seed, overrides the config.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(seed) = args.seed {
        config.arena.seed = seed;
    }

    info!("starting brick arena server");
    let tick = Duration::from_millis(config.server.tick_ms);
    let bind = config.server.bind.clone();

    let mut sim = match Simulation::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            error!(%err, "failed to build simulation");
            return Err(err);
        }
    };

    let state = Arc::new(Mutex::new(SharedServerState::new()));
    state.lock().await.layout = Some(serde_json::to_string(&sim.layout())?);

    // Start WebSocket server
    let (key_tx, mut key_rx) = mpsc::unbounded_channel::<KeyEvent>();
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(err) = start_websocket_server(bind, server_state, key_tx).await {
            error!(%err, "websocket server stopped");
        }
    });

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let wall_dt = now.duration_since(last).as_secs_f32();
        last = now;

        while let Ok(event) = key_rx.try_recv() {
            sim.handle_key(event);
        }

        let report = sim.frame(wall_dt);
        if report.resets > 0 {
            warn!(frame = report.frame, resets = report.resets, "bodies respawned");
        }

        let mut st = state.lock().await;
        st.frame = report.frame;
        if st.client_count() == 0 {
            continue;
        }
        match serde_json::to_string(&sim.snapshot()) {
            Ok(json) => st.broadcast(&json),
            Err(err) => warn!(%err, "snapshot serialization failed"),
        }
    }
}
