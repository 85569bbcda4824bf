use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::sleep;

use server::api::{self, AppState};
use server::app::Application;
use server::config;
use server::records::RecordsStore;
use server::snapshot;

const DB_URL_ENV_NAME: &str = "GAME_DB_URL";
const LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the game config file
    #[clap(short = 'c', long, value_name = "file")]
    config_file: PathBuf,

    /// Root directory for static files
    #[clap(short = 'w', long, value_name = "dir")]
    www_root: PathBuf,

    /// Tick period in milliseconds; when absent the manual tick endpoint
    /// is enabled instead
    #[clap(short = 't', long, value_name = "milliseconds")]
    tick_period: Option<u64>,

    /// Spawn dogs at random road positions instead of the first road start
    #[clap(long)]
    randomize_spawn_points: bool,

    /// Path to the world state file to restore from and save to
    #[clap(short = 's', long, value_name = "file")]
    state_file: Option<PathBuf>,

    /// Automatic state save period in milliseconds
    #[clap(short = 'p', long, value_name = "milliseconds")]
    save_state_period: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info");
    }

    let args = Args::parse();
    match run(args).await {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!("fatal: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // World model from the config file.
    let game = config::load_game(&args.config_file)?;

    // The records store is the only external dependency; refusing to start
    // without it beats silently dropping leaderboard entries.
    let db_url = std::env::var(DB_URL_ENV_NAME)
        .map_err(|_| format!("{DB_URL_ENV_NAME} environment variable not found"))?;
    let worker_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let records = RecordsStore::connect(&db_url, worker_count as u32).await?;

    let manual_tick = args.tick_period.is_none();
    let mut app = Application::new(game, manual_tick, args.randomize_spawn_points)?;

    if let Some(state_file) = &args.state_file {
        snapshot::restore_application(&mut app, state_file)?;
        if let Some(save_period) = args.save_state_period {
            app.set_snapshot_listener(state_file.clone(), save_period);
        }
    }

    let state = Arc::new(AppState { app: Mutex::new(app), records });

    if let Some(tick_period) = args.tick_period {
        let tick_state = state.clone();
        tokio::spawn(async move {
            run_tick_loop(tick_state, Duration::from_millis(tick_period)).await;
        });
        info!("automatic tick every {tick_period} ms");
    } else {
        info!("manual tick endpoint enabled");
    }

    let router = api::router(state.clone(), args.www_root.clone());
    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    info!("listening on {LISTEN_ADDR}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final snapshot so a clean shutdown never loses progress.
    if let Some(state_file) = &args.state_file {
        let app = state.app.lock().await;
        app.save_snapshot(state_file)?;
        info!("final snapshot saved to {}", state_file.display());
    }

    Ok(())
}

/// Periodic tick driven by measured wall-clock deltas, so a late timer
/// does not slow the simulation down.
async fn run_tick_loop(state: Arc<AppState>, period: Duration) {
    let mut last_tick = Instant::now();

    loop {
        sleep(period).await;

        let now = Instant::now();
        let delta_ms = now.duration_since(last_tick).as_millis() as u64;
        last_tick = now;

        let retired = {
            let mut app = state.app.lock().await;
            match app.update_game_state(delta_ms) {
                Ok(retired) => retired,
                Err(error) => {
                    // A failing tick means the world can no longer be
                    // trusted or persisted; crashing is the safer option.
                    error!("tick failed: {error}");
                    std::process::exit(1);
                }
            }
        };

        for info in &retired {
            if let Err(error) = state.records.save(info).await {
                error!("failed to store retired player record: {error}");
            }
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
