use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use segway_tuner::config::load_config;
use segway_tuner::control::BalanceLoop;
use segway_tuner::metrics::TuningMetrics;
use segway_tuner::runner::{EpisodeRunner, Mode};
use segway_tuner::session::channel::{ChannelSession, SimChannels};
use segway_tuner::sim::spawn_simulator;
use segway_tuner::tuner::CancelToken;

#[derive(Parser, Debug)]
#[command(about = "Balance a simulated segway with PID and tune its gains with Twiddle")]
struct Cli {
    /// Run a single episode with the given gains instead of tuning
    #[arg(short = 'o', long)]
    one_shot: bool,

    /// PID gains: KP KI KD
    #[arg(short, long, num_args = 3, value_names = ["KP", "KI", "KD"], allow_negative_numbers = true)]
    params: Option<Vec<f64>>,

    /// Twiddle gain deltas: dKP dKI dKD (default 0.8 x params)
    #[arg(short, long, num_args = 3, value_names = ["DKP", "DKI", "DKD"])]
    deltas: Option<Vec<f64>>,

    #[arg(short, long, default_value = "config/segway.toml")]
    config: PathBuf,

    /// Stop once the deltas sum below this
    #[arg(long)]
    tolerance: Option<f64>,

    #[arg(long)]
    max_evaluations: Option<u64>,
}

/// Trip `cancel` on the first Ctrl-C; a second one exits immediately.
fn spawn_interrupt_watcher(cancel: CancelToken) -> std::io::Result<()> {
    thread::Builder::new()
        .name("interrupt-watcher".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(error = %e, "Ctrl-C handling unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current episode");
                    cancel.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(tolerance) = cli.tolerance {
        config.twiddle.tolerance = tolerance;
    }
    if cli.max_evaluations.is_some() {
        config.twiddle.max_evaluations = cli.max_evaluations;
    }
    config.validate()?;

    let params = cli.params.unwrap_or_else(|| config.pid.params.to_vec());
    let deltas = cli.deltas.or_else(|| config.pid.deltas.map(|d| d.to_vec()));

    println!("===========================================");
    println!("Starting Segway PID Tuner");
    println!("===========================================\n");

    // Simulator on its own thread, reached only through the session
    let channels = SimChannels::new(config.session.channel_capacity);
    let (sim_handle, sim_stats) = spawn_simulator(
        config.plant.clone(),
        config.session.objects.clone(),
        channels.clone(),
    );
    let session = ChannelSession::connect(&channels, config.session.timeout());
    drop(channels);

    let cancel = CancelToken::new();
    spawn_interrupt_watcher(cancel.clone()).context("starting interrupt watcher")?;

    let metrics = TuningMetrics::new();
    let mut runner = EpisodeRunner::new(
        session,
        BalanceLoop::new(config.episode.clone(), metrics.clone()),
        config.runner.clone(),
        config.pid.controller(),
        metrics.clone(),
    );

    info!("halting pending simulations");
    runner.halt_pending().context("simulator unreachable")?;
    runner
        .setup(&config.session.objects)
        .context("resolving scene objects")?;

    let mode = if cli.one_shot {
        Mode::OneShot
    } else {
        Mode::Tune { deltas, settings: config.twiddle.clone() }
    };
    let outcome = runner.run(mode, params, &cancel);

    // Never leave a simulation running behind us
    if let Err(e) = runner.halt_pending() {
        warn!(error = %e, "final stop failed");
    }
    drop(runner);
    sim_stats.shutdown.store(true, Ordering::Relaxed);
    if sim_handle.join().is_err() {
        error!("simulator thread panicked");
    }

    let report = outcome?;
    println!("\n--- RESULTS ---");
    if let Some(reason) = &report.stop_reason {
        println!("Stopped: {:?} after {} evaluations", reason, report.evaluations);
    }
    println!("Best params (cost) #ms:");
    println!("{:?} ({}) #{}", report.parameters, report.cost, report.elapsed_ms);

    println!("\n=== Performance Metrics ===");
    println!("{}", metrics.report());
    println!(
        "Simulator: {} requests, {} ticks",
        sim_stats.requests.load(Ordering::Relaxed),
        sim_stats.ticks.load(Ordering::Relaxed)
    );
    Ok(())
}
