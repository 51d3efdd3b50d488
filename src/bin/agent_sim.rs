// src/bin/agent_sim.rs

use agent_market_sim::engine::{Collaborators, ControlResponse, SimulationEngine, handle_line};
use agent_market_sim::external::{FixedOracle, GbmOracle, InMemoryStore, PriceOracle, SimulatedFaucet, TemplateGenerator};
use agent_market_sim::{GBMSimulator, RunStatus, SimConfig, StatusSnapshot, logging};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, interval};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-sim")]
#[command(about = "Headless agent trading simulation against a constant-product pool")]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long, env = "AMS_CONFIG")]
    config: Option<PathBuf>,

    /// Number of agents to seed
    #[arg(short, long)]
    agents: Option<usize>,

    /// Stop after this many ticks
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Stop after this many seconds of wall time
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Speed multiplier in (0, 10]
    #[arg(short, long)]
    speed: Option<f64>,

    /// Phase length in milliseconds at 1x
    #[arg(long)]
    phase_ms: Option<u64>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Store snapshot loaded at start and written on exit
    #[arg(long, env = "AMS_STATE_FILE")]
    state: Option<PathBuf>,

    /// Drive the oracle with a random walk of this annual volatility
    #[arg(long)]
    oracle_volatility: Option<f64>,

    /// Status line interval in milliseconds
    #[arg(long, default_value = "2000")]
    status_every_ms: u64,

    /// Read JSON control commands from stdin, one per line
    #[arg(short, long, default_value = "false")]
    interactive: bool,

    #[arg(long, env = "AMS_LOG", default_value = "info")]
    log_level: String,
}

fn build_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SimConfig::default(),
    };
    config.apply_env().context("applying AMS_* overrides")?;
    if let Some(n) = args.agents {
        config.agent_count = n;
    }
    if let Some(speed) = args.speed {
        config.speed_multiplier = speed;
    }
    if let Some(ms) = args.phase_ms {
        config.phase_duration_ms = ms;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_status(s: &StatusSnapshot) {
    println!(
        "[Sim] tick {:>5} | {:<15} {:>5.1}% | price {:.8} SOL | trades {:>5} | msgs {:>5} | errors {:>3} | mood +{:.2}/-{:.2}{}",
        s.tick,
        s.phase.to_string(),
        s.phase_progress * 100.0,
        s.price,
        s.counters.trades,
        s.counters.messages,
        s.counters.errors,
        s.sentiment.bullish,
        s.sentiment.bearish,
        if s.amm_halted { " | AMM HALTED" } else { "" },
    );
}

fn print_response(resp: &ControlResponse) {
    match serde_json::to_string(resp) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "response not printable"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;
    let config = build_config(&args)?;

    let store = Arc::new(match &args.state {
        Some(path) => InMemoryStore::open(path)
            .with_context(|| format!("loading state {}", path.display()))?,
        None => InMemoryStore::new(),
    });
    let oracle: Arc<dyn PriceOracle> = match args.oracle_volatility {
        Some(vol) => {
            let walk = GBMSimulator::new(config.market.initial_price, 0.0, vol, config.seed)?;
            Arc::new(GbmOracle::new(config.token.symbol.clone(), walk))
        }
        None => Arc::new(FixedOracle::new()),
    };
    let collab = Collaborators {
        store: store.clone(),
        generator: Arc::new(TemplateGenerator::new()),
        oracle,
        faucet: Arc::new(SimulatedFaucet::unlimited()),
    };

    println!("=== Agent Market Simulator ===");
    println!(
        "[Main] {} agents, phase {}ms at {}x, token {}",
        config.agent_count,
        config.phase_duration_ms,
        config.speed_multiplier,
        config.token.cashtag()
    );

    let engine = SimulationEngine::new(config.clone(), collab).await?;
    if !args.interactive {
        let run_id = engine.start(config).await?;
        info!(run_id, "headless run started");
    } else {
        println!("[Main] Interactive: send JSON commands, e.g. {{\"action\":\"start\"}}");
    }

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = interval(Duration::from_millis(args.status_every_ms.max(100)));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = args.interactive;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = engine.status();
                if status.status == RunStatus::Running {
                    print_status(&status);
                }
                if args.ticks.is_some_and(|limit| status.counters.ticks >= limit) {
                    println!("[Main] Tick limit reached");
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    println!("[Main] Duration elapsed");
                    break;
                }
                if !args.interactive && status.status == RunStatus::Stopped {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => print_response(&handle_line(&engine, &line).await),
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "stdin closed");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[Main] Interrupted");
                break;
            }
        }
    }

    engine.stop().await?;
    print_status(&engine.status());
    if let Some(path) = &args.state {
        store
            .save_snapshot(path)
            .with_context(|| format!("writing state {}", path.display()))?;
        println!("[Main] State saved to {}", path.display());
    }
    Ok(())
}
