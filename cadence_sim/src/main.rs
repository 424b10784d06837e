//! Cadence continuous simulation CLI
//!
//! Runs the time-accelerated business-event simulation against a logging
//! sink and prints periodic status snapshots.

use async_trait::async_trait;
use cadence_core::dispatch::DispatchConfig;
use cadence_env::{
    DeliveryError, DeliveryReceipt, EngineContext, EventDescriptor, EventSink, TokioContext,
};
use cadence_sim::{EngineConfig, OrchestratorConfig, SimulationEngine};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sink that logs each delivered batch instead of transmitting it.
struct LoggingSink {
    ctx: Arc<TokioContext>,
}

#[async_trait]
impl EventSink for LoggingSink {
    async fn deliver(&self, event: &EventDescriptor) -> Result<DeliveryReceipt, DeliveryError> {
        debug!(
            priority = %event.priority,
            category = %event.category,
            count = event.target_count,
            day = event.sim_day,
            hour = event.sim_hour,
            "delivering event batch"
        );
        Ok(DeliveryReceipt::new(self.ctx.now().as_millis() as u64))
    }
}

/// Cadence accelerated business simulation CLI
#[derive(Parser, Debug)]
#[command(name = "cadence-sim")]
#[command(about = "Run the continuous accelerated business-event simulation", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = derive from system time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Initial speed level (1..=6 with the default table)
    #[arg(short, long, default_value = "4")]
    level: u8,

    /// Per-minute dispatch ceiling
    #[arg(long, default_value = "30")]
    per_minute: u32,

    /// Per-hour dispatch ceiling
    #[arg(long, default_value = "600")]
    per_hour: u32,

    /// Run duration in seconds (0 = run until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Seconds between status lines
    #[arg(long, default_value = "10")]
    status_interval: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit status snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Determine the seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if !args.json {
        info!("Cadence Simulator v0.1.0");
        info!(seed, level = args.level, "starting continuous simulation");
    }

    let ctx = TokioContext::shared(seed);
    let sink = Arc::new(LoggingSink {
        ctx: Arc::clone(&ctx),
    });

    let config = EngineConfig {
        dispatch: DispatchConfig {
            per_minute: args.per_minute,
            per_hour: args.per_hour,
            ..DispatchConfig::default()
        },
        orchestrator: OrchestratorConfig {
            default_level: args.level,
            ..OrchestratorConfig::default()
        },
        ..EngineConfig::default()
    };

    let engine = match SimulationEngine::new(Arc::clone(&ctx), sink, config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    if !engine.set_speed_level(args.level) {
        error!(level = args.level, "invalid speed level");
        std::process::exit(1);
    }

    engine.start_continuous();

    let deadline = (args.duration > 0).then(|| ctx.now() + Duration::from_secs(args.duration));
    let interval = Duration::from_secs(args.status_interval.max(1));

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let status = engine.status();
                if args.json {
                    match serde_json::to_string(&status) {
                        Ok(line) => println!("{}", line),
                        Err(err) => error!(error = %err, "status serialization failed"),
                    }
                } else {
                    info!(
                        cycle = status.cycle_number,
                        day = status.sim_day,
                        hour = status.sim_hour,
                        level = status.speed_level,
                        running = status.running,
                        issues = status.active_issue_count,
                        queue = status.queue_depth,
                        rate_min = status.recent_rate_minute,
                        rate_hour = status.recent_rate_hour,
                        health = status.health_score,
                        "status"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
        if let Some(deadline) = deadline {
            if ctx.now() >= deadline {
                info!("run duration reached");
                break;
            }
        }
    }

    engine.stop_continuous();
    engine.shutdown();

    let status = engine.status();
    if args.json {
        let summary = serde_json::json!({
            "final_status": status,
            "workers": engine.monitor().snapshot(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(err) => error!(error = %err, "summary serialization failed"),
        }
    } else {
        info!(
            cycles = status.cycle_number,
            delivered = status.delivery.delivered,
            retries = status.delivery.retries,
            dropped = status.delivery.dropped,
            health = status.health_score,
            "simulation finished"
        );
    }
}
