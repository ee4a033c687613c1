//! geosim CLI
//!
//! Run a seeded geocast scenario and print a summary.
//!
//! # Example
//!
//! ```bash
//! # Ten nodes on a line, twenty requests
//! geosim -n 10 --requests 20 --seed 42
//!
//! # 5x5 grid with distance-scaled delays and 10% loss
//! geosim -n 25 --columns 5 --delay-mode distance-scaled --loss 0.1
//! ```

use clap::{Parser, ValueEnum};
use geocast::{CancelPolicy, DelayMode, Duration, ForwarderConfig};
use geosim::ScenarioBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DelayModeArg {
    Uniform,
    DistanceScaled,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CancelPolicyArg {
    ProgressOrProximity,
    Projection,
}

/// geocast simulator
///
/// A consumer at one node requests content from a producer at another over a
/// shared broadcast medium. Reproducible for a given seed.
#[derive(Parser, Debug)]
#[command(name = "geosim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of nodes
    #[arg(short = 'n', long, default_value = "10")]
    nodes: usize,

    /// Lay nodes out in a grid with this many columns instead of a line
    #[arg(long)]
    columns: Option<usize>,

    /// Distance between neighboring nodes
    #[arg(long, default_value = "100")]
    spacing: f64,

    /// Radio range
    #[arg(short = 'r', long, default_value = "150")]
    range: f64,

    /// Per-receiver packet loss rate (0.0-1.0)
    #[arg(long, default_value = "0")]
    loss: f64,

    /// Random seed. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation duration in seconds
    #[arg(short = 'd', long, default_value = "30")]
    duration: u64,

    /// Number of requests the consumer issues
    #[arg(long, default_value = "20")]
    requests: u64,

    /// Milliseconds between requests
    #[arg(long, default_value = "500")]
    interval: u64,

    /// Consumer node
    #[arg(long, default_value = "0")]
    consumer: usize,

    /// Producer node (defaults to the last node)
    #[arg(long)]
    producer: Option<usize>,

    /// Minimum contention delay in milliseconds
    #[arg(long, default_value = "20")]
    min_delay: u64,

    /// Maximum contention delay in milliseconds
    #[arg(long, default_value = "100")]
    max_delay: u64,

    #[arg(long, value_enum, default_value = "uniform")]
    delay_mode: DelayModeArg,

    #[arg(long, value_enum, default_value = "progress-or-proximity")]
    cancel_policy: CancelPolicyArg,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,geosim=info")),
        )
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    let config = ForwarderConfig::default()
        .with_delay_bounds(
            Duration::from_millis(args.min_delay),
            Duration::from_millis(args.max_delay),
        )
        .with_delay_mode(match args.delay_mode {
            DelayModeArg::Uniform => DelayMode::Uniform,
            DelayModeArg::DistanceScaled => DelayMode::DistanceScaled,
        })
        .with_cancel_policy(match args.cancel_policy {
            CancelPolicyArg::ProgressOrProximity => CancelPolicy::ProgressOrProximity,
            CancelPolicyArg::Projection => CancelPolicy::Projection,
        });

    info!(
        nodes = args.nodes,
        columns = ?args.columns,
        range = args.range,
        loss = args.loss,
        seed,
        requests = args.requests,
        "Starting simulation"
    );

    let mut builder = ScenarioBuilder::new(args.nodes)
        .with_seed(seed)
        .with_spacing(args.spacing)
        .with_range(args.range)
        .with_loss_rate(args.loss)
        .with_config(config)
        .consumer(args.consumer)
        .with_requests(args.requests, Duration::from_millis(args.interval));
    if let Some(columns) = args.columns {
        builder = builder.grid(columns);
    }
    if let Some(producer) = args.producer {
        builder = builder.producer(producer);
    }

    let result = match builder.run_for(Duration::from_secs(args.duration)) {
        Ok(result) => result,
        Err(err) => {
            error!(%err, "invalid scenario");
            std::process::exit(2);
        }
    };

    let m = &result.metrics;
    let f = &result.forwarders;
    info!(
        issued = m.requests_issued,
        delivered = m.responses_delivered,
        ratio = %format_args!("{:.3}", result.delivery_ratio()),
        window_lost = result.window_lost,
        "Delivery"
    );
    info!(
        mean_ms = m.mean_latency().map(|d| d.as_millis()),
        max_ms = m.max_latency().map(|d| d.as_millis()),
        "Latency"
    );
    info!(
        sent = m.packets_sent,
        delivered = m.packets_delivered,
        dropped = m.packets_dropped,
        per_response = ?result.transmissions_per_delivery(),
        "Radio"
    );
    info!(
        scheduled = f.relays_scheduled,
        suppressed = f.relays_suppressed,
        canceled = f.relays_canceled,
        rejected = f.requests_rejected,
        responses_canceled = f.responses_canceled,
        expired = f.entries_expired,
        "Decisions"
    );
}
