//! Command-line entry point: converts meeting schedule documents into schedule JSON.
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use meeting_grid::cache::FileStore;
use meeting_grid::config::Config;
use meeting_grid::oracle::gateway::CallPolicy;
use meeting_grid::oracle::gateway::Gateway;
use meeting_grid::oracle::gemini::GeminiOracle;
use meeting_grid::oracle::local::LocalOracle;
use meeting_grid::oracle::TextOracle;
use meeting_grid::pipeline;
use meeting_grid::pipeline::SupplementaryInput;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "meeting-grid")]
#[command(about = "Recovers a meeting timetable from schedule documents")]
#[command(version)]
struct Args {
    /// Authoritative schedule document (.docx)
    #[arg(short, long)]
    primary: PathBuf,

    /// Per-person schedule document as NAME=PATH, repeatable
    #[arg(short, long, value_name = "NAME=PATH")]
    supplementary: Vec<SupplementaryInput>,

    /// Output JSON file
    #[arg(short, long, default_value = "schedule.json")]
    output: PathBuf,

    /// Configuration file, defaults to ./meeting-grid.toml when present
    #[arg(short, long, env = "MEETING_GRID_CONFIG")]
    config: Option<PathBuf>,

    /// Use the deterministic local text service instead of the hosted model
    #[arg(long, env = "MEETING_GRID_OFFLINE")]
    offline: bool,

    /// Directory of memoized service answers
    #[arg(long, env = "MEETING_GRID_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_grid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = Config::discover(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    let (oracle, policy): (Box<dyn TextOracle>, CallPolicy) = if args.offline {
        (Box::new(LocalOracle::new(&config.chairs)), CallPolicy::immediate())
    } else {
        let oracle = GeminiOracle::new(&config).context("Failed to create text service client")?;
        (Box::new(oracle), CallPolicy::from_config(&config))
    };
    info!(service = oracle.name(), cache = %config.cache_dir.display(), "text service ready");

    let mut gateway = Gateway::new(oracle, FileStore::new(&config.cache_dir), policy);
    let schedule = pipeline::run(&args.primary, &args.supplementary, &config, &mut gateway)
        .with_context(|| format!("Failed to build schedule from {}", args.primary.display()))?;
    pipeline::write_schedule(&schedule, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        output = %args.output.display(),
        sessions = schedule.session_count(),
        calls = gateway.calls(),
        cache_hits = gateway.cache_hits(),
        "done"
    );
    Ok(())
}
