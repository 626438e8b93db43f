//! CLI for the pingrank latency-telemetry query engine.
//!
//! Runs latest, windowed and ranked latency queries against JSON sample
//! files loaded into the in-memory store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pingrank::instant::format_instant;
use pingrank::{
    Direction, EngineConfig, FixedSide, KeyLayout, MemoryStore, PingEngine, PingQuery,
    PingsOutcome, QueryResult, RankOutcome, RankQuery, Sample, SelfPairPolicy, Window,
};
use tracing_subscriber::EnvFilter;

/// pingrank: latency-telemetry query engine CLI.
#[derive(Parser)]
#[command(name = "pingrank", version, about)]
struct Cli {
    /// Engine configuration file (tables, layouts, indexes, timeout).
    #[arg(long, global = true, default_value = "pingrank.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List configured tables and their key layouts.
    Tables,

    /// Latest or windowed samples between an origin and a peer.
    Pings {
        /// JSON data file mapping table names to sample items.
        #[arg(long)]
        data: PathBuf,

        /// Table to query.
        #[arg(long)]
        table: String,

        /// Origin region.
        #[arg(long)]
        origin: String,

        /// Peer region or location.
        #[arg(long)]
        peer: String,

        /// Return only the most recent sample; time bounds are ignored.
        #[arg(long)]
        latest: bool,

        #[command(flatten)]
        window: WindowArgs,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// The k-th lowest or highest latency for a fixed origin or peer.
    Nth {
        /// JSON data file mapping table names to sample items.
        #[arg(long)]
        data: PathBuf,

        /// Table to query.
        #[arg(long)]
        table: String,

        /// Rank the peers reached from this origin.
        #[arg(long, conflicts_with = "peer", required_unless_present = "peer")]
        origin: Option<String>,

        /// Rank the origins that reached this peer.
        #[arg(long)]
        peer: Option<String>,

        /// 1-based rank.
        #[arg(long, default_value = "1")]
        rank: usize,

        /// Rank from the highest latency instead of the lowest.
        #[arg(long)]
        highest: bool,

        /// Whether samples from a region to itself take part.
        #[arg(long, value_enum)]
        self_pairs: SelfPairs,

        #[command(flatten)]
        window: WindowArgs,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Time bounds shared by the query commands.
#[derive(Args)]
struct WindowArgs {
    /// Inclusive lower bound (ISO-8601; offsets are converted to UTC).
    #[arg(long)]
    from: Option<String>,

    /// Inclusive upper bound (ISO-8601; offsets are converted to UTC).
    #[arg(long)]
    to: Option<String>,

    /// Only samples from the last duration (e.g., "12h", "30m", "7d").
    #[arg(long, conflicts_with_all = ["from", "to"])]
    last: Option<String>,

    /// Allow a window with no bounds to read a whole origin's or peer's history.
    #[arg(long, conflicts_with_all = ["from", "to", "last"])]
    all_time: bool,
}

impl WindowArgs {
    fn window(&self) -> Result<Window, Box<dyn std::error::Error>> {
        if self.all_time {
            return Ok(Window::all_time());
        }
        if let Some(last) = &self.last {
            let secs = i64::try_from(parse_duration(last)?)?;
            let lower = chrono::Duration::try_seconds(secs)
                .and_then(|span| Utc::now().checked_sub_signed(span))
                .ok_or_else(|| format!("Duration '{last}' reaches before the earliest instant"))?;
            return Ok(Window::after(lower));
        }
        Ok(Window::parse(self.from.as_deref(), self.to.as_deref())?)
    }
}

/// Self-pair handling for ranked queries.
#[derive(Clone, Copy, ValueEnum)]
enum SelfPairs {
    /// Rank self-pairs like any other pair.
    Keep,
    /// Drop self-pairs before ranking.
    Exclude,
}

impl From<SelfPairs> for SelfPairPolicy {
    fn from(value: SelfPairs) -> Self {
        match value {
            SelfPairs::Keep => Self::Keep,
            SelfPairs::Exclude => Self::Exclude,
        }
    }
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with the outcome and access path.
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Tables => cmd_tables(&cli.config),
        Commands::Pings {
            data,
            table,
            origin,
            peer,
            latest,
            window,
            format,
        } => cmd_pings(&cli.config, &data, &table, &origin, &peer, latest, &window, &format).await,
        Commands::Nth {
            data,
            table,
            origin,
            peer,
            rank,
            highest,
            self_pairs,
            window,
            format,
        } => {
            let side = match (origin, peer) {
                (Some(origin), _) => Some(FixedSide::Origin(origin)),
                (None, peer) => peer.map(FixedSide::Peer),
            };
            let direction = if highest {
                Direction::Highest
            } else {
                Direction::Lowest
            };
            cmd_nth(
                &cli.config,
                &data,
                &table,
                side,
                rank,
                direction,
                self_pairs.into(),
                &window,
                &format,
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `pingrank tables`.
fn cmd_tables(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(config_path)?;

    println!("Config: {}", config_path.display());
    println!("Store timeout: {:?}", config.store_timeout());
    println!();

    for table in &config.tables {
        println!("  Table \"{}\"", table.name);
        match &table.layout {
            KeyLayout::CompositeSortKey {
                sort_key,
                separator,
            } => println!("    Layout: composite sort key '{sort_key}' (separator '{separator}')"),
            KeyLayout::TimestampSortKey => println!("    Layout: timestamp sort key"),
        }
        let attrs = &table.attributes;
        println!(
            "    Attributes: origin={}, peer={}, timestamp={}, latency={}",
            attrs.origin, attrs.peer, attrs.timestamp, attrs.latency
        );
        if let Some(index) = &table.origin_time_index {
            println!("    Origin/time index: {index}");
        }
        if let Some(index) = &table.peer_time_index {
            println!("    Peer/time index: {index}");
        }
    }

    Ok(())
}

fn open_engine(
    config_path: &Path,
    data_path: &Path,
) -> Result<PingEngine<MemoryStore>, Box<dyn std::error::Error>> {
    let config = EngineConfig::load(config_path)?;
    let store = MemoryStore::load(data_path)?;
    Ok(PingEngine::new(Arc::new(store), config)?)
}

/// Implements `pingrank pings`.
#[allow(clippy::too_many_arguments)]
async fn cmd_pings(
    config_path: &Path,
    data_path: &Path,
    table: &str,
    origin: &str,
    peer: &str,
    latest: bool,
    window: &WindowArgs,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config_path, data_path)?;

    let query = if latest {
        PingQuery::latest(table, origin, peer)
    } else {
        PingQuery::windowed(table, origin, peer, window.window()?)
    };
    let result = engine.get_pings(&query).await?;

    match format {
        OutputFormat::Csv => {
            print_header(&result);
            match result.outcome() {
                PingsOutcome::Found { samples } => print_samples(samples),
                PingsOutcome::NoData(no_data) => println!("# {no_data}"),
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

/// Implements `pingrank nth`.
#[allow(clippy::too_many_arguments)]
async fn cmd_nth(
    config_path: &Path,
    data_path: &Path,
    table: &str,
    side: Option<FixedSide>,
    rank: usize,
    direction: Direction,
    self_pairs: SelfPairPolicy,
    window: &WindowArgs,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let side = side.ok_or("either --origin or --peer is required")?;
    let engine = open_engine(config_path, data_path)?;

    let query = RankQuery::new(table, side, window.window()?, rank, direction, self_pairs);
    let result = engine.get_nth_ping(&query).await?;

    match format {
        OutputFormat::Csv => {
            print_header(&result);
            println!("# window={}", query.window.bounds());
            match result.outcome() {
                RankOutcome::Ranked(sample) => print_samples(std::slice::from_ref(sample)),
                other => println!("# {other}"),
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

fn print_header<O>(result: &QueryResult<O>) {
    println!("# path={:?}, fetched={}", result.index_path(), result.fetched());
}

fn print_samples(samples: &[Sample]) {
    println!("origin,peer,timestamp,latency_ms");
    for s in samples {
        println!(
            "{},{},{},{}",
            s.origin,
            s.peer,
            format_instant(&s.timestamp),
            s.latency_ms
        );
    }
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "7d") to seconds.
fn parse_duration(s: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".into());
    }

    let unit_len = s.chars().last().map_or(0, char::len_utf8);
    let (num_str, unit) = s.split_at(s.len() - unit_len);
    let num: u64 = num_str.parse()?;

    let secs = match unit {
        "s" => Some(num),
        "m" => num.checked_mul(60),
        "h" => num.checked_mul(3600),
        "d" => num.checked_mul(86400),
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };

    secs.ok_or_else(|| format!("Duration '{s}' is too large").into())
}
