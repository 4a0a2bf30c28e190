use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use airplay::collector::{Collector, Shutdown};
use airplay::config::AppConfig;
use airplay::coverage::{capture_intervals, total_covered_seconds};
use airplay::popularity::{hourly_distribution, top_popularity};
use airplay::sources::{JsonFeedSource, StationSource};
use airplay::timeline::PlayFilter;
use airplay::{CollectionStore, SnapshotDir, Timeline};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "airplay", version, about = "Radio airplay collector and analyzer")]
struct Cli {
    /// Snapshot directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Which collection to start from: `new`, `newest`, or a snapshot key.
#[derive(Clone, Debug)]
enum Input {
    New,
    Newest,
    At(i64),
}

impl FromStr for Input {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "newest" => Ok(Self::Newest),
            other => other
                .parse::<i64>()
                .map(Self::At)
                .map_err(|_| format!("'{other}' is not 'new', 'newest' or an integer timestamp")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured stations and collect their plays over time
    Collect {
        /// Collection to continue: new, newest, or a snapshot timestamp
        #[arg(short, long, default_value = "new")]
        input: Input,

        /// Seconds between fetches (defaults to config poll_interval_secs)
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Show per-station totals and coverage
    Stats {
        /// Snapshot to load: newest or a timestamp
        #[arg(short, long, default_value = "newest")]
        input: Input,
    },

    /// List the capture intervals of a station (or of everything)
    Coverage {
        #[arg(short, long, default_value = "newest")]
        input: Input,

        /// Restrict to one station
        #[arg(short, long)]
        station: Option<String>,
    },

    /// Rank tracks by play frequency
    Popular {
        #[arg(short, long, default_value = "newest")]
        input: Input,

        #[arg(short, long)]
        station: Option<String>,

        /// Number of results (0 = all)
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// When during the day a song is played
    Hourly {
        /// Song title (exact match)
        #[arg(short, long)]
        title: String,

        /// Artist (exact match)
        #[arg(short, long)]
        artist: Option<String>,

        #[arg(short, long, default_value = "newest")]
        input: Input,

        #[arg(short, long)]
        station: Option<String>,
    },

    /// List saved snapshots
    Snapshots,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = log_level(cli.verbose);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve snapshot dir: CLI > config > XDG default
    let data_dir = cli
        .data_dir
        .or(config.data_dir.clone())
        .unwrap_or_else(airplay::config::default_data_dir);
    log::debug!("Snapshots: {}", data_dir.display());

    let snapshots = SnapshotDir::open(&data_dir).context("Failed to open snapshot directory")?;

    match cli.command {
        Commands::Collect { input, wait } => {
            let mut config = config;
            if let Some(secs) = wait {
                config.poll_interval_secs = secs;
            }
            if config.stations.is_empty() {
                bail!("No stations configured. Add [[stations]] entries to the config file.");
            }

            let store = load_store(&snapshots, &input)?;
            let timeout = Duration::from_secs(config.fetch_timeout_secs);
            let sources: Vec<Box<dyn StationSource>> = config
                .stations
                .iter()
                .map(|s| Box::new(JsonFeedSource::new(s, timeout)) as Box<dyn StationSource>)
                .collect();

            let shutdown = Shutdown::new();
            shutdown.install_ctrlc()?;

            let mut collector = Collector::new(store, snapshots, sources, &config);
            collector.run(&shutdown);
            let (key, store) = collector.finish()?;
            println!("Saved {} plays to snapshot {key}", store.total_plays());
        }

        Commands::Stats { input } => {
            let store = load_store(&snapshots, &input)?;
            println!("{:<20} {:>7} {:>7} {:>6} {:>9} {:>6}", "Station", "Plays", "Unique", "Uniq%", "Covered h", "Spans");
            println!("{}", "-".repeat(60));
            for (name, timeline) in store.iter() {
                print_stats_row(name, timeline, config.gap_threshold_secs)?;
            }
            println!("{}", "-".repeat(60));
            print_stats_row("All", &store.all_observations(), config.gap_threshold_secs)?;
        }

        Commands::Coverage { input, station } => {
            let store = load_store(&snapshots, &input)?;
            let timeline = pick_timeline(&store, station.as_deref())?;
            let intervals = capture_intervals(&timeline, config.gap_threshold_secs);
            if intervals.is_empty() {
                println!("No plays collected.");
                return Ok(());
            }
            for interval in &intervals {
                println!(
                    "{} -> {}  ({:.1} h)",
                    format_time(interval.start),
                    format_time(interval.end),
                    interval.duration_secs() as f64 / 3600.0
                );
            }
            let total = total_covered_seconds(&intervals)?;
            println!();
            println!("{} intervals, {:.1} hours observed", intervals.len(), total as f64 / 3600.0);
        }

        Commands::Popular { input, station, limit } => {
            let store = load_store(&snapshots, &input)?;
            let timeline = pick_timeline(&store, station.as_deref())?;
            let indices = top_popularity(&timeline, limit);
            if indices.is_empty() {
                println!("No plays collected.");
                return Ok(());
            }
            println!("{:<30} {:<25} {:<10} {:>8}", "Song", "Artist", "Station", "Share");
            println!("{}", "-".repeat(76));
            for idx in &indices {
                println!(
                    "{:<30} {:<25} {:<10} {:>7.2}%",
                    truncate(&idx.track.title, 30),
                    truncate(&idx.track.artist, 25),
                    truncate(&idx.track.source, 10),
                    idx.frequency * 100.0
                );
            }
        }

        Commands::Hourly { title, artist, input, station } => {
            let store = load_store(&snapshots, &input)?;
            let timeline = pick_timeline(&store, station.as_deref())?;
            let filter = PlayFilter {
                title: Some(title.clone()),
                artist,
                hour: None,
            };
            let tracks = timeline.select(&filter, &Local).unique_tracks();
            if tracks.is_empty() {
                println!("\"{title}\" was never played.");
                return Ok(());
            }
            for track in &tracks {
                println!("When is {track} played on {}?", track.source);
                println!("{:>4} {:>6} {:>8} {:>9} {:>10}", "Hour", "Plays", "Of all", "Share", "Per hour");
                for bucket in hourly_distribution(&timeline, Some(track), config.gap_threshold_secs) {
                    println!(
                        "{:>4} {:>6} {:>8} {:>9} {:>10}",
                        bucket.hour,
                        bucket.plays,
                        bucket.observations,
                        bucket.relative.map(|r| format!("{:.1}%", r * 100.0)).unwrap_or_else(|| "-".into()),
                        bucket.plays_per_observed_hour.map(|r| format!("{r:.2}")).unwrap_or_else(|| "-".into()),
                    );
                }
                println!();
            }
        }

        Commands::Snapshots => {
            let keys = snapshots.keys()?;
            if keys.is_empty() {
                println!("No snapshots in {}", snapshots.path().display());
            }
            for key in keys {
                println!("{key}  {}", format_time(key));
            }
        }
    }

    Ok(())
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn load_store(snapshots: &SnapshotDir, input: &Input) -> Result<CollectionStore> {
    match input {
        Input::New => Ok(CollectionStore::new()),
        Input::Newest => {
            let (key, store) = CollectionStore::restore_most_recent(snapshots)
                .context("Failed to load newest collection")?;
            log::info!("Loading newest collection: {}", format_time(key));
            Ok(store)
        }
        Input::At(key) => {
            log::info!("Restoring {key}");
            CollectionStore::restore(snapshots, *key).with_context(|| format!("Failed to restore {key}"))
        }
    }
}

/// One station's timeline, or every station's plays when `station` is `None`.
fn pick_timeline(store: &CollectionStore, station: Option<&str>) -> Result<Timeline> {
    match station {
        None => Ok(store.all_observations()),
        Some(name) => match store.timeline(name) {
            Some(t) => Ok(t.clone()),
            None => bail!("Unknown station '{name}'. Known: {}", store.sources().join(", ")),
        },
    }
}

fn print_stats_row(name: &str, timeline: &Timeline, gap_threshold_secs: i64) -> Result<()> {
    let intervals = capture_intervals(timeline, gap_threshold_secs);
    let covered = total_covered_seconds(&intervals)?;
    println!(
        "{:<20} {:>7} {:>7} {:>6.1} {:>9.1} {:>6}",
        truncate(name, 20),
        timeline.len(),
        timeline.unique_tracks().len(),
        timeline.uniqueness_index().unwrap_or(0.0) * 100.0,
        covered as f64 / 3600.0,
        intervals.len(),
    );
    Ok(())
}

fn format_time(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|d| d.with_timezone(&Local).format("%b %d, %I:%M %p").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}

/// Truncate long names for table output.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let cut: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}
