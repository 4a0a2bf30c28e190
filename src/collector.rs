use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::sources::StationSource;
use crate::store::{CollectionStore, SnapshotDir};

/// Granularity of the interruptible wait between cycles.
const WAKE_INTERVAL: Duration = Duration::from_millis(200);

/// Shutdown request shared between a signal handler and the collector loop.
///
/// The handler only raises the flag. Saving stays with whoever owns the store.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag on Ctrl-C / SIGTERM.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                log::warn!("Interrupted, saving collection and quitting...");
            }
        })
        .context("Failed to install Ctrl-C handler")
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`. Returns early (true) once shutdown is requested.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(WAKE_INTERVAL.min(deadline - now));
        }
    }
}

/// Polls every station, feeds the store, and checkpoints periodically.
pub struct Collector {
    store: CollectionStore,
    snapshots: SnapshotDir,
    sources: Vec<Box<dyn StationSource>>,
    poll_interval: Duration,
    save_every_cycles: u32,
    cycles: u64,
}

impl Collector {
    pub fn new(
        store: CollectionStore,
        snapshots: SnapshotDir,
        sources: Vec<Box<dyn StationSource>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store: store.with_tail_len(config.tail_len),
            snapshots,
            sources,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            save_every_cycles: config.save_every_cycles.max(1),
            cycles: 0,
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Fetch every station once. Returns the number of new plays stored.
    ///
    /// A failed fetch counts as an empty one.
    pub fn run_cycle(&mut self) -> usize {
        let mut added = 0;
        for source in &mut self.sources {
            let name = source.name().to_string();
            let plays = match source.fetch() {
                Ok(plays) => plays,
                Err(e) => {
                    log::warn!("[{name}] Fetch failed, continuing anyways: {e:#}");
                    Vec::new()
                }
            };
            added += self.store.add_observations(&name, plays);
        }
        self.cycles += 1;
        added
    }

    /// Collect until shutdown is requested.
    ///
    /// Snapshot failures during the run are logged and collection goes on.
    pub fn run(&mut self, shutdown: &Shutdown) {
        log::info!(
            "Collecting from {} stations every {}s",
            self.sources.len(),
            self.poll_interval.as_secs()
        );

        while !shutdown.is_requested() {
            self.run_cycle();

            if self.cycles % u64::from(self.save_every_cycles) == 0 {
                self.log_stats();
                match self.store.save(&self.snapshots, None) {
                    Ok(key) => log::info!("Saved collection ({key})"),
                    Err(e) => log::error!("Failed to save collection: {e}"),
                }
            }

            log::debug!("Waiting {}s", self.poll_interval.as_secs());
            if shutdown.wait(self.poll_interval) {
                break;
            }
        }
    }

    /// Final save. Consumes the collector so it can only happen once.
    pub fn finish(self) -> Result<(i64, CollectionStore)> {
        self.log_stats();
        let key = self
            .store
            .save(&self.snapshots, None)
            .with_context(|| format!("Failed to save collection to {}", self.snapshots.path().display()))?;
        log::info!("Saved collection ({key})");
        Ok((key, self.store))
    }

    fn log_stats(&self) {
        log::info!("Station stats:");
        for (name, timeline) in self.store.iter() {
            log::info!("    {name} - {}", timeline.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use crate::sources::StaticSource;
    use tempfile::TempDir;

    fn play(station: &str, title: &str, ts: f64) -> Observation {
        Observation::new(title, "Artist", "Album", station, Some(ts))
    }

    struct BrokenSource;

    impl StationSource for BrokenSource {
        fn name(&self) -> &str {
            "Broken"
        }

        fn fetch(&mut self) -> Result<Vec<Observation>> {
            anyhow::bail!("connection reset")
        }
    }

    /// Requests shutdown as soon as it has been fetched once.
    struct StopAfterOne {
        inner: StaticSource,
        shutdown: Shutdown,
    }

    impl StationSource for StopAfterOne {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn fetch(&mut self) -> Result<Vec<Observation>> {
            self.shutdown.request();
            self.inner.fetch()
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            poll_interval_secs: 3600,
            save_every_cycles: 1,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_cycles_reconcile_and_survive_failures() {
        let tmp = TempDir::new().unwrap();
        let snaps = SnapshotDir::open(tmp.path()).unwrap();
        let klove = StaticSource::new(
            "KLOVE",
            vec![
                vec![play("KLOVE", "A", 1.0), play("KLOVE", "B", 2.0)],
                vec![play("KLOVE", "B", 2.0), play("KLOVE", "C", 3.0)],
            ],
        );
        let sources: Vec<Box<dyn StationSource>> = vec![Box::new(klove), Box::new(BrokenSource)];
        let mut collector = Collector::new(CollectionStore::new(), snaps, sources, &config());

        assert_eq!(collector.run_cycle(), 2);
        assert_eq!(collector.run_cycle(), 1);
        assert_eq!(collector.run_cycle(), 0);
        assert_eq!(collector.cycles(), 3);
        // The failing station is still registered, with nothing collected.
        assert_eq!(collector.store().sources(), vec!["Broken", "KLOVE"]);
        assert_eq!(collector.store().timeline("Broken").map(|t| t.len()), Some(0));
        assert_eq!(collector.store().total_plays(), 3);
    }

    #[test]
    fn test_run_stops_on_shutdown_and_finish_saves_once() {
        let tmp = TempDir::new().unwrap();
        let snaps = SnapshotDir::open(tmp.path()).unwrap();
        let shutdown = Shutdown::new();
        let source = StopAfterOne {
            inner: StaticSource::new("Air1", vec![vec![play("Air1", "A", 1.0)]]),
            shutdown: shutdown.clone(),
        };
        let sources: Vec<Box<dyn StationSource>> = vec![Box::new(source)];
        let mut collector = Collector::new(CollectionStore::new(), snaps.clone(), sources, &config());

        // Would sleep an hour between cycles if shutdown weren't noticed.
        collector.run(&shutdown);
        assert_eq!(collector.cycles(), 1);

        let (key, store) = collector.finish().unwrap();
        assert_eq!(store.total_plays(), 1);
        let restored = snaps.restore(key).unwrap();
        assert_eq!(restored.total_plays(), 1);
    }

    #[test]
    fn test_already_requested_shutdown_skips_collection() {
        let tmp = TempDir::new().unwrap();
        let snaps = SnapshotDir::open(tmp.path()).unwrap();
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut collector = Collector::new(CollectionStore::new(), snaps, Vec::new(), &config());
        collector.run(&shutdown);
        assert_eq!(collector.cycles(), 0);
    }

    #[test]
    fn test_wait_times_out() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait(Duration::from_millis(10)));
        shutdown.request();
        assert!(shutdown.wait(Duration::from_secs(60)));
    }
}
