pub mod snapshot;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::observation::Observation;
use crate::reconcile::{reconcile, DEFAULT_TAIL_LEN};
use crate::timeline::Timeline;

pub use snapshot::SnapshotDir;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot {key} not found in {}", dir.display())]
    NotFound { key: i64, dir: PathBuf },
    #[error("No saved snapshots in {}", .0.display())]
    NoSnapshots(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to finalize snapshot: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

impl StoreError {
    /// Both "no snapshot at this key" and "no snapshots at all".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoSnapshots(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One timeline per station, grown incrementally from fetched snapshots.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    timelines: BTreeMap<String, Timeline>,
    tail_len: usize,
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self {
            timelines: BTreeMap::new(),
            tail_len: DEFAULT_TAIL_LEN,
        }
    }
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recent plays compared against each new fetch.
    pub fn with_tail_len(mut self, tail_len: usize) -> Self {
        self.tail_len = tail_len.max(1);
        self
    }

    pub(crate) fn from_timelines(timelines: BTreeMap<String, Timeline>) -> Self {
        Self {
            timelines,
            ..Self::default()
        }
    }

    /// Merge a fetch for `source` into its timeline. Returns how many plays were appended.
    ///
    /// The first fetch for a station registers it and is stored as-is, even
    /// when empty. Later fetches are reconciled against the station's recent
    /// tail and only the new plays are appended. Plays carrying another
    /// station name are relabeled to `source`.
    pub fn add_observations(&mut self, source: &str, observations: Vec<Observation>) -> usize {
        let mislabeled = observations.iter().filter(|o| o.source() != source).count();
        let observations: Vec<Observation> = if mislabeled > 0 {
            log::warn!("[{source}] Relabeling {mislabeled} plays carrying a different station name");
            observations.into_iter().map(|o| o.relabeled(source)).collect()
        } else {
            observations
        };

        match self.timelines.get_mut(source) {
            None => {
                let n = observations.len();
                log::info!("[{source}] Starting collection with {n} {}", plural(n));
                self.timelines
                    .insert(source.to_string(), Timeline::from_plays(observations));
                n
            }
            Some(_) if observations.is_empty() => {
                log::debug!("[{source}] Nothing fetched this cycle");
                0
            }
            Some(timeline) => {
                let merged = reconcile(timeline.tail(self.tail_len), observations);
                let n = merged.new_plays.len();
                log::info!("[{source}] Adding {n} new {}", plural(n));
                timeline.extend(merged.new_plays);
                n
            }
        }
    }

    pub fn timeline(&self, source: &str) -> Option<&Timeline> {
        self.timelines.get(source)
    }

    /// Registered station names, sorted.
    pub fn sources(&self) -> Vec<&str> {
        self.timelines.keys().map(String::as_str).collect()
    }

    /// Every station's plays in one new timeline.
    pub fn all_observations(&self) -> Timeline {
        Timeline::merged(self.timelines.values())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Timeline)> {
        self.timelines.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total plays across all stations.
    pub fn total_plays(&self) -> usize {
        self.timelines.values().map(Timeline::len).sum()
    }

    /// Write a snapshot keyed by `at` (now when `None`). Returns the key used.
    pub fn save(&self, snapshots: &SnapshotDir, at: Option<i64>) -> Result<i64> {
        snapshots.save(self, at)
    }

    pub fn restore(snapshots: &SnapshotDir, key: i64) -> Result<Self> {
        snapshots.restore(key)
    }

    /// Restore the snapshot with the largest key. Returns the key with the store.
    pub fn restore_most_recent(snapshots: &SnapshotDir) -> Result<(i64, Self)> {
        snapshots.restore_most_recent()
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "play" } else { "plays" }
}
