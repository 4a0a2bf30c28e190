use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{CollectionStore, Result, StoreError};
use crate::observation::Observation;
use crate::timeline::Timeline;

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout: station name -> ordered plays.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: i64,
    stations: BTreeMap<String, Vec<PlayRecord>>,
}

/// One play as persisted. The station is the outer map key.
#[derive(Debug, Serialize, Deserialize)]
struct PlayRecord {
    title: String,
    artist: String,
    album: String,
    timestamp: f64,
}

/// Directory of whole-store snapshots, one file per save named by its unix-time key.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    /// Use `dir` for snapshots, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: i64) -> PathBuf {
        self.dir.join(key.to_string())
    }

    /// Saved keys, ascending. Files whose names aren't integers are ignored.
    pub fn keys(&self) -> Result<Vec<i64>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    /// Write `store` under `key` (current unix time when `None`).
    ///
    /// The snapshot is written to a temp file in the same directory and
    /// renamed into place, so an interrupted save never leaves a partial file.
    pub fn save(&self, store: &CollectionStore, key: Option<i64>) -> Result<i64> {
        let key = key.unwrap_or_else(|| chrono::Utc::now().timestamp());

        let stations = store
            .iter()
            .map(|(name, timeline)| {
                let plays = timeline
                    .iter()
                    .map(|o| PlayRecord {
                        title: o.title().to_string(),
                        artist: o.artist().to_string(),
                        album: o.album().to_string(),
                        timestamp: o.timestamp(),
                    })
                    .collect();
                (name.to_string(), plays)
            })
            .collect();
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: key,
            stations,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec(&file)?)?;
        tmp.as_file().sync_all()?;
        let path = self.file_for(key);
        tmp.persist(&path)?;

        log::debug!("Saved {} plays to {}", store.total_plays(), path.display());
        Ok(key)
    }

    pub fn restore(&self, key: i64) -> Result<CollectionStore> {
        let path = self.file_for(key);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                key,
                dir: self.dir.clone(),
            });
        }

        let raw = fs::read_to_string(&path)?;
        let file: SnapshotFile = serde_json::from_str(&raw)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }

        let timelines = file
            .stations
            .into_iter()
            .map(|(station, records)| {
                let plays = records
                    .into_iter()
                    .map(|r| Observation::new(r.title, r.artist, r.album, station.as_str(), Some(r.timestamp)))
                    .collect();
                (station, Timeline::from_plays(plays))
            })
            .collect();

        log::info!("Restored snapshot {key} from {}", path.display());
        Ok(CollectionStore::from_timelines(timelines))
    }

    /// Restore the numerically largest key.
    pub fn restore_most_recent(&self) -> Result<(i64, CollectionStore)> {
        let newest = self
            .keys()?
            .into_iter()
            .max()
            .ok_or_else(|| StoreError::NoSnapshots(self.dir.clone()))?;
        let store = self.restore(newest)?;
        Ok((newest, store))
    }
}
