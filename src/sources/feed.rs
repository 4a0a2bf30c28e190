use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::StationSource;
use crate::config::StationConfig;
use crate::observation::{now_epoch_seconds, Observation, UNKNOWN_ALBUM};

/// One entry of a JSON "recently played" feed.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    /// Unix seconds; feeds without one get the fetch time.
    timestamp: Option<f64>,
}

/// Station whose recently-played list is a JSON array served over HTTP.
pub struct JsonFeedSource {
    name: String,
    url: String,
    newest_first: bool,
    agent: ureq::Agent,
}

impl JsonFeedSource {
    pub fn new(station: &StationConfig, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            name: station.name.clone(),
            url: station.url.clone(),
            newest_first: station.newest_first,
            agent,
        }
    }
}

impl StationSource for JsonFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&mut self) -> Result<Vec<Observation>> {
        log::debug!("Fetching {}", self.url);
        let entries: Vec<FeedEntry> = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("HTTP request failed for {}", self.name))?
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse feed for {}", self.name))?;

        let plays = parse_feed(&self.name, entries, self.newest_first, now_epoch_seconds());
        log::debug!("  Got {} plays from {}", plays.len(), self.name);
        Ok(plays)
    }
}

/// Turn raw feed entries into oldest-first observations.
///
/// Entries without a title are skipped, a title already seen in this
/// fetch is skipped, a missing album becomes `"?"`.
fn parse_feed(station: &str, mut entries: Vec<FeedEntry>, newest_first: bool, now: f64) -> Vec<Observation> {
    if newest_first {
        entries.reverse();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut plays = Vec::new();
    for entry in entries {
        let Some(title) = entry.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
            continue;
        };
        if !seen.insert(title.clone()) {
            continue;
        }
        plays.push(Observation::new(
            title,
            entry.artist.unwrap_or_default().trim(),
            entry.album.as_deref().map(str::trim).unwrap_or(UNKNOWN_ALBUM),
            station,
            Some(entry.timestamp.unwrap_or(now)),
        ));
    }
    plays
}
