use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Timelike};

use crate::observation::{epoch_seconds, Observation, TrackId};

/// Ordered play history for one station (or an aggregate of several).
///
/// Plays stay in insertion order. Only the collection store appends to a
/// station's timeline; everything else gets read access or an owned copy.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    plays: Vec<Observation>,
}

/// Criteria for [`Timeline::select`]. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct PlayFilter {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Hour of day (0-23) in the zone passed to `select`.
    pub hour: Option<u32>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plays(plays: Vec<Observation>) -> Self {
        Self { plays }
    }

    /// Concatenate several timelines into a new one.
    pub fn merged<'a>(timelines: impl IntoIterator<Item = &'a Timeline>) -> Self {
        let plays = timelines
            .into_iter()
            .flat_map(|t| t.plays.iter().cloned())
            .collect();
        Self { plays }
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.plays.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.plays
    }

    /// The last `n` plays (fewer if the timeline is shorter).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.plays.len().saturating_sub(n);
        &self.plays[start..]
    }

    pub(crate) fn extend(&mut self, plays: Vec<Observation>) {
        self.plays.extend(plays);
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.plays.iter().map(Observation::timestamp).collect()
    }

    pub fn times_played(&self, id: &TrackId) -> usize {
        self.plays.iter().filter(|p| p.is(id)).count()
    }

    /// Play count per identity, plus identities in first-seen order.
    pub fn play_counts(&self) -> (Vec<TrackId>, HashMap<TrackId, usize>) {
        let mut order = Vec::new();
        let mut counts: HashMap<TrackId, usize> = HashMap::new();
        for play in &self.plays {
            let id = play.identity();
            match counts.get_mut(&id) {
                Some(n) => *n += 1,
                None => {
                    order.push(id.clone());
                    counts.insert(id, 1);
                }
            }
        }
        (order, counts)
    }

    /// Distinct tracks in first-seen order.
    pub fn unique_tracks(&self) -> Vec<TrackId> {
        self.play_counts().0
    }

    /// Distinct tracks divided by total plays. `None` for an empty timeline.
    pub fn uniqueness_index(&self) -> Option<f64> {
        if self.plays.is_empty() {
            return None;
        }
        Some(self.unique_tracks().len() as f64 / self.plays.len() as f64)
    }

    /// Plays matching every set field of `filter`, hours taken in `tz`.
    pub fn select<Tz: TimeZone>(&self, filter: &PlayFilter, tz: &Tz) -> Timeline {
        let plays = self
            .plays
            .iter()
            .filter(|p| filter.title.as_deref().is_none_or(|t| t == p.title()))
            .filter(|p| filter.artist.as_deref().is_none_or(|a| a == p.artist()))
            .filter(|p| {
                filter
                    .hour
                    .is_none_or(|h| hour_of_day(p.timestamp(), tz) == h)
            })
            .cloned()
            .collect();
        Timeline { plays }
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.plays.iter()
    }
}

/// Hour of day (0-23) of a unix timestamp in `tz`.
pub fn hour_of_day<Tz: TimeZone>(timestamp: f64, tz: &Tz) -> u32 {
    DateTime::from_timestamp(epoch_seconds(timestamp), 0)
        .map(|utc| utc.with_timezone(tz).hour())
        .unwrap_or(0)
}

/// Seconds from `timestamp` until the next full hour in `tz`.
pub(crate) fn seconds_to_next_hour<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> i64 {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| {
            let local = utc.with_timezone(tz);
            3600 - i64::from(local.minute() * 60 + local.second())
        })
        .unwrap_or(3600)
}
