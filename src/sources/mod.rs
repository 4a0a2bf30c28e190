pub mod feed;

use std::collections::VecDeque;

use anyhow::Result;

use crate::observation::Observation;

pub use feed::JsonFeedSource;

/// A station's "recently played" list.
///
/// Implementations return the plays oldest-first with duplicates inside a
/// single fetch already removed. Errors are reported by the collector and
/// treated as an empty fetch.
pub trait StationSource {
    fn name(&self) -> &str;
    fn fetch(&mut self) -> Result<Vec<Observation>>;
}

/// Replays canned fetches, one batch per call, then returns nothing.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    batches: VecDeque<Vec<Observation>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, batches: Vec<Vec<Observation>>) -> Self {
        Self {
            name: name.into(),
            batches: batches.into(),
        }
    }
}

impl StationSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&mut self) -> Result<Vec<Observation>> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}
