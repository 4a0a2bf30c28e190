use std::fmt;
use std::hash::{Hash, Hasher};

/// Album placeholder for stations whose feeds don't report one.
pub const UNKNOWN_ALBUM: &str = "?";

/// A single play reported by one station's "recently played" list.
///
/// Equality and hashing only look at the track identity (title, artist,
/// album, source). The capture timestamp is ignored, so the same entry
/// fetched twice compares equal while a later replay is still a separate
/// element of a timeline.
#[derive(Debug, Clone)]
pub struct Observation {
    title: String,
    artist: String,
    album: String,
    source: String,
    timestamp: f64,
}

impl Observation {
    /// Build an observation. A missing `timestamp` means "now".
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        source: impl Into<String>,
        timestamp: Option<f64>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            source: source.into(),
            timestamp: timestamp.unwrap_or_else(now_epoch_seconds),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Seconds since the unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Capture time truncated to whole seconds.
    pub fn epoch_seconds(&self) -> i64 {
        epoch_seconds(self.timestamp)
    }

    /// Same play attributed to another station.
    pub(crate) fn relabeled(self, source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..self
        }
    }

    /// Owned copy of the identity fields.
    pub fn identity(&self) -> TrackId {
        TrackId {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            source: self.source.clone(),
        }
    }

    /// True when `id` names the same track as this observation.
    pub fn is(&self, id: &TrackId) -> bool {
        self.title == id.title
            && self.artist == id.artist
            && self.album == id.album
            && self.source == id.source
    }

    fn key(&self) -> (&str, &str, &str, &str) {
        (&self.title, &self.artist, &self.album, &self.source)
    }
}

impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Observation {}

impl Hash for Observation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" by {}", self.title, self.artist)
    }
}

/// Track identity: the fields that decide whether two plays are "the same song".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub source: String,
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" by {}", self.title, self.artist)
    }
}

/// Current wall-clock time as fractional unix seconds.
pub fn now_epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Fractional unix time truncated to whole seconds.
pub fn epoch_seconds(timestamp: f64) -> i64 {
    timestamp.floor() as i64
}

/// Render a list of plays for diagnostics, e.g. `["A" by X, "B" by Y]`.
pub fn show_list<'a, T: fmt::Display + 'a>(items: impl IntoIterator<Item = &'a T>) -> String {
    let parts: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
