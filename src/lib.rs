pub mod collector;
pub mod config;
pub mod coverage;
pub mod observation;
pub mod popularity;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod timeline;

pub use observation::{Observation, TrackId};
pub use store::{CollectionStore, SnapshotDir, StoreError};
pub use timeline::Timeline;

/// Application name for XDG paths
pub const APP_NAME: &str = "airplay";
