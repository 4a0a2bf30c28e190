use std::collections::HashSet;
use std::fmt;

use crate::observation::{show_list, Observation, TrackId};

/// How many of a timeline's most recent plays are compared against a fresh fetch.
pub const DEFAULT_TAIL_LEN: usize = 6;

/// Recoverable oddities spotted while stitching a fetch onto a timeline.
/// These are reported and logged; the merge still goes ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Nothing in the fetch was already known. A polling window was probably missed.
    NoOverlap,
    /// The already-known plays are not the oldest entries of the fetch,
    /// which points at an out-of-order or skipped fetch.
    Discontinuous {
        overlap: Vec<TrackId>,
        expected: Vec<TrackId>,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::NoOverlap => write!(f, "no overlap between stored tail and fresh fetch"),
            Anomaly::Discontinuous { overlap, expected } => write!(
                f,
                "overlap {} is not at the join point (expected {})",
                show_list(overlap),
                show_list(expected)
            ),
        }
    }
}

/// Outcome of stitching one fetch onto a stored tail.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Plays from the fetch not present in the tail, oldest first.
    pub new_plays: Vec<Observation>,
    /// Identities both the tail and the fetch contain, sorted.
    pub overlap: Vec<TrackId>,
    pub anomaly: Option<Anomaly>,
    /// The fetch arrived out of timestamp order and was sorted first.
    pub reordered: bool,
}

/// Work out which plays of `fresh` are new relative to `tail`.
///
/// `tail` is the last few plays of a stored timeline. `fresh` should be
/// oldest-first; if it isn't it gets sorted by timestamp before anything
/// else. Every entry whose identity also appears in `tail` is dropped.
///
/// The overlap should sit at the start of the fetch, where it abuts the
/// stored tail. When it doesn't, or when there is no overlap at all, the
/// result carries an [`Anomaly`] and a warning is logged. Recovery is
/// best effort: heavily reordered fetches can still produce duplicates or
/// lose a genuine replay of a track that is also in the tail.
pub fn reconcile(tail: &[Observation], mut fresh: Vec<Observation>) -> Reconciliation {
    let reordered = !is_oldest_first(&fresh);
    if reordered {
        log::warn!(
            "Fetch of {} plays is not oldest-first, sorting by timestamp",
            fresh.len()
        );
        fresh.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
    }

    let known: HashSet<&Observation> = tail.iter().collect();

    let overlap_count = fresh.iter().filter(|o| known.contains(o)).count();
    let overlap_set: HashSet<TrackId> = fresh
        .iter()
        .filter(|o| known.contains(o))
        .map(Observation::identity)
        .collect();
    let mut overlap: Vec<TrackId> = overlap_set.iter().cloned().collect();
    overlap.sort();

    let anomaly = if overlap.is_empty() {
        (!tail.is_empty() && !fresh.is_empty()).then_some(Anomaly::NoOverlap)
    } else {
        let head: HashSet<TrackId> = fresh[..overlap_count]
            .iter()
            .map(Observation::identity)
            .collect();
        if head == overlap_set {
            None
        } else {
            let mut expected: Vec<TrackId> = head.into_iter().collect();
            expected.sort();
            Some(Anomaly::Discontinuous {
                overlap: overlap.clone(),
                expected,
            })
        }
    };

    if let Some(a) = &anomaly {
        let station = fresh.first().map(Observation::source).unwrap_or("?");
        match a {
            Anomaly::NoOverlap => log::warn!("[{station}] No overlap between plays!"),
            Anomaly::Discontinuous { .. } => log::warn!(
                "[{station}] Error in stitching! {a}. Tail: {} Fetch: {}",
                show_list(tail),
                show_list(&fresh)
            ),
        }
    }

    let new_plays: Vec<Observation> = fresh.into_iter().filter(|o| !known.contains(o)).collect();

    Reconciliation {
        new_plays,
        overlap,
        anomaly,
        reordered,
    }
}

fn is_oldest_first(plays: &[Observation]) -> bool {
    plays
        .windows(2)
        .all(|w| w[0].timestamp() <= w[1].timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(title: &str, ts: f64) -> Observation {
        Observation::new(title, "Artist", "Album", "Air1", Some(ts))
    }

    fn titles(plays: &[Observation]) -> Vec<&str> {
        plays.iter().map(|p| p.title()).collect()
    }

    #[test]
    fn test_same_fetch_twice_adds_nothing() {
        let tail = vec![play("A", 1.0), play("B", 2.0), play("C", 3.0)];
        let r = reconcile(&tail, tail.clone());
        assert!(r.new_plays.is_empty());
        assert_eq!(r.overlap.len(), 3);
        assert_eq!(r.anomaly, None);
    }

    #[test]
    fn test_sliding_window() {
        let tail = vec![play("A", 1.0), play("B", 2.0), play("C", 3.0)];
        let fresh = vec![play("B", 20.0), play("C", 30.0), play("D", 40.0), play("E", 50.0)];
        let r = reconcile(&tail, fresh);
        assert_eq!(titles(&r.new_plays), vec!["D", "E"]);
        assert_eq!(r.anomaly, None);
        assert!(!r.reordered);
    }

    #[test]
    fn test_empty_tail_accepts_everything() {
        let fresh = vec![play("A", 1.0), play("B", 2.0)];
        let r = reconcile(&[], fresh.clone());
        assert_eq!(r.new_plays.len(), fresh.len());
        assert_eq!(r.anomaly, None);
    }

    #[test]
    fn test_no_overlap_is_flagged_but_accepted() {
        let tail = vec![play("A", 1.0)];
        let r = reconcile(&tail, vec![play("X", 5.0), play("Y", 6.0)]);
        assert_eq!(titles(&r.new_plays), vec!["X", "Y"]);
        assert_eq!(r.anomaly, Some(Anomaly::NoOverlap));
    }

    #[test]
    fn test_scattered_overlap_is_discontinuous() {
        let tail = vec![play("A", 1.0), play("B", 2.0)];
        // "B" is known but sits after an unknown entry.
        let fresh = vec![play("X", 3.0), play("B", 4.0), play("Y", 5.0)];
        let r = reconcile(&tail, fresh);
        assert_eq!(titles(&r.new_plays), vec!["X", "Y"]);
        match r.anomaly {
            Some(Anomaly::Discontinuous { overlap, expected }) => {
                assert_eq!(overlap.len(), 1);
                assert_eq!(overlap[0].title, "B");
                assert_eq!(expected[0].title, "X");
            }
            other => panic!("expected discontinuity, got {other:?}"),
        }
    }

    #[test]
    fn test_unsorted_fetch_is_sorted_first() {
        let tail = vec![play("A", 1.0), play("B", 2.0)];
        // Newest-first, as some stations list them.
        let fresh = vec![play("D", 4.0), play("C", 3.0), play("B", 2.0)];
        let r = reconcile(&tail, fresh);
        assert!(r.reordered);
        assert_eq!(titles(&r.new_plays), vec!["C", "D"]);
        assert_eq!(r.anomaly, None);
    }

    #[test]
    fn test_replay_of_tail_track_is_lost() {
        // Known limitation: a genuine replay of something still in the tail is dropped.
        let tail = vec![play("A", 1.0), play("B", 2.0)];
        let r = reconcile(&tail, vec![play("B", 2.0), play("A", 500.0)]);
        assert!(r.new_plays.is_empty());
    }

    #[test]
    fn test_anomaly_message_names_tracks() {
        let a = Anomaly::Discontinuous {
            overlap: vec![play("B", 0.0).identity()],
            expected: vec![play("X", 0.0).identity()],
        };
        let msg = a.to_string();
        assert!(msg.contains("\"B\" by Artist"));
        assert!(msg.contains("\"X\" by Artist"));
    }
}
