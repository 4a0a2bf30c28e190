use std::collections::HashMap;

use chrono::{Local, TimeZone};

use crate::coverage::{capture_intervals, covered_seconds_by_hour};
use crate::observation::TrackId;
use crate::timeline::{hour_of_day, Timeline};

/// Share of a timeline's plays that went to one track.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularityIndex {
    pub track: TrackId,
    pub frequency: f64,
}

/// Play frequency of every distinct track, most played first.
///
/// Frequencies sum to 1.0 for a non-empty timeline. Ties keep first-seen order.
pub fn popularity_indices(timeline: &Timeline) -> Vec<PopularityIndex> {
    let total = timeline.len();
    if total == 0 {
        return Vec::new();
    }

    let (order, counts) = timeline.play_counts();
    let mut indices: Vec<PopularityIndex> = order
        .into_iter()
        .map(|track| {
            let plays = counts.get(&track).copied().unwrap_or(0);
            PopularityIndex {
                track,
                frequency: plays as f64 / total as f64,
            }
        })
        .collect();

    // Stable sort, descending
    indices.sort_by(|a, b| b.frequency.total_cmp(&a.frequency));
    indices
}

/// The `n` highest popularity indices. `n == 0` returns all of them.
pub fn top_popularity(timeline: &Timeline, n: usize) -> Vec<PopularityIndex> {
    let mut indices = popularity_indices(timeline);
    if n > 0 {
        indices.truncate(n);
    }
    indices
}

/// The `n` most played tracks. `n == 0` returns all of them.
pub fn most_popular(timeline: &Timeline, n: usize) -> Vec<TrackId> {
    top_popularity(timeline, n).into_iter().map(|i| i.track).collect()
}

/// Plays falling in one hour of the day.
#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket {
    pub hour: u32,
    /// Plays counted (of one track, or of everything).
    pub plays: usize,
    /// Every play recorded at this hour across the whole timeline.
    pub observations: usize,
    /// `plays / observations`; `None` when nothing was ever observed at this hour.
    pub relative: Option<f64>,
    /// Seconds of capture-interval coverage falling in this hour.
    pub observed_secs: i64,
    /// `plays` per hour of real coverage; `None` without coverage.
    pub plays_per_observed_hour: Option<f64>,
}

/// Hour-of-day distribution in the local time zone. See [`hourly_distribution_in`].
pub fn hourly_distribution(
    timeline: &Timeline,
    track: Option<&TrackId>,
    gap_threshold_secs: i64,
) -> Vec<HourBucket> {
    hourly_distribution_in(timeline, track, gap_threshold_secs, &Local)
}

/// When during the day a track (or anything, with `track == None`) gets played.
///
/// Each hour's count is normalized by how many plays were recorded at that
/// hour at all, so hours the collector rarely saw aren't penalized. The
/// coverage columns come from the timeline's capture intervals and
/// normalize by observed time instead of sample count.
pub fn hourly_distribution_in<Tz: TimeZone>(
    timeline: &Timeline,
    track: Option<&TrackId>,
    gap_threshold_secs: i64,
    tz: &Tz,
) -> Vec<HourBucket> {
    let mut plays = [0usize; 24];
    let mut observations = [0usize; 24];

    for play in timeline {
        let hour = hour_of_day(play.timestamp(), tz) as usize;
        observations[hour] += 1;
        if track.is_none_or(|id| play.is(id)) {
            plays[hour] += 1;
        }
    }

    let intervals = capture_intervals(timeline, gap_threshold_secs);
    let covered = covered_seconds_by_hour(&intervals, tz);

    (0..24)
        .map(|h| {
            let observed_secs = covered[h];
            HourBucket {
                hour: h as u32,
                plays: plays[h],
                observations: observations[h],
                relative: (observations[h] > 0)
                    .then(|| plays[h] as f64 / observations[h] as f64),
                observed_secs,
                plays_per_observed_hour: (observed_secs > 0)
                    .then(|| plays[h] as f64 / (observed_secs as f64 / 3600.0)),
            }
        })
        .collect()
}

/// Average popularity index of the plays heard in each hour of the day.
///
/// Answers "during which hour is the most popular music played". Hours
/// without plays are `None`.
pub fn hourly_popularity_in<Tz: TimeZone>(timeline: &Timeline, tz: &Tz) -> [Option<f64>; 24] {
    let index: HashMap<TrackId, f64> = popularity_indices(timeline)
        .into_iter()
        .map(|p| (p.track, p.frequency))
        .collect();

    let mut sums = [0.0f64; 24];
    let mut counts = [0usize; 24];
    for play in timeline {
        let hour = hour_of_day(play.timestamp(), tz) as usize;
        sums[hour] += index.get(&play.identity()).copied().unwrap_or(0.0);
        counts[hour] += 1;
    }

    let mut out = [None; 24];
    for h in 0..24 {
        if counts[h] > 0 {
            out[h] = Some(sums[h] / counts[h] as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use chrono::Utc;

    fn play(title: &str, ts: f64) -> Observation {
        Observation::new(title, "Artist", "Album", "X", Some(ts))
    }

    #[test]
    fn test_even_split() {
        let mut plays = Vec::new();
        for i in 0..5 {
            plays.push(play("A", i as f64 * 200.0));
            plays.push(play("B", i as f64 * 200.0 + 100.0));
        }
        let indices = popularity_indices(&Timeline::from_plays(plays));
        assert_eq!(indices.len(), 2);
        for idx in &indices {
            assert!((idx.frequency - 0.5).abs() < 1e-12);
        }
        // Tie keeps first-seen order
        assert_eq!(indices[0].track.title, "A");
    }

    #[test]
    fn test_sorted_descending_and_sums_to_one() {
        let t = Timeline::from_plays(vec![
            play("A", 0.0),
            play("B", 1.0),
            play("B", 2.0),
            play("C", 3.0),
            play("B", 4.0),
        ]);
        let indices = popularity_indices(&t);
        assert_eq!(indices[0].track.title, "B");
        assert!((indices[0].frequency - 0.6).abs() < 1e-12);
        let sum: f64 = indices.iter().map(|i| i.frequency).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        assert_eq!(most_popular(&t, 1).len(), 1);
        assert_eq!(most_popular(&t, 0).len(), 3);
    }

    #[test]
    fn test_top_popularity_agrees_with_most_popular() {
        let t = Timeline::from_plays(vec![
            play("A", 0.0),
            play("B", 1.0),
            play("B", 2.0),
            play("C", 3.0),
        ]);
        let top = top_popularity(&t, 2);
        let titles: Vec<&str> = top.iter().map(|i| i.track.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
        assert!((top[0].frequency - 0.5).abs() < 1e-12);

        let tracks: Vec<TrackId> = top.into_iter().map(|i| i.track).collect();
        assert_eq!(tracks, most_popular(&t, 2));
        assert_eq!(top_popularity(&t, 0).len(), 3);
        assert_eq!(top_popularity(&t, 10).len(), 3);
    }

    #[test]
    fn test_empty_timeline() {
        assert!(popularity_indices(&Timeline::new()).is_empty());
        let buckets = hourly_distribution_in(&Timeline::new(), None, 720, &Utc);
        assert_eq!(buckets.len(), 24);
        assert!(buckets.iter().all(|b| b.relative.is_none() && b.observed_secs == 0));
    }

    #[test]
    fn test_hourly_normalized_by_observations() {
        // Hour 0: A, B, B, B   Hour 1: A
        let t = Timeline::from_plays(vec![
            play("A", 0.0),
            play("B", 300.0),
            play("B", 600.0),
            play("B", 900.0),
            play("A", 3_700.0),
        ]);
        let a = t.as_slice()[0].identity();
        let buckets = hourly_distribution_in(&t, Some(&a), 720, &Utc);

        assert_eq!(buckets[0].plays, 1);
        assert_eq!(buckets[0].observations, 4);
        assert_eq!(buckets[0].relative, Some(0.25));
        assert_eq!(buckets[1].relative, Some(1.0));
        assert_eq!(buckets[5].relative, None);

        // Coverage: [0, 900] then a gap, then the lone play at 3700.
        assert_eq!(buckets[0].observed_secs, 900);
        assert_eq!(buckets[1].observed_secs, 0);
        assert_eq!(buckets[0].plays_per_observed_hour, Some(4.0));
        assert_eq!(buckets[1].plays_per_observed_hour, None);
    }

    #[test]
    fn test_hourly_popularity() {
        let t = Timeline::from_plays(vec![
            play("A", 0.0),
            play("A", 10.0),
            play("A", 20.0),
            play("B", 3_600.0),
        ]);
        let by_hour = hourly_popularity_in(&t, &Utc);
        assert!((by_hour[0].unwrap() - 0.75).abs() < 1e-12);
        assert!((by_hour[1].unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(by_hour[2], None);
    }
}
