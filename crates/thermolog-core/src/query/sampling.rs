//! Index lookup and downsampling over a sensor's reading history.

use chrono::{DateTime, Duration, Utc};
use thermolog_storage::Reading;

/// Index of the reading closest to `target`.
///
/// Readings are assumed to arrive about every `interval`, so the position is
/// first estimated from the distance to the newest reading and then refined by
/// stepping to a neighbor while the time difference strictly shrinks. The
/// result is a local approximation when sampling was irregular.
pub fn nearest_index(
    readings: &[Reading],
    target: DateTime<Utc>,
    interval: Duration,
) -> Option<usize> {
    let last = readings.len().checked_sub(1)?;
    let interval_ms = interval.num_milliseconds().max(1);

    let behind_ms = (readings[last].timestamp - target).num_milliseconds();
    let steps_back = behind_ms / interval_ms;
    let estimate = (last as i64).saturating_sub(steps_back).clamp(0, last as i64) as usize;

    let distance = |i: usize| {
        (readings[i].timestamp - target)
            .num_milliseconds()
            .unsigned_abs()
    };

    let mut index = estimate;
    let mut best = distance(index);
    loop {
        let left = index.checked_sub(1).map(|i| (i, distance(i)));
        let right = (index < last).then(|| (index + 1, distance(index + 1)));

        match [left, right].into_iter().flatten().min_by_key(|&(_, d)| d) {
            Some((i, d)) if d < best => {
                index = i;
                best = d;
            }
            _ => break,
        }
    }

    Some(index)
}

/// Readings between the ones nearest to `start` and `end`, both included.
pub fn select_range(
    readings: &[Reading],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
) -> &[Reading] {
    match (
        nearest_index(readings, start, interval),
        nearest_index(readings, end, interval),
    ) {
        (Some(from), Some(to)) if from <= to => &readings[from..=to],
        _ => &[],
    }
}

/// Reduce `items` to at most `max_points` elements taken at a fixed stride of
/// `len / max_points`, starting with the first.
///
/// Slices within budget are returned unchanged; a budget of zero is treated
/// as one.
pub fn downsample<T: Clone>(items: &[T], max_points: usize) -> Vec<T> {
    let max_points = max_points.max(1);
    let len = items.len();
    if len <= max_points {
        return items.to_vec();
    }

    (0..max_points)
        .map(|k| items[k * len / max_points].clone())
        .collect()
}
