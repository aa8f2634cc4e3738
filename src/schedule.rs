//! Pacing of new links for the downstream consumer.
//!
//! A batch of N links is spread evenly over a window starting now: the first
//! record is due immediately, the last at `now + window`, and the rest at
//! `window / (N - 1)` intervals in between. A single link is due now.
//!
//! Nothing here runs anything at those times; the consumer reading the queue
//! honors them.

use crate::models::ScheduledRecord;
use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

pub const DEFAULT_WINDOW_MINUTES: i64 = 180;
/// One week.
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;
pub const DEFAULT_TAG: &str = "formula";

/// Which link gets which slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Lexicographic by URL; reproducible.
    #[default]
    Sorted,
    /// Random permutation, so one site's links do not cluster together.
    Shuffled,
}

/// Assign evenly spaced timestamps in `[now, now + window]` to `links`.
///
/// Timestamps are handed out by position, so the returned records are always
/// in non-decreasing time order whichever [`Order`] picked the links.
pub fn assign(
    links: &BTreeSet<String>,
    window: TimeDelta,
    tag: &str,
    order: Order,
    now: DateTime<Utc>,
) -> Vec<ScheduledRecord> {
    let mut ordered: Vec<&String> = links.iter().collect();
    if order == Order::Shuffled {
        ordered.shuffle(&mut rand::rng());
    }

    let step = step_for(ordered.len(), window);
    ordered
        .into_iter()
        .zip(0i32..)
        .map(|(url, i)| ScheduledRecord {
            url: url.clone(),
            tag: tag.to_string(),
            scheduled_time: now
                .checked_add_signed(step * i)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            title: None,
        })
        .collect()
}

fn step_for(count: usize, window: TimeDelta) -> TimeDelta {
    match i32::try_from(count) {
        Ok(n) if n > 1 => window / (n - 1),
        _ => TimeDelta::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn links(n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("https://site.com/news/{i:03}")).collect()
    }

    fn window() -> TimeDelta {
        TimeDelta::minutes(DEFAULT_WINDOW_MINUTES)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_three_links_span_window() {
        let records = assign(&links(3), window(), "formula", Order::Sorted, now());
        let times: Vec<_> = records.iter().map(|r| r.scheduled_time).collect();
        assert_eq!(
            times,
            vec![
                now(),
                now() + TimeDelta::minutes(90),
                now() + TimeDelta::hours(3),
            ]
        );
        assert!(records.iter().all(|r| r.tag == "formula"));
        assert_eq!(records[0].url, "https://site.com/news/000");
        assert_eq!(records[2].url, "https://site.com/news/002");
    }

    #[test]
    fn test_single_link_is_due_now() {
        let records = assign(&links(1), window(), "formula", Order::Sorted, now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scheduled_time, now());
    }

    #[test]
    fn test_empty_batch() {
        assert!(assign(&links(0), window(), "formula", Order::Sorted, now()).is_empty());
    }

    #[test]
    fn test_uneven_step_stays_inside_window() {
        // 3h / 7 does not divide evenly into whole nanoseconds.
        let window = TimeDelta::hours(3);
        let records = assign(&links(8), window, "formula", Order::Sorted, now());
        for pair in records.windows(2) {
            assert!(pair[0].scheduled_time < pair[1].scheduled_time);
        }
        for r in &records {
            assert!(r.scheduled_time >= now());
            assert!(r.scheduled_time <= now() + window);
        }
        let last = records.last().unwrap().scheduled_time;
        assert!(now() + window - last < TimeDelta::seconds(1));
    }

    #[test]
    fn test_oversized_window_saturates_instead_of_overflowing() {
        let records = assign(&links(2), TimeDelta::MAX, "formula", Order::Sorted, now());
        assert_eq!(records[0].scheduled_time, now());
        assert_eq!(records[1].scheduled_time, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_shuffled_keeps_every_link_and_time_order() {
        let input = links(25);
        let records = assign(&input, window(), "formula", Order::Shuffled, now());
        let urls: BTreeSet<String> = records.iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls, input);
        for pair in records.windows(2) {
            assert!(pair[0].scheduled_time <= pair[1].scheduled_time);
        }
        assert_eq!(records[0].scheduled_time, now());
        assert_eq!(records[24].scheduled_time, now() + window());
    }
}
