//! Derived date ranges for lanes.
//!
//! A lane caches the `[min, max]` of its live events' dates for display.
//! The cached bounds are never a source of truth: they are recomputed from
//! the event set after every mutation that could change it (see
//! [`crate::recompute`]) and formatted here for gallery headers and share
//! pages.

use chrono::{Datelike, NaiveDate};

/// Compute the `[min, max]` date bounds over a set of event dates.
///
/// Returns `None` for an empty set; a lane with no live events carries null
/// bounds. Insertion order is irrelevant since only the extremes matter.
pub fn compute_date_range(dates: &[NaiveDate]) -> Option<(NaiveDate, NaiveDate)> {
    let start = dates.iter().min()?;
    let end = dates.iter().max()?;
    Some((*start, *end))
}

/// Format a date range for display.
///
/// - no range: `"No events yet"`
/// - same month: `"January 2023"`
/// - same year: `"January - June 2023"`
/// - different years: `"November 2022 - February 2023"`
pub fn format_date_range(range: Option<(NaiveDate, NaiveDate)>) -> String {
    let Some((start, end)) = range else {
        return "No events yet".to_string();
    };

    if start.year() == end.year() {
        if start.month() == end.month() {
            start.format("%B %Y").to_string()
        } else {
            format!("{} - {}", start.format("%B"), end.format("%B %Y"))
        }
    } else {
        format!("{} - {}", start.format("%B %Y"), end.format("%B %Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::next_position;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_is_min_max_regardless_of_order() {
        let dates = vec![date(2023, 1, 5), date(2023, 6, 20), date(2023, 3, 1)];
        assert_eq!(
            compute_date_range(&dates),
            Some((date(2023, 1, 5), date(2023, 6, 20)))
        );

        let reversed: Vec<NaiveDate> = dates.into_iter().rev().collect();
        assert_eq!(
            compute_date_range(&reversed),
            Some((date(2023, 1, 5), date(2023, 6, 20)))
        );
    }

    #[test]
    fn test_empty_set_has_no_range() {
        assert_eq!(compute_date_range(&[]), None);
    }

    #[test]
    fn test_single_event_collapses_bounds() {
        let dates = vec![date(2024, 2, 29)];
        assert_eq!(
            compute_date_range(&dates),
            Some((date(2024, 2, 29), date(2024, 2, 29)))
        );
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let dates = vec![date(2023, 1, 5), date(2023, 6, 20)];
        let first = compute_date_range(&dates);
        let second = compute_date_range(&dates);
        assert_eq!(first, second);
    }

    #[test]
    fn test_format_no_events() {
        assert_eq!(format_date_range(None), "No events yet");
    }

    #[test]
    fn test_format_same_month() {
        let range = Some((date(2023, 1, 5), date(2023, 1, 20)));
        assert_eq!(format_date_range(range), "January 2023");
    }

    #[test]
    fn test_format_same_year() {
        let range = Some((date(2023, 1, 5), date(2023, 6, 20)));
        assert_eq!(format_date_range(range), "January - June 2023");
    }

    #[test]
    fn test_format_across_years() {
        let range = Some((date(2022, 11, 1), date(2023, 2, 1)));
        assert_eq!(format_date_range(range), "November 2022 - February 2023");
    }

    /// An in-memory event row for the scenario below.
    struct EventRow {
        id: Uuid,
        position: i32,
        event_date: NaiveDate,
        deleted: bool,
    }

    fn live_positions(rows: &[EventRow]) -> Vec<i32> {
        rows.iter()
            .filter(|r| !r.deleted)
            .map(|r| r.position)
            .collect()
    }

    fn live_dates(rows: &[EventRow]) -> Vec<NaiveDate> {
        rows.iter()
            .filter(|r| !r.deleted)
            .map(|r| r.event_date)
            .collect()
    }

    /// Walks the lane lifecycle: create, append three events, soft-delete
    /// one, recomputing the range at each step.
    #[test]
    fn test_lane_lifecycle_scenario() {
        let mut rows: Vec<EventRow> = Vec::new();

        // Empty lane: null bounds
        assert_eq!(compute_date_range(&live_dates(&rows)), None);

        // Append A, B, C in that order
        for event_date in [date(2023, 3, 1), date(2023, 1, 10), date(2023, 5, 5)] {
            let position = next_position(&live_positions(&rows), 1);
            rows.push(EventRow {
                id: Uuid::new_v4(),
                position,
                event_date,
                deleted: false,
            });
        }

        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(
            compute_date_range(&live_dates(&rows)),
            Some((date(2023, 1, 10), date(2023, 5, 5)))
        );

        // Soft-delete B; it disappears from both computations
        let b_id = rows[1].id;
        rows.iter_mut().find(|r| r.id == b_id).unwrap().deleted = true;

        assert_eq!(live_positions(&rows), vec![1, 3]);
        assert_eq!(
            compute_date_range(&live_dates(&rows)),
            Some((date(2023, 3, 1), date(2023, 5, 5)))
        );

        // The next append still lands past the deleted sibling's position
        assert_eq!(next_position(&live_positions(&rows), 1), 4);
    }
}
