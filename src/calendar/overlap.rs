//! Half-open interval arithmetic.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// True iff `[start_a, end_a)` and `[start_b, end_b)` intersect.
///
/// Touching intervals do not overlap. Callers guarantee `start < end` for
/// both intervals; anything else is validated before reaching here.
pub fn overlaps(
    start_a: DateTime<Utc>,
    end_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    end_b: DateTime<Utc>,
) -> bool {
    start_a < end_b && end_a > start_b
}

/// A half-open `[start, end)` time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, returning `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_overlap_by_one_minute() {
        assert!(overlaps(at(10, 0), at(11, 0), at(10, 59), at(12, 0)));
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        assert!(!overlaps(at(10, 0), at(11, 0), at(11, 0), at(12, 0)));
        assert!(!overlaps(at(11, 0), at(12, 0), at(10, 0), at(11, 0)));
    }

    #[test]
    fn test_disjoint_and_nested() {
        assert!(!overlaps(at(8, 0), at(9, 0), at(10, 0), at(11, 0)));
        assert!(overlaps(at(8, 0), at(18, 0), at(10, 0), at(11, 0)));
        assert!(overlaps(at(10, 0), at(11, 0), at(8, 0), at(18, 0)));
    }

    #[test]
    fn test_overlap_is_symmetric_over_grid() {
        let points: Vec<_> = (0..6).map(|h| at(8 + h, 0)).collect();
        for a in 0..points.len() {
            for b in (a + 1)..points.len() {
                for c in 0..points.len() {
                    for d in (c + 1)..points.len() {
                        let (sa, ea, sb, eb) = (points[a], points[b], points[c], points[d]);
                        let expected = !(ea <= sb || eb <= sa);
                        assert_eq!(overlaps(sa, ea, sb, eb), expected);
                        assert_eq!(overlaps(sb, eb, sa, ea), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_time_range_rejects_empty() {
        assert!(TimeRange::new(at(10, 0), at(10, 0)).is_none());
        assert!(TimeRange::new(at(11, 0), at(10, 0)).is_none());
        let range = TimeRange::new(at(10, 0), at(10, 30)).unwrap();
        assert_eq!(range.duration(), TimeDelta::minutes(30));
    }
}
