//! League ranking
use std::cmp::Ordering;

use crate::record::PerformanceRecord;

/// Descending by wins, then total point difference, then total points.
pub fn compare(a: &PerformanceRecord, b: &PerformanceRecord) -> Ordering {
    b.number_of_wins
        .cmp(&a.number_of_wins)
        .then_with(|| b.total_point_difference.cmp(&a.total_point_difference))
        .then_with(|| b.total_points.cmp(&a.total_points))
}

/// Order `records` best first. Exact ties keep their input order.
pub fn standings<'a, I>(records: I) -> Vec<(&'a str, &'a PerformanceRecord)>
where
    I: IntoIterator<Item = (&'a str, &'a PerformanceRecord)>,
{
    let mut ordered: Vec<_> = records.into_iter().collect();
    // sort_by is stable
    ordered.sort_by(|(_, a), (_, b)| compare(a, b));
    ordered
}

/// 1-based position of `target` in the standings, or `None` if absent.
pub fn rank<'a, I>(records: I, target: &str) -> Option<usize>
where
    I: IntoIterator<Item = (&'a str, &'a PerformanceRecord)>,
{
    standings(records)
        .iter()
        .position(|(player, _)| *player == target)
        .map(|idx| idx + 1)
}
