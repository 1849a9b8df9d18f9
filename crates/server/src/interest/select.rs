//! Nearest-player selection.

use glam::DVec2;

/// A ready player that could be shown to a viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: u32,
    pub position: DVec2,
}

/// Pick up to `max` candidates within `radius` of `origin`, nearest first.
///
/// Ties are broken by id so the result does not depend on iteration order.
pub fn select_nearest(
    origin: DVec2,
    candidates: impl IntoIterator<Item = Candidate>,
    radius: f64,
    max: usize,
) -> Vec<u32> {
    let mut in_range: Vec<(f64, u32)> = candidates
        .into_iter()
        .map(|c| (origin.distance(c.position), c.id))
        .filter(|(distance, _)| *distance <= radius)
        .collect();

    in_range.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    in_range.truncate(max);
    in_range.into_iter().map(|(_, id)| id).collect()
}
