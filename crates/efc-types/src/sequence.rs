//! Position arithmetic for a course's chapter sequence.
//!
//! Chapters of one course occupy indices `1..=N` exactly once each. Neighbours
//! are derived from the index, never stored.

/// Index of the chapter before `index` (0 when `index` is the first chapter).
pub fn prev_index(index: i64) -> i64 {
    index - 1
}

/// Index of the chapter after `index` (N + 1 when `index` is the last chapter).
pub fn next_index(index: i64) -> i64 {
    index + 1
}

/// True when `sorted` is exactly `[1, 2, .., N]`.
pub fn is_contiguous(sorted: &[i64]) -> bool {
    sorted
        .iter()
        .enumerate()
        .all(|(pos, &idx)| idx == pos as i64 + 1)
}

/// Where a chapter inserted after `after_index` lands in a course of `count`
/// chapters, or `None` when the anchor is outside `0..=count`.
pub fn insertion_point(after_index: i64, count: i64) -> Option<i64> {
    (0..=count).contains(&after_index).then_some(after_index + 1)
}

/// Resolves a requested chapter position to one that exists, with a notice
/// when the request ran off either end.
pub fn clamp_view(requested: i64, count: i64) -> (i64, Option<&'static str>) {
    if requested < 1 {
        (1, Some("already the first chapter"))
    } else if requested > count {
        (count, Some("already the last chapter"))
    } else {
        (requested, None)
    }
}
