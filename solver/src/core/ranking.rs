//! Candidate ordering for solution search.

use std::cmp::Ordering;

/// Stable sort by descending rate; equal rates keep their relative order.
pub fn sort_by_rate_desc<T>(items: &mut [T], rate: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| rate(b).partial_cmp(&rate(a)).unwrap_or(Ordering::Equal));
}
