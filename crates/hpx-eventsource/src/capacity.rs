//! Growth planning for the parser's working buffer.
//!
//! The buffer grows geometrically so a stream made of many small chunks only
//! reallocates a logarithmic number of times, but a single oversized line can
//! never make it over-allocate by more than a fixed ceiling.

/// Decide whether a buffer must grow, and to what capacity.
///
/// Returns `None` when `required_capacity` already fits in
/// `current_capacity`. Otherwise returns the capacity to allocate, which is
/// the doubled current capacity (or exactly `required_capacity` for a buffer
/// that does not exist yet), raised to `required_capacity` if doubling falls
/// short and capped at `required_capacity + max_over_allocation`.
///
/// # Examples
///
/// ```
/// use hpx_eventsource::capacity::plan_capacity;
///
/// assert_eq!(plan_capacity(16, 8, 1024), None);
/// assert_eq!(plan_capacity(16, 20, 1024), Some(32));
/// assert_eq!(plan_capacity(16, 100, 1024), Some(100));
/// assert_eq!(plan_capacity(4096, 4097, 10), Some(4107));
/// ```
#[must_use]
pub fn plan_capacity(
    current_capacity: usize,
    required_capacity: usize,
    max_over_allocation: usize,
) -> Option<usize> {
    if required_capacity <= current_capacity {
        return None;
    }

    let doubled = if current_capacity == 0 {
        required_capacity
    } else {
        current_capacity.saturating_mul(2)
    };
    let candidate = doubled.max(required_capacity);

    if candidate - required_capacity > max_over_allocation {
        Some(required_capacity.saturating_add(max_over_allocation))
    } else {
        Some(candidate)
    }
}
