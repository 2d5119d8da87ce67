//! Small helpers shared across the agent modules.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

/// Return a shuffled copy of `items`. Always a permutation of the input.
pub fn shuffle<T: Clone>(items: &[T]) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(&mut OsRng);
    out
}

/// Truncate `s` to at most `max` characters, appending an ellipsis marker
/// when anything was cut. Char-boundary safe.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
