//! Generic "first match wins" combinator.
//!
//! The extractor and the element resolver share the same shape: an ordered
//! list of interchangeable algorithms tried in sequence until one produces a
//! result. The ordered list itself is plain data; this module provides the
//! driver for the synchronous case. (The resolver's strategies are async and
//! iterate their order list with the same first-hit contract.)

/// A named attempt: `try_apply` returns `Some` on success, `None` to pass.
pub type NamedStrategy<'a, I, O> = (&'static str, &'a dyn Fn(&I) -> Option<O>);

/// Run `strategies` in order against `input`; return the first hit together
/// with the name of the strategy that produced it.
pub fn first_match<I, O>(input: &I, strategies: &[NamedStrategy<'_, I, O>]) -> Option<(&'static str, O)> {
    for (name, strategy) in strategies {
        if let Some(out) = strategy(input) {
            tracing::trace!(target: "agent.strategy", strategy = name, "strategy matched");
            return Some((name, out));
        }
    }
    None
}
