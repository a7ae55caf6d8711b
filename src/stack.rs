//! Native stack growth for the recursive passes.
//!
//! Parser, resolver and evaluator all recurse once per nesting level of the
//! source, so deeply nested input would otherwise overflow the thread's
//! stack before any of them could report an error.

/// If less than this much stack remains, grow it before recursing.
const RED_ZONE: usize = 100 * 1024; // 100KB

/// Size of each additional stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024; // 1MB

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
