//! Process-wide logical clock used for change tracking
//!
//! Timestamps are not wall-clock time. They only ever increase, so comparing
//! two of them tells you which event happened later. The first value handed
//! out is larger than zero, which means anything still carrying a
//! default-initialized timestamp always compares as out of date.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::types::Timestamp;

/// Seed value; the first call to [`timestamp`] returns `SEED + 1`
const SEED: Timestamp = 100;

static TIME: AtomicU32 = AtomicU32::new(SEED);

/// Return a timestamp strictly greater than every previously returned one.
///
/// # Panics
/// Panics if the 32-bit counter is exhausted.
pub fn timestamp() -> Timestamp {
    let previous = TIME
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| t.checked_add(1))
        .unwrap_or_else(|_| panic!("logical clock exhausted"));
    previous + 1
}

/// Last timestamp handed out, without advancing the clock.
pub fn current_time() -> Timestamp {
    TIME.load(Ordering::SeqCst)
}
