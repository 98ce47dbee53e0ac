//! Time-ordered identifier generation.
//!
//! Identifiers look like `20260806_142530_004211_0007`: a UTC timestamp at
//! microsecond resolution followed by a four-hex-digit monotonic counter.
//! The timestamp prefix keeps identifiers lexically sortable by creation
//! time; the counter suffix makes two calls in the same microsecond distinct,
//! so identifiers never collide within a process run.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide identifier source. Shared behind an `Arc`; `next` takes
/// `&self` and is safe to call from any number of tasks.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next identifier.
    pub fn next(&self) -> String {
        let now = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) & 0xffff;
        format!("{}_{:04x}", now.format("%Y%m%d_%H%M%S_%6f"), seq)
    }
}
