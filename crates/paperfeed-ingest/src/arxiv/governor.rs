//! Backoff governor
//!
//! The query API sometimes answers with short or empty pages while it is
//! throttling. The governor turns those answers into bounded, shrinking
//! pauses. A single counter is both the number of retries left and the
//! length of the next pause in minutes; any full page refills it.

use std::time::Duration;

/// What the controller does with the cursor after a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    /// Move past the page just fetched
    Advance,
    /// Fetch the same offset again
    Hold,
}

/// Outcome of assessing one fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Full page: advance the cursor and fetch again immediately
    Continue,
    /// Short or empty page with retries left
    Pause { wait: Duration, cursor: CursorMove },
    /// Retries exhausted
    Stop,
}

#[derive(Debug, Clone)]
pub struct BackoffGovernor {
    max_retries: u32,
    remaining: u32,
}

impl BackoffGovernor {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            remaining: max_retries,
        }
    }

    /// Retries left, which is also the next pause length in minutes
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Assess a page of `page_size` records fetched with `requested` as limit.
    ///
    /// A short page holds the cursor so the same offset is asked again; an
    /// empty page moves past it.
    pub fn assess(&mut self, page_size: usize, requested: u32) -> Verdict {
        if page_size >= requested as usize && page_size > 0 {
            self.remaining = self.max_retries;
            return Verdict::Continue;
        }

        if self.remaining == 0 {
            return Verdict::Stop;
        }

        self.remaining -= 1;
        let cursor = if page_size == 0 {
            CursorMove::Advance
        } else {
            CursorMove::Hold
        };

        Verdict::Pause {
            wait: Duration::from_secs(u64::from(self.remaining) * 60),
            cursor,
        }
    }
}
