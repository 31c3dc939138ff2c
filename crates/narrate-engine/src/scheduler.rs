//! Lookahead buffering policy.
//!
//! The scheduler decides which segment to generate next so that a budget of
//! contiguous playable audio stays ahead of the play head. It does not run
//! generations itself: the controller asks it for a target, issues the
//! generation, and reports back. That keeps every cache write on the
//! controller task and at most one generation in flight.

use std::time::Duration;

use narrate_core::{GenerationKey, PlaybackPosition};

use crate::cache::ParagraphCache;

/// What to do after a background generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then call [`BufferScheduler::backoff_elapsed`] with this ticket.
    Backoff { delay: Duration, ticket: u64 },
    /// Consecutive failure cap reached; idle until re-armed.
    GiveUp { failures: u32 },
}

/// Background lookahead state.
#[derive(Debug, Default)]
pub struct BufferScheduler {
    armed: bool,
    failures: u32,
    backoff: Option<u64>,
    next_ticket: u64,
}

impl BufferScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next segment to generate ahead of `position`.
    ///
    /// 1. Within the current paragraph, the first ungenerated segment at or
    ///    after the play head while the contiguous runway is below budget.
    /// 2. Otherwise the next paragraph's first ungenerated segment while its
    ///    generated total is below budget.
    /// 3. Otherwise nothing.
    pub fn next_target(
        cache: &mut ParagraphCache,
        position: PlaybackPosition,
        budget: Duration,
    ) -> Option<GenerationKey> {
        let PlaybackPosition { paragraph, segment } = position;

        let runway = cache.buffered_duration_from(paragraph, segment);
        if runway < budget && !cache.is_fully_buffered(paragraph) {
            if let Some(missing) = cache.first_missing_from(paragraph, segment) {
                return Some(GenerationKey::new(paragraph, missing));
            }
        }

        let next = paragraph + 1;
        if next < cache.paragraph_count() && cache.total_buffered(next) < budget {
            return cache
                .first_missing(next)
                .map(|missing| GenerationKey::new(next, missing));
        }

        None
    }

    /// Start (or restart) lookahead. Clears the failure count.
    pub fn arm(&mut self) {
        if !self.armed {
            tracing::debug!("Lookahead armed");
        }
        self.armed = true;
        self.failures = 0;
    }

    /// Stop issuing work until the next [`arm`](Self::arm).
    pub fn idle(&mut self) {
        if self.armed {
            tracing::debug!("Lookahead idle");
        }
        self.armed = false;
    }

    /// Session cancelled: idle and forget any pending backoff.
    pub fn cancel(&mut self) {
        self.idle();
        self.backoff = None;
        self.failures = 0;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub const fn is_backing_off(&self) -> bool {
        self.backoff.is_some()
    }

    /// Whether a new background generation may be issued now.
    #[must_use]
    pub const fn can_issue(&self) -> bool {
        self.armed && self.backoff.is_none()
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count a failed background generation.
    ///
    /// `max_retries` of `None` never gives up.
    pub fn record_failure(&mut self, backoff: Duration, max_retries: Option<u32>) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);

        if max_retries.is_some_and(|max| self.failures >= max) {
            let failures = self.failures;
            self.idle();
            self.backoff = None;
            return RetryDecision::GiveUp { failures };
        }

        self.next_ticket += 1;
        self.backoff = Some(self.next_ticket);
        RetryDecision::Backoff {
            delay: backoff,
            ticket: self.next_ticket,
        }
    }

    /// A backoff timer fired. Returns `false` for a stale ticket.
    pub fn backoff_elapsed(&mut self, ticket: u64) -> bool {
        if self.backoff == Some(ticket) {
            self.backoff = None;
            true
        } else {
            false
        }
    }
}
