//! Keystroke debouncing for type-ahead callers.
//!
//! The engine answers every query it is given; it is up to the caller to
//! hold back until typing pauses. `Debouncer` is a small clock-driven state
//! machine: feed it each keystroke with [`Debouncer::push`] and ask
//! [`Debouncer::poll`] on every tick whether a query is due.

use std::time::{Duration, Instant};

use crate::config::SearchConfig;

/// Shortest quiescence period accepted.
pub const MIN_QUIESCENCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiescence: Duration,
    pending: Option<(String, Instant)>,
    last_emitted: Option<String>,
}

impl Debouncer {
    /// Periods below [`MIN_QUIESCENCE`] are raised to it.
    pub fn new(quiescence: Duration) -> Self {
        Self {
            quiescence: quiescence.max(MIN_QUIESCENCE),
            pending: None,
            last_emitted: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Uses `[search] debounce_ms`.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::from_millis(config.debounce_ms)
    }

    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    /// Record the current input. Restarts the quiescence timer.
    pub fn push(&mut self, input: impl Into<String>, now: Instant) {
        self.pending = Some((input.into(), now));
    }

    /// The input to search for, once typing has paused long enough.
    ///
    /// Returns `None` while the timer is running, when nothing is pending,
    /// or when the settled input equals the one last returned.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let (_, at) = self.pending.as_ref()?;
        if now.saturating_duration_since(*at) < self.quiescence {
            return None;
        }
        let (input, _) = self.pending.take()?;
        if self.last_emitted.as_deref() == Some(input.as_str()) {
            return None;
        }
        self.last_emitted = Some(input.clone());
        Some(input)
    }

    /// Forget pending and previously emitted input.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_emitted = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(MIN_QUIESCENCE)
    }
}
