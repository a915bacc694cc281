//! Attempt limiter for sensitive TypeSecure operations.
//!
//! Caps how many times a caller may attempt something (a login, a
//! sign-up) within a time window, to blunt credential guessing.
//!
//! # Window model
//!
//! The window is "sliding-start": it opens at the first permitted
//! attempt and, once `window` has elapsed since that instant, the next
//! check discards it entirely and starts over. This is O(1) memory
//! (two timestamps and a counter) instead of a log of every attempt.
//!
//! ```text
//!  attempt:  1  2  3  4  5  6(denied) ............ 7(permitted, count=1)
//!  time:     |<-------------- window -------------->|
//!            ^ window_start                          ^ window reset
//! ```
//!
//! # Time source
//!
//! All timestamps are [`tokio::time::Instant`], so tests can pause the
//! runtime clock and drive the window with `tokio::time::advance`.
//! Outside a paused runtime it behaves like `std::time::Instant`.
//!
//! The limiter never errors and never panics; it only answers
//! booleans and integers. Turning a denial into a user-facing message
//! is the caller's job.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limits for one class of guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Attempts permitted per window.
    pub max_attempts: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Guards a single class of operation.
///
/// One limiter per operation class; don't share an instance between
/// unrelated operations or they will starve each other.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    attempts: u32,
    /// Start of the open window. `None` until the first permitted
    /// attempt, and again after [`reset`](Self::reset) or expiry.
    window_start: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Creates a limiter with no attempts recorded.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window: config.window(),
            attempts: 0,
            window_start: None,
            last_attempt: None,
        }
    }

    /// Consumes one attempt if the limit allows it.
    ///
    /// If the open window has run its full length, it is discarded
    /// first. A denied call changes nothing: the count isn't bumped
    /// and the window doesn't move, so a caller hammering a closed gate
    /// can't push its own reopening further out.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.expire_window(now);

        if self.attempts >= self.max_attempts {
            trace!(
                attempts = self.attempts,
                max = self.max_attempts,
                "attempt denied"
            );
            return false;
        }

        self.attempts += 1;
        self.window_start.get_or_insert(now);
        self.last_attempt = Some(now);
        trace!(attempts = self.attempts, max = self.max_attempts, "attempt permitted");
        true
    }

    /// Whole seconds until the window reopens, rounded up.
    ///
    /// 0 when no window is open or it has already run out.
    pub fn remaining_cooldown_secs(&self) -> u64 {
        let Some(start) = self.window_start else {
            return 0;
        };
        let elapsed = Instant::now().saturating_duration_since(start);
        if elapsed >= self.window {
            return 0;
        }
        let remaining = self.window - elapsed;
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    /// Forgets all attempts. Meant for administrative resets and test
    /// setup, never called by the login path itself.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.window_start = None;
        self.last_attempt = None;
        debug!("rate limiter reset");
    }

    /// Attempts counted in the current window.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured ceiling per window.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the most recent permitted attempt happened.
    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// `true` when no window is open or it has run out, i.e. the
    /// limiter holds nothing worth keeping.
    pub fn is_idle(&self) -> bool {
        match self.window_start {
            None => true,
            Some(start) => start.elapsed() >= self.window,
        }
    }

    fn expire_window(&mut self, now: Instant) {
        if let Some(start) = self.window_start {
            if now.saturating_duration_since(start) >= self.window {
                debug!(
                    attempts = self.attempts,
                    "rate limit window elapsed, starting over"
                );
                self.attempts = 0;
                self.window_start = None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// KeyedRateLimiter
// ---------------------------------------------------------------------------

/// One independent [`RateLimiter`] per key (per address, per client...).
///
/// Limiters are created lazily on first use. Call [`prune`](Self::prune)
/// now and then to drop keys whose window has run out.
///
/// # Bounded key count
///
/// Without a cap the map grows by one entry per distinct key seen
/// within a window. [`with_max_keys`](Self::with_max_keys) sets a hard
/// ceiling: a new key arriving at the ceiling first triggers a prune,
/// and if every tracked key is still inside its window the new key is
/// denied until one of them runs out. Tracked keys are never evicted,
/// so cycling through fresh keys can't reset a key's budget.
#[derive(Debug, Clone)]
pub struct KeyedRateLimiter<K> {
    config: RateLimitConfig,
    limiters: HashMap<K, RateLimiter>,
    max_keys: Option<usize>,
}

impl<K: Hash + Eq + Clone> KeyedRateLimiter<K> {
    /// Creates an empty keyed limiter; every key gets `config`. The
    /// number of keys is unbounded.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: HashMap::new(),
            max_keys: None,
        }
    }

    /// Caps the number of tracked keys at `max_keys`.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    /// [`RateLimiter::try_acquire`] for `key`.
    ///
    /// An untracked key is denied while the limiter is at its key
    /// ceiling and nothing can be pruned.
    pub fn try_acquire(&mut self, key: &K) -> bool {
        if !self.limiters.contains_key(key) && !self.make_room() {
            debug!(tracked = self.limiters.len(), "key ceiling reached, attempt denied");
            return false;
        }
        let config = self.config;
        self.limiters
            .entry(key.clone())
            .or_insert_with(|| RateLimiter::new(config))
            .try_acquire()
    }

    /// [`RateLimiter::remaining_cooldown_secs`] for `key`.
    ///
    /// For an untracked key this is 0, unless the limiter is at its key
    /// ceiling: then it is the wait until the first tracked window runs
    /// out and frees a slot.
    pub fn remaining_cooldown_secs(&self, key: &K) -> u64 {
        match self.limiters.get(key) {
            Some(limiter) => limiter.remaining_cooldown_secs(),
            None if self.is_full() => self
                .limiters
                .values()
                .map(RateLimiter::remaining_cooldown_secs)
                .min()
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Forgets `key` entirely.
    pub fn reset(&mut self, key: &K) {
        self.limiters.remove(key);
    }

    /// Forgets every key.
    pub fn reset_all(&mut self) {
        self.limiters.clear();
    }

    /// Drops idle limiters. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.limiters.len();
        self.limiters.retain(|_, limiter| !limiter.is_idle());
        let removed = before - self.limiters.len();
        if removed > 0 {
            debug!(removed, remaining = self.limiters.len(), "pruned idle rate limiters");
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// `true` when no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    fn is_full(&self) -> bool {
        self.max_keys.is_some_and(|max| self.limiters.len() >= max)
    }

    /// Whether one more key fits, pruning first if needed.
    fn make_room(&mut self) -> bool {
        if !self.is_full() {
            return true;
        }
        self.prune();
        !self.is_full()
    }
}
