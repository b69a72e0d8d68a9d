//! Short-lived dedup of recognized text.
//!
//! A text is "new" the first time it is seen and again once its cooldown
//! window has elapsed. Keys are normalized (trimmed, lowercased) so `"Exit"`
//! and `"exit "` are the same entry.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct CooldownFilter {
    window: Duration,
    last_seen: HashMap<String, Instant>,
}

impl CooldownFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Zero, negative and NaN values disable suppression. Values too large
    /// for a `Duration`, `+inf` included, saturate to `Duration::MAX`.
    pub fn from_secs_f64(secs: f64) -> Self {
        let window = if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        };
        Self::new(window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `text` should be treated as new at `now` and records
    /// it. A suppressed repeat leaves the stored timestamp untouched.
    pub fn accept(&mut self, text: &str, now: Instant) -> bool {
        let key = normalize(text);
        if let Some(seen) = self.last_seen.get(&key) {
            if now.saturating_duration_since(*seen) < self.window {
                log::trace!("Suppressing {key:?}, still cooling down");
                return false;
            }
        }
        self.last_seen.insert(key, now);
        true
    }

    /// Drops every entry whose window has elapsed at `now`. Only bounds
    /// memory, `accept` already ignores stale entries.
    pub fn evict(&mut self, now: Instant) {
        let window = self.window;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
    }

    pub fn contains(&self, text: &str) -> bool {
        self.last_seen.contains_key(&normalize(text))
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

impl Default for CooldownFilter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, secs: f64) -> Instant {
        start + Duration::from_secs_f64(secs)
    }

    #[test]
    fn repeat_inside_window_is_suppressed() {
        let start = Instant::now();
        let mut filter = CooldownFilter::from_secs_f64(3.0);

        assert!(filter.accept("hello", at(start, 0.0)));
        assert!(!filter.accept("hello", at(start, 1.0)));
        assert!(filter.accept("hello", at(start, 3.1)));
    }

    #[test]
    fn suppression_does_not_extend_the_window() {
        let start = Instant::now();
        let mut filter = CooldownFilter::from_secs_f64(3.0);

        assert!(filter.accept("hello", at(start, 0.0)));
        assert!(!filter.accept("hello", at(start, 2.9)));
        // Still measured from the first acceptance, not the suppressed call.
        assert!(filter.accept("hello", at(start, 3.0)));
    }

    #[test]
    fn keys_are_normalized() {
        let start = Instant::now();
        let mut filter = CooldownFilter::default();

        assert!(filter.accept("Exit", at(start, 0.0)));
        assert!(!filter.accept("exit ", at(start, 0.5)));
        assert!(!filter.accept("  EXIT\n", at(start, 1.0)));
        assert!(filter.contains("exit"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let start = Instant::now();
        let mut filter = CooldownFilter::default();

        assert!(filter.accept("open", at(start, 0.0)));
        assert!(filter.accept("close", at(start, 0.1)));
        assert!(!filter.accept("open", at(start, 0.2)));
        assert!(!filter.accept("close", at(start, 0.3)));
    }

    #[test]
    fn zero_or_negative_window_disables_suppression() {
        let start = Instant::now();
        for secs in [0.0, -2.0, f64::NAN] {
            let mut filter = CooldownFilter::from_secs_f64(secs);
            assert_eq!(filter.window(), Duration::ZERO);
            assert!(filter.accept("same", start));
            assert!(filter.accept("same", start));
        }
    }

    #[test]
    fn huge_window_saturates_instead_of_disabling() {
        let start = Instant::now();
        for secs in [f64::INFINITY, 1e20] {
            let mut filter = CooldownFilter::from_secs_f64(secs);
            assert_eq!(filter.window(), Duration::MAX);
            assert!(filter.accept("same", start));
            assert!(!filter.accept("same", at(start, 3600.0)));

            filter.evict(at(start, 3600.0));
            assert!(filter.contains("same"));
        }
    }

    #[test]
    fn evict_drops_only_expired_entries() {
        let start = Instant::now();
        let mut filter = CooldownFilter::from_secs_f64(3.0);

        assert!(filter.accept("A", at(start, 0.0)));
        assert!(filter.accept("B", at(start, 1.5)));

        filter.evict(at(start, 2.0));
        assert!(filter.contains("a"));
        assert!(filter.contains("b"));

        filter.evict(at(start, 3.0));
        assert!(!filter.contains("a"));
        assert!(filter.contains("b"));

        filter.evict(at(start, 5.0));
        assert!(filter.is_empty());
    }

    #[test]
    fn evict_on_empty_filter_is_a_noop() {
        let mut filter = CooldownFilter::default();
        filter.evict(Instant::now());
        filter.evict(Instant::now() + Duration::from_secs(3600));
        assert!(filter.is_empty());
    }

    #[test]
    fn skipped_eviction_never_suppresses_stale_text() {
        let start = Instant::now();
        let mut filter = CooldownFilter::from_secs_f64(1.0);

        assert!(filter.accept("late", at(start, 0.0)));
        // No evict calls at all.
        assert!(filter.accept("late", at(start, 10.0)));
    }

    #[test]
    fn earlier_timestamp_counts_as_fresh() {
        let start = Instant::now();
        let mut filter = CooldownFilter::from_secs_f64(3.0);

        assert!(filter.accept("skew", at(start, 5.0)));
        assert!(!filter.accept("skew", at(start, 4.0)));
    }
}
