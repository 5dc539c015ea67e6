//! Per-path failure tracking for watch mode (spec §7): a path that fails
//! repeatedly within a rolling window gets suppressed with a warning until
//! the window elapses; a success at any time clears its record outright.
//!
//! Grounded on the same `parking_lot::RwLock`-guarded shared-state shape
//! used for `Baseline` and `ChangeBuffer` elsewhere in this crate, rather
//! than on any one teacher file (the teacher's retry logic is per-transfer
//! and stateless across calls, so this module introduces the bookkeeping
//! spec §7 asks for from first principles, in the same idiom).

use crate::ids::SyncPath;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

struct PathRecord {
    /// Timestamps of failures still inside the window, oldest first.
    failures: Vec<DateTime<Utc>>,
    suppressed_until: Option<DateTime<Utc>>,
}

/// Tracks per-path failures against a threshold/window pair and suppresses
/// paths that exceed it until the window has elapsed since the last failure.
pub struct FailureTracker {
    threshold: u32,
    window: ChronoDuration,
    records: Mutex<HashMap<SyncPath, PathRecord>>,
}

impl FailureTracker {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window: ChronoDuration::from_std(window).unwrap_or(ChronoDuration::seconds(0)),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `path` at `now`, dropping failures that have
    /// aged out of the window first. Suppresses the path once the
    /// surviving failure count reaches the threshold.
    pub fn record_failure(&self, path: &SyncPath, now: DateTime<Utc>) {
        let mut records = self.records.lock();
        let record = records.entry(path.clone()).or_insert_with(|| PathRecord {
            failures: Vec::new(),
            suppressed_until: None,
        });
        record.failures.retain(|t| now - *t <= self.window);
        record.failures.push(now);

        if record.failures.len() as u32 >= self.threshold {
            let until = now + self.window;
            record.suppressed_until = Some(until);
            warn!(
                "path {} suppressed after {} failures within the tracking window, cooldown until {}",
                path,
                record.failures.len(),
                until
            );
        }
    }

    /// Clear all tracked state for `path`. Spec §7: success at any time
    /// clears the record.
    pub fn record_success(&self, path: &SyncPath) {
        self.records.lock().remove(path);
    }

    /// `true` if `path` is currently suppressed as of `now`. Suppression
    /// that has aged past its cooldown is treated as expired and the
    /// record is dropped, per spec §7 ("until the cooldown expires").
    pub fn is_suppressed(&self, path: &SyncPath, now: DateTime<Utc>) -> bool {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(path) else {
            return false;
        };
        match record.suppressed_until {
            Some(until) if now < until => true,
            Some(_) => {
                records.remove(path);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> SyncPath {
        SyncPath::from_raw(s)
    }

    #[test]
    fn suppresses_after_threshold_failures_within_window() {
        let tracker = FailureTracker::new(3, Duration::from_secs(1800));
        let t0 = Utc::now();
        let p = path("docs/a.txt");

        tracker.record_failure(&p, t0);
        assert!(!tracker.is_suppressed(&p, t0));
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(1));
        assert!(!tracker.is_suppressed(&p, t0));
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(2));
        assert!(tracker.is_suppressed(&p, t0 + ChronoDuration::seconds(2)));
    }

    #[test]
    fn failures_outside_window_do_not_accumulate() {
        let tracker = FailureTracker::new(3, Duration::from_secs(60));
        let t0 = Utc::now();
        let p = path("docs/a.txt");

        tracker.record_failure(&p, t0);
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(30));
        // This failure lands more than the window after the first one, so
        // the first failure has aged out by the time it's recorded.
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(90));
        assert!(!tracker.is_suppressed(&p, t0 + ChronoDuration::seconds(90)));
    }

    #[test]
    fn success_clears_the_record() {
        let tracker = FailureTracker::new(2, Duration::from_secs(1800));
        let t0 = Utc::now();
        let p = path("docs/a.txt");

        tracker.record_failure(&p, t0);
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(1));
        assert!(tracker.is_suppressed(&p, t0 + ChronoDuration::seconds(1)));

        tracker.record_success(&p);
        assert!(!tracker.is_suppressed(&p, t0 + ChronoDuration::seconds(1)));

        // A fresh failure after a cleared record needs the full threshold again.
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(2));
        assert!(!tracker.is_suppressed(&p, t0 + ChronoDuration::seconds(2)));
    }

    #[test]
    fn suppression_expires_after_cooldown() {
        let tracker = FailureTracker::new(2, Duration::from_secs(60));
        let t0 = Utc::now();
        let p = path("docs/a.txt");

        tracker.record_failure(&p, t0);
        tracker.record_failure(&p, t0 + ChronoDuration::seconds(1));
        let suppressed_at = t0 + ChronoDuration::seconds(1);
        assert!(tracker.is_suppressed(&p, suppressed_at));

        // Cooldown runs from the failure that tripped it, so `window` later
        // the suppression has lapsed.
        let after_cooldown = suppressed_at + ChronoDuration::seconds(61);
        assert!(!tracker.is_suppressed(&p, after_cooldown));
    }

    #[test]
    fn unknown_path_is_never_suppressed() {
        let tracker = FailureTracker::new(3, Duration::from_secs(1800));
        assert!(!tracker.is_suppressed(&path("nope.txt"), Utc::now()));
    }
}
