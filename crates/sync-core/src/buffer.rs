//! Change buffer: a path-keyed event coalescer with debounced flushing and
//! dual-keyed move synthesis (spec §4.1).
//!
//! The mutex-guarded-map-plus-debounce-timer shape is grounded in the
//! retrieval pack's filesystem-event debouncer (a `Mutex<HashMap<PathBuf,
//! _>>` with a reset-on-each-insert deadline); this buffer differs from
//! that one in a load-bearing way the spec requires: each path keeps the
//! full ordered list of events per side rather than coalescing down to a
//! single merged kind, because the planner needs to fold "last event wins
//! for fields, but `is_deleted` is sticky" itself (spec §4.4.1).

use crate::errors::{SyncError, SyncResult};
use crate::ids::SyncPath;
use crate::model::{ChangeEvent, ChangeType, PathChanges};
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Default)]
struct Bucket {
    remote_events: Vec<ChangeEvent>,
    local_events: Vec<ChangeEvent>,
}

struct Inner {
    buckets: HashMap<String, Bucket>,
    max_paths: usize,
    last_add: Option<Instant>,
}

/// How often the flusher re-checks the quiet gap against `debounce`. Small
/// relative to realistic debounce windows (spec default 500ms) without
/// busy-spinning.
const DEBOUNCE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Path-keyed event coalescer (spec §4.1). Cheap to clone: internal state is
/// `Arc`-shared so the debounced flusher task and the producers that call
/// `add` can share one buffer.
#[derive(Clone)]
pub struct ChangeBuffer {
    inner: Arc<Mutex<Inner>>,
    flusher_running: Arc<AtomicBool>,
}

impl Default for ChangeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buckets: HashMap::new(),
                max_paths: 0,
                last_add: None,
            })),
            flusher_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `n = 0` means unlimited (spec §8, boundary behavior).
    pub fn set_max_paths(&self, n: usize) {
        self.inner.lock().max_paths = n;
    }

    /// Insert one event. `Move` events with a non-empty `old_path` also
    /// synthesize a `Delete` at the old path, keyed separately so the
    /// destination and the vacated source are both visible to the planner
    /// (spec §4.1, "Dual keying").
    pub fn add(&self, event: ChangeEvent) {
        let synthetic = if event.change_type == ChangeType::Move && event.old_path.is_some() {
            Some(ChangeEvent::synthetic_delete_for_move(&event))
        } else {
            None
        };

        let mut inner = self.inner.lock();
        Self::insert_one(&mut inner, event);
        if let Some(del) = synthetic {
            Self::insert_one(&mut inner, del);
        }
    }

    fn insert_one(inner: &mut Inner, event: ChangeEvent) {
        let key = event.path.as_str().to_string();
        if !inner.buckets.contains_key(&key)
            && inner.max_paths > 0
            && inner.buckets.len() >= inner.max_paths
        {
            warn!(
                "change buffer at capacity ({} paths); dropping new path {}",
                inner.max_paths, key
            );
            return;
        }
        let bucket = inner.buckets.entry(key).or_default();
        match event.source {
            crate::model::Source::Remote => bucket.remote_events.push(event),
            crate::model::Source::Local => bucket.local_events.push(event),
        }
        inner.last_add = Some(Instant::now());
    }

    /// Time elapsed since the last accepted `add`, or `None` if nothing has
    /// been added yet. The debounced flusher polls this to implement a
    /// reset-on-each-insert deadline (spec §5).
    fn quiet_elapsed(&self) -> Option<Duration> {
        self.inner
            .lock()
            .last_add
            .map(|t| Instant::now().saturating_duration_since(t))
    }

    pub fn add_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for e in events {
            self.add(e);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot and clear; returns a lexicographically path-sorted list, or
    /// empty when the buffer has nothing buffered (spec §4.1, §8).
    pub fn flush_immediate(&self) -> Vec<PathChanges> {
        let mut inner = self.inner.lock();
        let buckets = std::mem::take(&mut inner.buckets);
        drop(inner);

        let mut out: Vec<PathChanges> = buckets
            .into_iter()
            .map(|(path, bucket)| PathChanges {
                path: Some(SyncPath::from_raw(&path)),
                remote_events: bucket.remote_events,
                local_events: bucket.local_events,
            })
            .collect();
        out.sort_by(|a, b| {
            a.path
                .as_ref()
                .unwrap()
                .as_str()
                .cmp(b.path.as_ref().unwrap().as_str())
        });
        out
    }

    /// Spawn the single long-lived debounced flusher described in spec §5 /
    /// §9: a timer reset on every `add`, a blocking send on fire (intentional
    /// backpressure), and a non-blocking final drain on cancellation so a
    /// full channel can never deadlock the flusher. Calling this twice on
    /// the same buffer is a programming error (spec §4.1) and returns
    /// [`SyncError::DebouncedFlusherAlreadyRunning`].
    pub fn flush_debounced(
        &self,
        mut cancel: tokio::sync::watch::Receiver<bool>,
        debounce: Duration,
    ) -> SyncResult<mpsc::Receiver<Vec<PathChanges>>> {
        if self
            .flusher_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::DebouncedFlusherAlreadyRunning);
        }

        let (tx, rx) = mpsc::channel::<Vec<PathChanges>>(1);
        let buffer = self.clone();
        let running = self.flusher_running.clone();

        tokio::spawn(async move {
            let _guard = FlusherGuard(running);

            if !Self::wait_for_first_add(&buffer, &mut cancel, &tx).await {
                return;
            }

            loop {
                tokio::select! {
                    _ = cancel.changed() => {
                        if *cancel.borrow() {
                            Self::drain_nonblocking(&buffer, &tx);
                            return;
                        }
                    }
                    _ = tokio::time::sleep(DEBOUNCE_POLL_INTERVAL) => {
                        // Re-checked every tick rather than slept-to-once, so a
                        // fresh `add` pushes the fire point back out (spec §5:
                        // "each subsequent Add resets the timer").
                        let quiet = buffer.quiet_elapsed().unwrap_or(Duration::ZERO);
                        if quiet < debounce {
                            continue;
                        }
                        let batch = buffer.flush_immediate();
                        if !batch.is_empty() {
                            // Blocking send: intentional backpressure (spec §5).
                            if tx.send(batch).await.is_err() {
                                return;
                            }
                        }
                        if !Self::wait_for_first_add(&buffer, &mut cancel, &tx).await {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Waits until either the buffer has at least one path (timer should
    /// start) or cancellation fires. Returns `false` if canceled.
    async fn wait_for_first_add(
        buffer: &ChangeBuffer,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
        tx: &mpsc::Sender<Vec<PathChanges>>,
    ) -> bool {
        loop {
            if *cancel.borrow() {
                Self::drain_nonblocking(buffer, tx);
                return false;
            }
            if !buffer.is_empty() {
                return true;
            }
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        Self::drain_nonblocking(buffer, tx);
                        return false;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    }

    fn drain_nonblocking(buffer: &ChangeBuffer, tx: &mpsc::Sender<Vec<PathChanges>>) {
        let batch = buffer.flush_immediate();
        if !batch.is_empty() {
            let _ = tx.try_send(batch);
        }
    }
}

struct FlusherGuard(Arc<AtomicBool>);
impl Drop for FlusherGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
