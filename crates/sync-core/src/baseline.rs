//! In-memory baseline snapshot: two indices over the same entries, guarded
//! by a single read-write lock (spec §3 "Baseline", §5 "Shared resource
//! policy"). `parking_lot::RwLock` is the teacher's lock of choice
//! throughout its own shared-state code.

use crate::ids::{ItemKey, SyncPath};
use crate::model::BaselineEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Indices {
    by_path: HashMap<SyncPath, Arc<BaselineEntry>>,
    by_id: HashMap<ItemKey, Arc<BaselineEntry>>,
}

/// Thread-safe in-memory baseline (spec §3, invariants 1, 5, 6).
///
/// `get_by_path` / `get_by_id` / `len` / `for_each_path` take a shared lock;
/// `put` / `delete` take an exclusive lock. Entries are reference-counted so
/// both indices point at the same allocation (invariant 1).
#[derive(Clone)]
pub struct Baseline {
    indices: Arc<RwLock<Indices>>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self::new()
    }
}

impl Baseline {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(RwLock::new(Indices {
                by_path: HashMap::new(),
                by_id: HashMap::new(),
            })),
        }
    }

    pub fn from_entries(entries: Vec<BaselineEntry>) -> Self {
        let baseline = Self::new();
        for entry in entries {
            baseline.put(entry);
        }
        baseline
    }

    pub fn get_by_path(&self, path: &SyncPath) -> Option<BaselineEntry> {
        self.indices
            .read()
            .by_path
            .get(path)
            .map(|e| (**e).clone())
    }

    pub fn get_by_id(&self, key: &ItemKey) -> Option<BaselineEntry> {
        self.indices.read().by_id.get(key).map(|e| (**e).clone())
    }

    /// Insert or replace an entry, keeping both indices pointed at the same
    /// allocation (invariant 1). If the path previously held a different
    /// `ItemKey`, the stale `by_id` row is removed first.
    pub fn put(&self, entry: BaselineEntry) {
        let mut idx = self.indices.write();
        if let Some(old) = idx.by_path.get(&entry.path) {
            let old_key = ItemKey::new(old.drive_id.clone(), old.item_id.clone());
            if old_key != ItemKey::new(entry.drive_id.clone(), entry.item_id.clone()) {
                idx.by_id.remove(&old_key);
            }
        }
        let key = ItemKey::new(entry.drive_id.clone(), entry.item_id.clone());
        let path = entry.path.clone();
        let rc = Arc::new(entry);
        idx.by_path.insert(path, rc.clone());
        idx.by_id.insert(key, rc);
    }

    pub fn delete(&self, path: &SyncPath) {
        let mut idx = self.indices.write();
        if let Some(entry) = idx.by_path.remove(path) {
            let key = ItemKey::new(entry.drive_id.clone(), entry.item_id.clone());
            idx.by_id.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.indices.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every path under the shared lock. Callers must not call
    /// `put`/`delete` from within `f` (spec §5) — doing so would deadlock
    /// against `parking_lot::RwLock`, which is not reentrant.
    pub fn for_each_path(&self, mut f: impl FnMut(&SyncPath, &BaselineEntry)) {
        let idx = self.indices.read();
        for (path, entry) in idx.by_path.iter() {
            f(path, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DriveId, ItemId};
    use crate::model::ItemType;
    use chrono::Utc;

    fn entry(path: &str, item_id: &str) -> BaselineEntry {
        BaselineEntry {
            path: SyncPath::from_raw(path),
            drive_id: DriveId::canonicalize("d1"),
            item_id: ItemId::new(item_id),
            parent_id: None,
            item_type: ItemType::File,
            local_hash: Some("h".into()),
            remote_hash: Some("h".into()),
            size: Some(10),
            mtime: Some(Utc::now()),
            synced_at: Utc::now(),
            etag: None,
        }
    }

    #[test]
    fn both_indices_agree() {
        let b = Baseline::new();
        b.put(entry("a.txt", "I1"));
        let by_path = b.get_by_path(&SyncPath::from_raw("a.txt")).unwrap();
        let key = ItemKey::new(by_path.drive_id.clone(), by_path.item_id.clone());
        let by_id = b.get_by_id(&key).unwrap();
        assert_eq!(by_path.path, by_id.path);
    }

    #[test]
    fn len_matches_by_path_count() {
        let b = Baseline::new();
        b.put(entry("a.txt", "I1"));
        b.put(entry("b.txt", "I2"));
        assert_eq!(b.len(), 2);
        b.delete(&SyncPath::from_raw("a.txt"));
        assert_eq!(b.len(), 1);
        assert!(b.get_by_path(&SyncPath::from_raw("a.txt")).is_none());
    }

    #[test]
    fn put_on_existing_path_with_new_item_id_drops_stale_by_id_row() {
        let b = Baseline::new();
        b.put(entry("a.txt", "I1"));
        b.put(entry("a.txt", "I2"));
        assert_eq!(b.len(), 1);
        let old_key = ItemKey::new(DriveId::canonicalize("d1"), ItemId::new("I1"));
        assert!(b.get_by_id(&old_key).is_none());
        let new_key = ItemKey::new(DriveId::canonicalize("d1"), ItemId::new("I2"));
        assert!(b.get_by_id(&new_key).is_some());
    }
}
