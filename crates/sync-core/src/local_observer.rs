//! Filesystem walker that compares on-disk state to a baseline and emits
//! typed change events (spec §4.2).
//!
//! The walk itself is grounded in the teacher's `FileEnumerator` (a
//! `walkdir::WalkDir` traversal with `follow_links(false)` and a
//! root-relative-path helper); this module differs from that one in every
//! way the spec requires: name validation before any I/O, `.nosync`
//! guarding, content hashing against the baseline rather than stateless
//! size/mtime comparison, and a post-walk deletion pass.

use crate::baseline::Baseline;
use crate::errors::{SyncError, SyncResult};
use crate::ids::SyncPath;
use crate::model::{ChangeEvent, ChangeType, ItemType, Source};
use crate::names::{is_excluded_temp_name, is_valid_onedrive_name, MAX_RELATIVE_PATH_LEN};
use crate::quickxor;
use crate::transport::CancellationToken;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Above this many candidate files, hashing is parallelized with rayon
/// (mirrors the teacher's own parallel/sequential threshold pattern in its
/// transfer planner).
const PARALLEL_HASH_THRESHOLD: usize = 256;

pub struct LocalObserver {
    sync_root: PathBuf,
}

impl LocalObserver {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
        }
    }

    /// Walk `sync_root`, diff against `baseline`, and return every observed
    /// change (spec §4.2). Fails with [`SyncError::NosyncGuard`] if a
    /// `.nosync` sentinel sits directly under the root.
    pub fn full_scan(
        &self,
        cancel: &CancellationToken,
        baseline: &Baseline,
    ) -> SyncResult<Vec<ChangeEvent>> {
        if self.sync_root.join(".nosync").exists() {
            return Err(SyncError::NosyncGuard {
                root: self.sync_root.display().to_string(),
            });
        }

        let scan_start = SystemTime::now();
        let mut observed: HashSet<SyncPath> = HashSet::new();
        let mut candidates: Vec<(SyncPath, PathBuf, u64, SystemTime)> = Vec::new();
        let mut events = Vec::new();

        for entry in WalkDir::new(&self.sync_root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if cancel.is_cancelled() {
                return Err(SyncError::ContextCanceled);
            }
            if entry.path() == self.sync_root {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue; // spec §4.2: symlinks are never synced, skipped silently
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !is_valid_onedrive_name(&name) {
                debug!("skipping invalid name: {}", entry.path().display());
                continue;
            }
            if is_excluded_temp_name(&name) {
                continue;
            }

            let rel = match entry.path().strip_prefix(&self.sync_root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let components: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let sync_path = SyncPath::from_components(components);

            if sync_path.as_str().len() > MAX_RELATIVE_PATH_LEN {
                warn!("skipping overlong path: {}", sync_path);
                continue;
            }

            observed.insert(sync_path.clone());

            let baseline_entry = baseline.get_by_path(&sync_path);

            if file_type.is_dir() {
                if baseline_entry.is_none() {
                    events.push(ChangeEvent {
                        source: Source::Local,
                        change_type: ChangeType::Create,
                        path: sync_path.clone(),
                        old_path: None,
                        name: name.clone(),
                        item_id: None,
                        parent_id: None,
                        drive_id: None,
                        item_type: ItemType::Folder,
                        size: None,
                        hash: None,
                        mtime: None,
                        is_deleted: false,
                    });
                }
                // Directory mtime is noise otherwise; contained files
                // generate their own events (spec §4.2).
                continue;
            }

            if baseline_entry.is_none() {
                let meta = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("stat failed for {}: {e}", sync_path);
                        continue;
                    }
                };
                let size = meta.len();
                let mtime = meta.modified().unwrap_or(scan_start);
                events.push(pending_create(&sync_path, &name, size, mtime, entry.path()));
                continue;
            }

            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("stat failed for {}: {e}", sync_path);
                    continue;
                }
            };
            candidates.push((sync_path, entry.path().to_path_buf(), meta.len(), meta.modified().unwrap_or(scan_start)));
        }

        // Hash every candidate that already has a baseline row and compare;
        // this is the step spec §4.2 describes as "compute the content hash
        // ... if hash equals baseline LocalHash -> no event; else -> Modify".
        let hashed: Vec<Option<ChangeEvent>> = if candidates.len() >= PARALLEL_HASH_THRESHOLD {
            candidates
                .par_iter()
                .map(|c| self.classify_against_baseline(c, baseline))
                .collect()
        } else {
            candidates
                .iter()
                .map(|c| self.classify_against_baseline(c, baseline))
                .collect()
        };
        events.extend(hashed.into_iter().flatten());

        // Replace the placeholder Create hashes now that we know whether
        // parallel hashing ran; Create events still need a real hash.
        for event in events.iter_mut() {
            if event.change_type == ChangeType::Create
                && event.item_type == ItemType::File
                && event.hash.as_deref() == Some("")
            {
                if let Some(abs) = resolve_abs(&self.sync_root, &event.path) {
                    match hash_path(&abs) {
                        Ok(h) => event.hash = Some(h),
                        Err(e) => {
                            warn!("hash failed for {}: {e}", event.path);
                        }
                    }
                }
            }
        }

        // Deletion pass (spec §4.2): any baseline entry not observed, that
        // is not the root, and has either a non-empty LocalHash or has ever
        // synced, becomes a Delete. Safety invariant S1: never delete a
        // path that was never synced.
        baseline.for_each_path(|path, entry| {
            if observed.contains(path) {
                return;
            }
            if entry.item_type == ItemType::Root {
                return;
            }
            let ever_synced = entry.synced_at.timestamp() != 0;
            let has_local_hash = entry.local_hash.as_deref().is_some_and(|h| !h.is_empty());
            if has_local_hash || ever_synced {
                events.push(ChangeEvent {
                    source: Source::Local,
                    change_type: ChangeType::Delete,
                    path: path.clone(),
                    old_path: None,
                    name: path.name().to_string(),
                    item_id: Some(entry.item_id.clone()),
                    parent_id: entry.parent_id.clone(),
                    drive_id: Some(entry.drive_id.clone()),
                    item_type: entry.item_type,
                    size: None,
                    hash: None,
                    mtime: None,
                    is_deleted: true,
                });
            }
        });

        Ok(events)
    }

    fn classify_against_baseline(
        &self,
        candidate: &(SyncPath, PathBuf, u64, SystemTime),
        baseline: &Baseline,
    ) -> Option<ChangeEvent> {
        let (sync_path, abs_path, size, mtime) = candidate;
        let baseline_entry = baseline.get_by_path(sync_path)?;

        let hash = match hash_path(abs_path) {
            Ok(h) => h,
            Err(e) => {
                warn!("hash failed for {sync_path}: {e}");
                return None;
            }
        };

        if baseline_entry.local_hash.as_deref() == Some(hash.as_str()) {
            return None; // unchanged
        }

        Some(ChangeEvent {
            source: Source::Local,
            change_type: ChangeType::Modify,
            path: sync_path.clone(),
            old_path: None,
            name: sync_path.name().to_string(),
            item_id: Some(baseline_entry.item_id.clone()),
            parent_id: baseline_entry.parent_id.clone(),
            drive_id: Some(baseline_entry.drive_id.clone()),
            item_type: ItemType::File,
            size: Some(*size),
            hash: Some(hash),
            mtime: Some((*mtime).into()),
            is_deleted: false,
        })
    }
}

fn pending_create(
    path: &SyncPath,
    name: &str,
    size: u64,
    mtime: SystemTime,
    _abs: &Path,
) -> ChangeEvent {
    // Hash is filled in afterward; "" is a placeholder, never a real
    // QuickXorHash value, so the post-pass below can find it unambiguously.
    ChangeEvent {
        source: Source::Local,
        change_type: ChangeType::Create,
        path: path.clone(),
        old_path: None,
        name: name.to_string(),
        item_id: None,
        parent_id: None,
        drive_id: None,
        item_type: ItemType::File,
        size: Some(size),
        hash: Some(String::new()),
        mtime: Some(mtime.into()),
        is_deleted: false,
    }
}

fn resolve_abs(root: &Path, rel: &SyncPath) -> Option<PathBuf> {
    if rel.is_root() {
        return Some(root.to_path_buf());
    }
    Some(root.join(rel.as_str()))
}

fn hash_path(path: &Path) -> std::io::Result<String> {
    let file = fs::File::open(path)?;
    quickxor::hash_file(file)
}
