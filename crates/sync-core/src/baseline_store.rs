//! Persistent baseline store (spec §4.5): the durable counterpart to the
//! in-memory [`Baseline`](crate::baseline::Baseline), plus delta-token and
//! conflict-record persistence.
//!
//! Schema-as-string-constant plus `execute_batch` for idempotent migrations,
//! and `Arc<Mutex<Connection>>` guarding a single `rusqlite` connection with
//! raw SQL, mirrors the repository-layer pattern used throughout
//! `diaryx_sync_server`'s own SQLite-backed store.

use crate::baseline::Baseline;
use crate::errors::{SyncError, SyncResult};
use crate::ids::{DriveId, ItemId, ItemKey, SyncPath};
use crate::model::{
    ActionType, BaselineEntry, ConflictRecord, ConflictType, ItemType, Outcome, Resolution,
    ResolvedBy,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Lookup key accepted by [`BaselineStore::get_conflict`] (spec §4.5,
/// `GetConflict(ctx, id_or_path)`).
pub enum ConflictLookup<'a> {
    Id(Uuid),
    Path(&'a SyncPath),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS baseline (
    path        TEXT PRIMARY KEY,
    drive_id    TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    parent_id   TEXT,
    item_type   TEXT NOT NULL,
    local_hash  TEXT,
    remote_hash TEXT,
    size        INTEGER,
    mtime       INTEGER,
    synced_at   INTEGER NOT NULL,
    etag        TEXT
);

CREATE INDEX IF NOT EXISTS idx_baseline_item
    ON baseline (drive_id, item_id);

CREATE TABLE IF NOT EXISTS delta_tokens (
    drive_id TEXT PRIMARY KEY,
    token    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conflicts (
    id            TEXT PRIMARY KEY,
    path          TEXT NOT NULL,
    drive_id      TEXT NOT NULL,
    item_id       TEXT NOT NULL,
    conflict_type TEXT NOT NULL,
    local_hash    TEXT,
    remote_hash   TEXT,
    detected_at   INTEGER NOT NULL,
    resolution    TEXT NOT NULL,
    resolved_at   INTEGER,
    resolved_by   TEXT
);

CREATE INDEX IF NOT EXISTS idx_conflicts_path ON conflicts (path);
";

/// Applies the baseline/delta-token/conflict schema, idempotently. A single
/// `CREATE TABLE IF NOT EXISTS` batch rather than a versioned migration
/// ladder, since there is exactly one schema generation to apply.
pub fn run_migrations(conn: &Connection) -> SyncResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Durable baseline, delta-token, and conflict storage, backed by a single
/// SQLite connection (spec §4.5).
pub struct BaselineStore {
    conn: Arc<Mutex<Connection>>,
    cache: RwLock<Option<Baseline>>,
}

impl BaselineStore {
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> SyncResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            cache: RwLock::new(None),
        })
    }

    fn load_uncached(&self) -> SyncResult<Baseline> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM baseline")?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(Baseline::from_entries(entries))
    }

    /// Load every baseline row into an in-memory [`Baseline`] (spec §4.5,
    /// `Load`). The first call populates the cache from disk; subsequent
    /// calls return the same cached snapshot until a `Commit` refreshes it.
    pub fn load(&self) -> SyncResult<Baseline> {
        if let Some(baseline) = self.cache.read().clone() {
            return Ok(baseline);
        }
        let baseline = self.load_uncached()?;
        *self.cache.write() = Some(baseline.clone());
        Ok(baseline)
    }

    /// Persist one baseline row, replacing any existing row at the same path
    /// (spec §4.5, `Commit`). Mirrors [`Baseline::put`]'s replace-by-path
    /// semantics so the on-disk and in-memory stores never diverge.
    pub fn commit(&self, entry: &BaselineEntry) -> SyncResult<()> {
        let conn = self.conn.lock();
        upsert_baseline_row(&conn, entry)?;
        *self.cache.write() = None;
        Ok(())
    }

    /// Commit several baseline rows inside one transaction; used by the
    /// planner's executor-outcome fold after a sync cycle.
    pub fn commit_all<'a>(&self, entries: impl IntoIterator<Item = &'a BaselineEntry>) -> SyncResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entry in entries {
            upsert_baseline_row(&tx, entry)?;
        }
        tx.commit()?;
        *self.cache.write() = None;
        Ok(())
    }

    pub fn remove(&self, path: &SyncPath) -> SyncResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM baseline WHERE path = ?1", params![path.as_str()])?;
        *self.cache.write() = None;
        Ok(())
    }

    /// Apply a batch of executor outcomes in a single transaction (spec
    /// §4.5, `Commit`). Only `Success = true` outcomes have any effect;
    /// failed outcomes are skipped so a partially-failed cycle still
    /// advances the baseline for whatever did succeed. Atomic: if any row
    /// write fails the whole transaction rolls back and neither the
    /// persistent store nor the cached baseline change.
    pub fn commit_outcomes(
        &self,
        outcomes: &[Outcome],
        new_delta_token: Option<&str>,
        drive_id: &DriveId,
    ) -> SyncResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for outcome in outcomes {
            if !outcome.success {
                continue;
            }
            match outcome.action_type {
                ActionType::Download
                | ActionType::Upload
                | ActionType::FolderCreate
                | ActionType::UpdateSynced
                | ActionType::LocalMove
                | ActionType::RemoteMove => {
                    if let Some(old_path) = &outcome.old_path {
                        tx.execute(
                            "DELETE FROM baseline WHERE path = ?1",
                            params![old_path.as_str()],
                        )?;
                    }
                    upsert_baseline_row(&tx, &entry_from_outcome(outcome))?;
                }
                ActionType::LocalDelete | ActionType::RemoteDelete | ActionType::Cleanup => {
                    tx.execute(
                        "DELETE FROM baseline WHERE path = ?1",
                        params![outcome.path.as_str()],
                    )?;
                }
                ActionType::Conflict => {
                    let record = conflict_record_from_outcome(outcome);
                    insert_conflict_row(&tx, &record)?;
                    if outcome.resolved_by == Some(ResolvedBy::Auto) {
                        upsert_baseline_row(&tx, &entry_from_outcome(outcome))?;
                    }
                }
            }
        }

        if let Some(token) = new_delta_token.filter(|t| !t.is_empty()) {
            tx.execute(
                "INSERT INTO delta_tokens (drive_id, token) VALUES (?1, ?2) \
                 ON CONFLICT(drive_id) DO UPDATE SET token = excluded.token",
                params![drive_id.as_str(), token],
            )?;
        }

        tx.commit()?;

        let refreshed = self.load_uncached()?;
        *self.cache.write() = Some(refreshed);
        Ok(())
    }

    /// Last known delta token for a drive (spec §4.5, `GetDeltaToken`).
    pub fn get_delta_token(&self, drive_id: &DriveId) -> SyncResult<Option<String>> {
        let conn = self.conn.lock();
        let token = conn
            .query_row(
                "SELECT token FROM delta_tokens WHERE drive_id = ?1",
                params![drive_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(token)
    }

    pub fn set_delta_token(&self, drive_id: &DriveId, token: &str) -> SyncResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO delta_tokens (drive_id, token) VALUES (?1, ?2) \
             ON CONFLICT(drive_id) DO UPDATE SET token = excluded.token",
            params![drive_id.as_str(), token],
        )?;
        Ok(())
    }

    /// Every unresolved conflict, across all paths (spec §4.5, `ListConflicts`).
    pub fn list_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM conflicts WHERE resolution = 'unresolved' ORDER BY detected_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_conflict)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every conflict regardless of resolution state (spec §4.5,
    /// `ListAllConflicts`), used by diagnostics surfaces.
    pub fn list_all_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM conflicts ORDER BY detected_at ASC")?;
        let rows = stmt.query_map([], row_to_conflict)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fetch a conflict by UUID or by path (spec §4.5, `GetConflict`). A
    /// path lookup returns the most recently detected conflict at that path.
    pub fn get_conflict(&self, lookup: ConflictLookup<'_>) -> SyncResult<Option<ConflictRecord>> {
        let conn = self.conn.lock();
        let record = match lookup {
            ConflictLookup::Id(id) => conn
                .query_row(
                    "SELECT * FROM conflicts WHERE id = ?1",
                    params![id.to_string()],
                    row_to_conflict,
                )
                .optional()?,
            ConflictLookup::Path(path) => conn
                .query_row(
                    "SELECT * FROM conflicts WHERE path = ?1 ORDER BY detected_at DESC LIMIT 1",
                    params![path.as_str()],
                    row_to_conflict,
                )
                .optional()?,
        };
        Ok(record)
    }

    pub fn insert_conflict(&self, record: &ConflictRecord) -> SyncResult<()> {
        let conn = self.conn.lock();
        insert_conflict_row(&conn, record)
    }

    /// Mark a conflict resolved (spec §4.5, `ResolveConflict`). Fails if the
    /// conflict is already resolved, or unknown.
    pub fn resolve_conflict(
        &self,
        id: Uuid,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT resolution FROM conflicts WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match current.as_deref() {
            None => {
                return Err(SyncError::ConflictAlreadyResolved { id: id.to_string() });
            }
            Some("unresolved") => {}
            Some(_) => {
                return Err(SyncError::ConflictAlreadyResolved { id: id.to_string() });
            }
        }
        tx.execute(
            "UPDATE conflicts SET resolution = ?1, resolved_at = ?2, resolved_by = ?3 WHERE id = ?4",
            params![
                resolution_tag(resolution),
                resolved_at.timestamp(),
                resolved_by_tag(ResolvedBy::User),
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn upsert_baseline_row(conn: &Connection, entry: &BaselineEntry) -> SyncResult<()> {
    conn.execute(
        "INSERT INTO baseline (path, drive_id, item_id, parent_id, item_type, local_hash, \
         remote_hash, size, mtime, synced_at, etag) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         ON CONFLICT(path) DO UPDATE SET \
            drive_id = excluded.drive_id, \
            item_id = excluded.item_id, \
            parent_id = excluded.parent_id, \
            item_type = excluded.item_type, \
            local_hash = excluded.local_hash, \
            remote_hash = excluded.remote_hash, \
            size = excluded.size, \
            mtime = excluded.mtime, \
            synced_at = excluded.synced_at, \
            etag = excluded.etag",
        params![
            entry.path.as_str(),
            entry.drive_id.as_str(),
            entry.item_id.as_str(),
            entry.parent_id.as_ref().map(|p| p.as_str()),
            item_type_tag(entry.item_type),
            entry.local_hash,
            entry.remote_hash,
            entry.size.map(|s| s as i64),
            entry.mtime.map(|t| t.timestamp()),
            entry.synced_at.timestamp(),
            entry.etag,
        ],
    )?;
    Ok(())
}

fn insert_conflict_row(conn: &Connection, record: &ConflictRecord) -> SyncResult<()> {
    conn.execute(
        "INSERT INTO conflicts (id, path, drive_id, item_id, conflict_type, local_hash, \
         remote_hash, detected_at, resolution, resolved_at, resolved_by) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id.to_string(),
            record.path.as_str(),
            record.drive_id.as_str(),
            record.item_id.as_str(),
            conflict_type_tag(record.conflict_type),
            record.local_hash,
            record.remote_hash,
            record.detected_at.timestamp(),
            resolution_tag(record.resolution),
            record.resolved_at.map(|t| t.timestamp()),
            record.resolved_by.map(resolved_by_tag),
        ],
    )?;
    Ok(())
}

fn entry_from_outcome(outcome: &Outcome) -> BaselineEntry {
    BaselineEntry {
        path: outcome.path.clone(),
        drive_id: outcome.drive_id.clone(),
        item_id: outcome.item_id.clone(),
        parent_id: outcome.parent_id.clone(),
        item_type: outcome.item_type,
        local_hash: outcome.local_hash.clone(),
        remote_hash: outcome.remote_hash.clone(),
        size: outcome.size,
        mtime: outcome.mtime,
        synced_at: Utc::now(),
        etag: outcome.etag.clone(),
    }
}

/// Builds the `ConflictRecord` inserted for an unresolved-or-auto-resolved
/// `Conflict` outcome. An outcome carrying `ResolvedBy::Auto` is recorded as
/// already resolved; the specific side kept isn't recoverable from `Outcome`
/// alone, so it is recorded as `KeepLocal` (the baseline row upserted in the
/// same transaction is the authoritative post-resolution state either way).
fn conflict_record_from_outcome(outcome: &Outcome) -> ConflictRecord {
    let now = Utc::now();
    let auto_resolved = outcome.resolved_by == Some(ResolvedBy::Auto);
    ConflictRecord {
        id: Uuid::new_v4(),
        path: outcome.path.clone(),
        drive_id: outcome.drive_id.clone(),
        item_id: outcome.item_id.clone(),
        conflict_type: outcome.conflict_type.unwrap_or(ConflictType::EditEdit),
        local_hash: outcome.local_hash.clone(),
        remote_hash: outcome.remote_hash.clone(),
        detected_at: now,
        resolution: if auto_resolved { Resolution::KeepLocal } else { Resolution::Unresolved },
        resolved_at: if auto_resolved { Some(now) } else { None },
        resolved_by: outcome.resolved_by,
    }
}

fn item_type_tag(t: ItemType) -> &'static str {
    match t {
        ItemType::File => "file",
        ItemType::Folder => "folder",
        ItemType::Root => "root",
    }
}

fn parse_item_type(raw: &str) -> ItemType {
    match raw {
        "folder" => ItemType::Folder,
        "root" => ItemType::Root,
        _ => ItemType::File,
    }
}

fn conflict_type_tag(t: ConflictType) -> &'static str {
    match t {
        ConflictType::EditEdit => "edit_edit",
        ConflictType::EditDelete => "edit_delete",
        ConflictType::CreateCreate => "create_create",
    }
}

fn parse_conflict_type(raw: &str) -> ConflictType {
    match raw {
        "edit_delete" => ConflictType::EditDelete,
        "create_create" => ConflictType::CreateCreate,
        _ => ConflictType::EditEdit,
    }
}

fn resolution_tag(r: Resolution) -> &'static str {
    match r {
        Resolution::Unresolved => "unresolved",
        Resolution::KeepLocal => "keep_local",
        Resolution::KeepRemote => "keep_remote",
        Resolution::KeepBoth => "keep_both",
    }
}

fn parse_resolution(raw: &str) -> Resolution {
    match raw {
        "keep_local" => Resolution::KeepLocal,
        "keep_remote" => Resolution::KeepRemote,
        "keep_both" => Resolution::KeepBoth,
        _ => Resolution::Unresolved,
    }
}

fn resolved_by_tag(r: ResolvedBy) -> &'static str {
    match r {
        ResolvedBy::User => "user",
        ResolvedBy::Auto => "auto",
    }
}

fn parse_resolved_by(raw: &str) -> ResolvedBy {
    match raw {
        "auto" => ResolvedBy::Auto,
        _ => ResolvedBy::User,
    }
}

fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn row_to_entry(row: &Row) -> rusqlite::Result<BaselineEntry> {
    let item_type: String = row.get("item_type")?;
    let parent_id: Option<String> = row.get("parent_id")?;
    let mtime: Option<i64> = row.get("mtime")?;
    let synced_at: i64 = row.get("synced_at")?;
    Ok(BaselineEntry {
        path: SyncPath::from_raw(&row.get::<_, String>("path")?),
        drive_id: DriveId::canonicalize(&row.get::<_, String>("drive_id")?),
        item_id: ItemId::new(row.get::<_, String>("item_id")?),
        parent_id: parent_id.map(ItemId::new),
        item_type: parse_item_type(&item_type),
        local_hash: row.get("local_hash")?,
        remote_hash: row.get("remote_hash")?,
        size: row.get::<_, Option<i64>>("size")?.map(|s| s as u64),
        mtime: mtime.map(epoch_to_utc),
        synced_at: epoch_to_utc(synced_at),
        etag: row.get("etag")?,
    })
}

fn row_to_conflict(row: &Row) -> rusqlite::Result<ConflictRecord> {
    let id: String = row.get("id")?;
    let conflict_type: String = row.get("conflict_type")?;
    let resolution: String = row.get("resolution")?;
    let resolved_by: Option<String> = row.get("resolved_by")?;
    let resolved_at: Option<i64> = row.get("resolved_at")?;
    let detected_at: i64 = row.get("detected_at")?;
    Ok(ConflictRecord {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        path: SyncPath::from_raw(&row.get::<_, String>("path")?),
        drive_id: DriveId::canonicalize(&row.get::<_, String>("drive_id")?),
        item_id: ItemId::new(row.get::<_, String>("item_id")?),
        conflict_type: parse_conflict_type(&conflict_type),
        local_hash: row.get("local_hash")?,
        remote_hash: row.get("remote_hash")?,
        detected_at: epoch_to_utc(detected_at),
        resolution: parse_resolution(&resolution),
        resolved_at: resolved_at.map(epoch_to_utc),
        resolved_by: resolved_by.as_deref().map(parse_resolved_by),
    })
}

#[allow(dead_code)]
fn key_of(entry: &BaselineEntry) -> ItemKey {
    ItemKey::new(entry.drive_id.clone(), entry.item_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

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
            etag: Some("etag1".into()),
        }
    }

    #[test]
    fn commit_then_load_round_trips() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("docs/a.txt", "I1")).unwrap();
        store.commit(&entry("docs/b.txt", "I2")).unwrap();

        let baseline = store.load().unwrap();
        assert_eq!(baseline.len(), 2);
        let got = baseline.get_by_path(&SyncPath::from_raw("docs/a.txt")).unwrap();
        assert_eq!(got.item_id, ItemId::new("I1"));
        assert_eq!(got.etag.as_deref(), Some("etag1"));
    }

    #[test]
    fn commit_replaces_existing_row_at_path() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("a.txt", "I1")).unwrap();
        let mut updated = entry("a.txt", "I1");
        updated.remote_hash = Some("new-hash".into());
        store.commit(&updated).unwrap();

        let baseline = store.load().unwrap();
        assert_eq!(baseline.len(), 1);
        let got = baseline.get_by_path(&SyncPath::from_raw("a.txt")).unwrap();
        assert_eq!(got.remote_hash.as_deref(), Some("new-hash"));
    }

    #[test]
    fn remove_deletes_row() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("a.txt", "I1")).unwrap();
        store.remove(&SyncPath::from_raw("a.txt")).unwrap();
        let baseline = store.load().unwrap();
        assert!(baseline.is_empty());
    }

    #[test]
    fn delta_token_round_trips_and_upserts() {
        let store = BaselineStore::open_in_memory().unwrap();
        let drive = DriveId::canonicalize("d1");
        assert_eq!(store.get_delta_token(&drive).unwrap(), None);
        store.set_delta_token(&drive, "token-1").unwrap();
        assert_eq!(store.get_delta_token(&drive).unwrap().as_deref(), Some("token-1"));
        store.set_delta_token(&drive, "token-2").unwrap();
        assert_eq!(store.get_delta_token(&drive).unwrap().as_deref(), Some("token-2"));
    }

    fn conflict(path: &str) -> ConflictRecord {
        ConflictRecord {
            id: Uuid::new_v4(),
            path: SyncPath::from_raw(path),
            drive_id: DriveId::canonicalize("d1"),
            item_id: ItemId::new("I1"),
            conflict_type: ConflictType::EditEdit,
            local_hash: Some("lh".into()),
            remote_hash: Some("rh".into()),
            detected_at: Utc::now(),
            resolution: Resolution::Unresolved,
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn list_conflicts_excludes_resolved() {
        let store = BaselineStore::open_in_memory().unwrap();
        let c1 = conflict("a.txt");
        let c2 = conflict("b.txt");
        store.insert_conflict(&c1).unwrap();
        store.insert_conflict(&c2).unwrap();
        store
            .resolve_conflict(c1.id, Resolution::KeepLocal, Utc::now())
            .unwrap();

        let open = store.list_conflicts().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, c2.id);

        let all = store.list_all_conflicts().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn resolving_already_resolved_conflict_fails() {
        let store = BaselineStore::open_in_memory().unwrap();
        let c1 = conflict("a.txt");
        store.insert_conflict(&c1).unwrap();
        store.resolve_conflict(c1.id, Resolution::KeepLocal, Utc::now()).unwrap();
        let err = store.resolve_conflict(c1.id, Resolution::KeepRemote, Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn get_conflict_returns_none_for_unknown_id() {
        let store = BaselineStore::open_in_memory().unwrap();
        assert!(store.get_conflict(ConflictLookup::Id(Uuid::new_v4())).unwrap().is_none());
    }

    #[test]
    fn get_conflict_by_path_finds_most_recent() {
        let store = BaselineStore::open_in_memory().unwrap();
        let c1 = conflict("a.txt");
        store.insert_conflict(&c1).unwrap();
        let found = store.get_conflict(ConflictLookup::Path(&SyncPath::from_raw("a.txt"))).unwrap();
        assert_eq!(found.unwrap().id, c1.id);
    }

    fn outcome(action_type: ActionType, path: &str, item_id: &str) -> Outcome {
        Outcome {
            action_type,
            success: true,
            path: SyncPath::from_raw(path),
            old_path: None,
            drive_id: DriveId::canonicalize("d1"),
            item_id: ItemId::new(item_id),
            parent_id: None,
            item_type: ItemType::File,
            local_hash: Some("h".into()),
            remote_hash: Some("h".into()),
            size: Some(10),
            mtime: Some(Utc::now()),
            etag: Some("etag1".into()),
            conflict_type: None,
            resolved_by: None,
        }
    }

    #[test]
    fn commit_outcomes_upserts_for_transfer_actions() {
        let store = BaselineStore::open_in_memory().unwrap();
        let outcomes = vec![outcome(ActionType::Download, "a.txt", "I1")];
        store.commit_outcomes(&outcomes, None, &DriveId::canonicalize("d1")).unwrap();
        let baseline = store.load().unwrap();
        assert_eq!(baseline.len(), 1);
        assert!(baseline.get_by_path(&SyncPath::from_raw("a.txt")).is_some());
    }

    #[test]
    fn commit_outcomes_deletes_old_path_for_moves() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("old.txt", "I1")).unwrap();
        let mut mv = outcome(ActionType::LocalMove, "new.txt", "I1");
        mv.old_path = Some(SyncPath::from_raw("old.txt"));
        store.commit_outcomes(&[mv], None, &DriveId::canonicalize("d1")).unwrap();

        let baseline = store.load().unwrap();
        assert_eq!(baseline.len(), 1);
        assert!(baseline.get_by_path(&SyncPath::from_raw("old.txt")).is_none());
        assert!(baseline.get_by_path(&SyncPath::from_raw("new.txt")).is_some());
    }

    #[test]
    fn commit_outcomes_removes_row_for_delete_actions() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("a.txt", "I1")).unwrap();
        store
            .commit_outcomes(
                &[outcome(ActionType::RemoteDelete, "a.txt", "I1")],
                None,
                &DriveId::canonicalize("d1"),
            )
            .unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn commit_outcomes_ignores_failed_outcomes() {
        let store = BaselineStore::open_in_memory().unwrap();
        let mut failed = outcome(ActionType::Download, "a.txt", "I1");
        failed.success = false;
        store.commit_outcomes(&[failed], None, &DriveId::canonicalize("d1")).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn commit_outcomes_inserts_unresolved_conflict_without_touching_baseline() {
        let store = BaselineStore::open_in_memory().unwrap();
        let mut conflicted = outcome(ActionType::Conflict, "a.txt", "I1");
        conflicted.conflict_type = Some(ConflictType::EditEdit);
        store.commit_outcomes(&[conflicted], None, &DriveId::canonicalize("d1")).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.list_conflicts().unwrap().len(), 1);
    }

    #[test]
    fn commit_outcomes_auto_resolved_conflict_also_upserts_baseline() {
        let store = BaselineStore::open_in_memory().unwrap();
        let mut conflicted = outcome(ActionType::Conflict, "a.txt", "I1");
        conflicted.conflict_type = Some(ConflictType::EditEdit);
        conflicted.resolved_by = Some(ResolvedBy::Auto);
        store.commit_outcomes(&[conflicted], None, &DriveId::canonicalize("d1")).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
        let all = store.list_all_conflicts().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].resolution, Resolution::KeepLocal);
    }

    #[test]
    fn commit_outcomes_sets_delta_token_when_nonempty() {
        let store = BaselineStore::open_in_memory().unwrap();
        let drive = DriveId::canonicalize("d1");
        store.commit_outcomes(&[], Some("tok-1"), &drive).unwrap();
        assert_eq!(store.get_delta_token(&drive).unwrap().as_deref(), Some("tok-1"));
        store.commit_outcomes(&[], Some(""), &drive).unwrap();
        assert_eq!(store.get_delta_token(&drive).unwrap().as_deref(), Some("tok-1"));
    }

    #[test]
    fn load_returns_cached_snapshot_until_commit_outcomes_refreshes_it() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("a.txt", "I1")).unwrap();
        let first = store.load().unwrap();
        assert_eq!(first.len(), 1);
        // Bypass the store and mutate the connection directly to prove
        // `load` serves the cached snapshot rather than re-querying.
        store.conn.lock().execute("DELETE FROM baseline", []).unwrap();
        let still_cached = store.load().unwrap();
        assert_eq!(still_cached.len(), 1);

        store
            .commit_outcomes(&[], None, &DriveId::canonicalize("d1"))
            .unwrap();
        assert_eq!(store.load().unwrap().len(), 0);
    }

    #[test]
    fn schema_is_idempotent_across_reopen() {
        let store = BaselineStore::open_in_memory().unwrap();
        store.commit(&entry("a.txt", "I1")).unwrap();
        // Re-running the schema batch against the same connection must not
        // error or disturb existing rows.
        store.conn.lock().execute_batch(SCHEMA).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
