//! Core data model: the entities that flow between the five components
//! (spec §3). Plain structs and closed enums; no behavior beyond small
//! accessors lives here — the decision logic lives in `planner`.

use crate::ids::{DriveId, ItemId, SyncPath};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    File,
    Folder,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    Bidirectional,
    DownloadOnly,
    UploadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictType {
    EditEdit,
    EditDelete,
    CreateCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Unresolved,
    KeepLocal,
    KeepRemote,
    KeepBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedBy {
    User,
    Auto,
}

/// Ephemeral event produced by an observer, flowing through the buffer to
/// the planner (spec §3, "ChangeEvent").
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub source: Source,
    pub change_type: ChangeType,
    pub path: SyncPath,
    pub old_path: Option<SyncPath>,
    pub name: String,
    pub item_id: Option<ItemId>,
    pub parent_id: Option<ItemId>,
    pub drive_id: Option<DriveId>,
    pub item_type: ItemType,
    pub size: Option<u64>,
    pub hash: Option<String>,
    pub mtime: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl ChangeEvent {
    /// Build the synthetic delete that `Add` pairs with a `Move` event at
    /// the move's old path (spec §4.1, "Dual keying").
    pub fn synthetic_delete_for_move(mv: &ChangeEvent) -> ChangeEvent {
        let old_path = mv
            .old_path
            .clone()
            .expect("synthetic delete requires a Move with OldPath");
        ChangeEvent {
            source: mv.source,
            change_type: ChangeType::Delete,
            path: old_path,
            old_path: None,
            name: mv.name.clone(),
            item_id: mv.item_id.clone(),
            parent_id: mv.parent_id.clone(),
            drive_id: mv.drive_id.clone(),
            item_type: mv.item_type,
            size: None,
            hash: None,
            mtime: None,
            is_deleted: true,
        }
    }
}

/// The buffer's output unit: one per distinct path, preserving per-side
/// insertion order (spec §3, "PathChanges").
#[derive(Debug, Clone, Default)]
pub struct PathChanges {
    pub path: Option<SyncPath>,
    pub remote_events: Vec<ChangeEvent>,
    pub local_events: Vec<ChangeEvent>,
}

/// Persistent ground truth for a single path: what was on both sides at the
/// last successful sync (spec §3, "BaselineEntry").
#[derive(Debug, Clone)]
pub struct BaselineEntry {
    pub path: SyncPath,
    pub drive_id: DriveId,
    pub item_id: ItemId,
    pub parent_id: Option<ItemId>,
    pub item_type: ItemType,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    pub etag: Option<String>,
}

/// The folded, one-sided observation that goes into a [`PathView`]: the
/// result of folding a side's event list in insertion order (last event's
/// fields win; `is_deleted` is sticky if any event in the list set it).
#[derive(Debug, Clone)]
pub struct SideState {
    pub item_id: Option<ItemId>,
    pub parent_id: Option<ItemId>,
    pub drive_id: Option<DriveId>,
    pub item_type: ItemType,
    pub size: Option<u64>,
    pub hash: Option<String>,
    pub mtime: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub old_path: Option<SyncPath>,
    pub change_type: ChangeType,
}

/// The three-way merge input for one path (spec §3, "PathView").
#[derive(Debug, Clone)]
pub struct PathView {
    pub path: SyncPath,
    pub baseline: Option<BaselineEntry>,
    pub local: Option<SideState>,
    pub remote: Option<SideState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Download,
    Upload,
    LocalDelete,
    RemoteDelete,
    LocalMove,
    RemoteMove,
    FolderCreate,
    UpdateSynced,
    Cleanup,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateSide {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub conflict_type: ConflictType,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
}

/// One step of an [`ActionPlan`] (spec §3, "Action").
#[derive(Debug, Clone)]
pub struct Action {
    pub action_type: ActionType,
    pub path: SyncPath,
    pub old_path: Option<SyncPath>,
    pub drive_id: DriveId,
    pub item_id: ItemId,
    pub parent_id: Option<ItemId>,
    pub item_type: ItemType,
    pub conflict_info: Option<ConflictInfo>,
    pub create_side: Option<CreateSide>,
    pub view: PathView,
}

/// Ordered action list plus dependency edges (spec §3, §4.4.8). `deps[i]`
/// lists indices that must complete before action `i`; the flat order of
/// `actions` carries no meaning by itself.
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
    pub deps: Vec<Vec<usize>>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What the executor reports back for one action (spec §3, "Outcome").
#[derive(Debug, Clone)]
pub struct Outcome {
    pub action_type: ActionType,
    pub success: bool,
    pub path: SyncPath,
    pub old_path: Option<SyncPath>,
    pub drive_id: DriveId,
    pub item_id: ItemId,
    pub parent_id: Option<ItemId>,
    pub item_type: ItemType,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub conflict_type: Option<ConflictType>,
    pub resolved_by: Option<ResolvedBy>,
}

/// Persisted conflict record (spec §3, "ConflictRecord").
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub id: Uuid,
    pub path: SyncPath,
    pub drive_id: DriveId,
    pub item_id: ItemId,
    pub conflict_type: ConflictType,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolution: Resolution,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<ResolvedBy>,
}
