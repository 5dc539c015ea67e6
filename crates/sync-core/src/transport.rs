//! External collaborator contracts (spec §6, §9 "Dynamic dispatch ->
//! capability-typed collaborators"). These are the seams the core crate is
//! built against; no concrete network client or executor lives in this
//! crate. The shape mirrors the small `async_trait` capability-set ports
//! seen elsewhere in the retrieval pack (`ICloudProvider`,
//! `ILocalFileSystem`, `IStateRepository`): one trait per capability,
//! composed at construction time rather than behind one god-interface.

use crate::errors::SyncError;
use crate::ids::{DriveId, ItemId};
use crate::model::{Action, ActionPlan, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};

/// One item as it appears in a server delta page (spec §4.3 "Input model").
#[derive(Debug, Clone)]
pub struct DeltaItem {
    pub id: ItemId,
    pub name: String,
    pub parent_id: Option<ItemId>,
    pub parent_drive_id: Option<DriveId>,
    pub drive_id: DriveId,
    pub is_folder: bool,
    pub is_root: bool,
    pub is_deleted: bool,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub quick_xor_hash: Option<String>,
    pub sha256_hash: Option<String>,
    pub sha1_hash: Option<String>,
    pub special_folder_name: Option<String>,
}

impl DeltaItem {
    /// Hash selection priority from spec §4.3: QuickXorHash > SHA256 > SHA1 > empty.
    /// Never crosses hash types between events for the same item.
    pub fn preferred_hash(&self) -> Option<&str> {
        self.quick_xor_hash
            .as_deref()
            .or(self.sha256_hash.as_deref())
            .or(self.sha1_hash.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeltaPage {
    pub items: Vec<DeltaItem>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}

/// Cooperative cancellation handle threaded through every long-running
/// operation (spec §5 "Cancellation").
#[derive(Clone, Default)]
pub struct CancellationToken {
    signal: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.signal.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
pub trait DeltaFetcher: Send + Sync {
    /// Fetch one page of the delta feed. `token = None` requests a full
    /// resync. Implementations signal token expiration via
    /// `SyncError::DeltaExpired`.
    async fn delta(
        &self,
        cancel: &CancellationToken,
        drive_id: &DriveId,
        token: Option<&str>,
    ) -> Result<DeltaPage, SyncError>;
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        cancel: &CancellationToken,
        drive_id: &DriveId,
        item_id: &ItemId,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SyncError>;
}

/// Optional capability: resumable ranged download, used by the transfer
/// layer for `.partial` resume (spec §6).
#[async_trait]
pub trait RangeDownloader: Downloader {
    async fn download_range(
        &self,
        cancel: &CancellationToken,
        drive_id: &DriveId,
        item_id: &ItemId,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
        offset: u64,
    ) -> Result<u64, SyncError>;
}

#[derive(Debug, Clone)]
pub struct RemoteItem {
    pub item_id: ItemId,
    pub drive_id: DriveId,
    pub etag: Option<String>,
    pub hash: Option<String>,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn upload(
        &self,
        cancel: &CancellationToken,
        drive_id: &DriveId,
        parent_id: &ItemId,
        name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        mtime: DateTime<Utc>,
    ) -> Result<RemoteItem, SyncError>;
}

/// Optional capability: large-file upload sessions with cross-crash resume
/// (spec §6). The session file itself — `{SessionURL, FileHash, FileSize}`
/// keyed by `(drive_id, remote_path)` — is the executor's responsibility;
/// only the capability surface is specified here.
#[async_trait]
pub trait SessionUploader: Send + Sync {
    async fn create_upload_session(
        &self,
        cancel: &CancellationToken,
        drive_id: &DriveId,
        parent_id: &ItemId,
        name: &str,
        size: u64,
    ) -> Result<String, SyncError>;

    async fn resume_upload(
        &self,
        cancel: &CancellationToken,
        session_url: &str,
    ) -> Result<u64, SyncError>;

    async fn upload_from_session(
        &self,
        cancel: &CancellationToken,
        session_url: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
    ) -> Result<RemoteItem, SyncError>;
}

/// Consumes an [`ActionPlan`] respecting its dependency edges and produces
/// one [`Outcome`] per [`Action`]. Out of scope per spec §1; only the
/// contract is specified. An in-memory test double lives in `testutil`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, plan: &ActionPlan) -> Vec<Outcome>;
}

/// Helper shared by executor implementations: order action indices so every
/// dependency in `plan.deps[i]` is visited before `i`. Not itself a
/// contract method — provided because every real executor needs it and the
/// ordering algorithm is dictated entirely by spec §4.4.8.
pub fn dependency_order(plan: &ActionPlan) -> Vec<usize> {
    let n = plan.actions.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    fn visit(
        i: usize,
        plan: &ActionPlan,
        visited: &mut [bool],
        order: &mut Vec<usize>,
    ) {
        if visited[i] {
            return;
        }
        visited[i] = true;
        for &dep in &plan.deps[i] {
            visit(dep, plan, visited, order);
        }
        order.push(i);
    }

    for i in 0..n {
        visit(i, plan, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SyncPath;
    use crate::model::{ActionType, ItemType, PathView};

    fn dummy_action(path: &str) -> Action {
        Action {
            action_type: ActionType::Upload,
            path: SyncPath::from_raw(path),
            old_path: None,
            drive_id: DriveId::zero(),
            item_id: ItemId::new(""),
            parent_id: None,
            item_type: ItemType::File,
            conflict_info: None,
            create_side: None,
            view: PathView {
                path: SyncPath::from_raw(path),
                baseline: None,
                local: None,
                remote: None,
            },
        }
    }

    #[test]
    fn dependency_order_respects_edges() {
        let plan = ActionPlan {
            actions: vec![dummy_action("a"), dummy_action("a/b"), dummy_action("a/b/c")],
            deps: vec![vec![], vec![0], vec![1]],
        };
        let order = dependency_order(&plan);
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(1) < pos(2));
    }
}
