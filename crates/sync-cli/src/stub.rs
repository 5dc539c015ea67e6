//! In-memory stand-ins for the collaborator traits sync-core only consumes
//! (spec §6): a delta fetcher that always reports "nothing new" and an
//! executor that resolves every action immediately. Neither talks to a real
//! network or filesystem; they exist so `run`/`plan` can exercise the full
//! pipeline without a transport crate in the workspace.

use async_trait::async_trait;
use chrono::Utc;
use sync_core::errors::SyncError;
use sync_core::ids::DriveId;
use sync_core::model::{Action, ActionPlan, ActionType, CreateSide, Outcome};
use sync_core::transport::{CancellationToken, DeltaFetcher, DeltaPage};

/// Reports an empty, already-current delta feed. Good enough to let the
/// remote observer run its full machinery (paging, token handling) in a
/// demonstration where no server is reachable.
pub struct EmptyDeltaFetcher;

#[async_trait]
impl DeltaFetcher for EmptyDeltaFetcher {
    async fn delta(
        &self,
        _cancel: &CancellationToken,
        _drive_id: &DriveId,
        _token: Option<&str>,
    ) -> Result<DeltaPage, SyncError> {
        Ok(DeltaPage {
            items: Vec::new(),
            next_link: None,
            delta_link: Some("stub-delta-token".to_string()),
        })
    }
}

/// Marks every action successful without performing any I/O, deriving the
/// `Outcome` fields from whichever side of the [`sync_core::model::PathView`]
/// the action is writing toward.
pub struct ImmediateExecutor;

#[async_trait]
impl sync_core::transport::Executor for ImmediateExecutor {
    async fn execute(&self, plan: &ActionPlan) -> Vec<Outcome> {
        plan.actions.iter().map(outcome_for).collect()
    }
}

fn outcome_for(action: &Action) -> Outcome {
    let source_side = match action.action_type {
        ActionType::Download => action.view.remote.as_ref(),
        ActionType::Upload => action.view.local.as_ref(),
        ActionType::FolderCreate => match action.create_side {
            Some(CreateSide::Local) => action.view.remote.as_ref(),
            _ => action.view.local.as_ref(),
        },
        _ => action.view.local.as_ref().or(action.view.remote.as_ref()),
    };

    Outcome {
        action_type: action.action_type,
        success: true,
        path: action.path.clone(),
        old_path: action.old_path.clone(),
        drive_id: action.drive_id.clone(),
        item_id: action.item_id.clone(),
        parent_id: action.parent_id.clone(),
        item_type: action.item_type,
        local_hash: source_side.and_then(|s| s.hash.clone()),
        remote_hash: source_side.and_then(|s| s.hash.clone()),
        size: source_side.and_then(|s| s.size),
        mtime: source_side.and_then(|s| s.mtime).or(Some(Utc::now())),
        etag: None,
        conflict_type: action.conflict_info.as_ref().map(|c| c.conflict_type),
        resolved_by: None,
    }
}
