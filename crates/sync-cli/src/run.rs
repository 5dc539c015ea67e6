use crate::cli::{PlanArgs, RunArgs};
use crate::context::AppContext;
use crate::stub::{EmptyDeltaFetcher, ImmediateExecutor};
use chrono::Utc;
use eyre::{Context, Result};
use std::sync::Arc;
use sync_core::buffer::ChangeBuffer;
use sync_core::ids::DriveId;
use sync_core::local_observer::LocalObserver;
use sync_core::model::ActionPlan;
use sync_core::planner;
use sync_core::remote_observer::RemoteObserver;
use sync_core::transport::{CancellationToken, Executor};

/// Placeholder drive identity for the demonstration pipeline; a real
/// deployment resolves this from the authenticated account instead.
fn demo_drive_id() -> DriveId {
    DriveId::canonicalize("demo-drive")
}

async fn build_plan(ctx: &AppContext, root: &std::path::Path, mode: sync_core::model::SyncMode) -> Result<(ActionPlan, String)> {
    let baseline = ctx.store.load().context("loading baseline")?;
    let cancel = CancellationToken::new();

    let local = LocalObserver::new(root);
    let local_events = local
        .full_scan(&cancel, &baseline)
        .context("scanning local root")?;

    let drive_id = demo_drive_id();
    let fetcher = Arc::new(EmptyDeltaFetcher);
    let remote = RemoteObserver::new(fetcher, drive_id.clone());
    let prior_token = ctx.store.get_delta_token(&drive_id)?;
    let (remote_events, new_token) = remote
        .full_delta(&cancel, prior_token.as_deref(), &baseline)
        .await
        .context("fetching remote delta")?;

    let buffer = ChangeBuffer::new();
    buffer.set_max_paths(0);
    buffer.add_all(local_events);
    buffer.add_all(remote_events);
    let changes = buffer.flush_immediate();

    let plan = planner::plan(changes, &baseline, mode, &ctx.config.safety)?;

    let now = Utc::now();
    let suppressed: std::collections::HashSet<_> = plan
        .actions
        .iter()
        .map(|a| a.path.clone())
        .filter(|p| ctx.failures.is_suppressed(p, now))
        .collect();
    let plan = planner::exclude_suppressed_paths(plan, &suppressed);

    Ok((plan, new_token))
}

pub async fn run_plan(args: &PlanArgs) -> Result<()> {
    let ctx = AppContext::load(&args.db)?;
    let (plan, _) = build_plan(&ctx, &args.root, args.mode.into()).await?;
    print_plan(&plan);
    Ok(())
}

pub async fn run_sync(args: &RunArgs) -> Result<()> {
    let ctx = AppContext::load(&args.db)?;
    let (plan, new_token) = build_plan(&ctx, &args.root, args.mode.into()).await?;
    print_plan(&plan);

    if args.dry_run {
        println!("(dry run: no actions executed, no outcomes committed)");
        return Ok(());
    }

    let executor = ImmediateExecutor;
    let outcomes = executor.execute(&plan).await;

    for outcome in &outcomes {
        if outcome.success {
            ctx.failures.record_success(&outcome.path);
        } else {
            ctx.failures.record_failure(&outcome.path, Utc::now());
        }
    }

    let drive_id = demo_drive_id();
    ctx.store
        .commit_outcomes(&outcomes, Some(&new_token), &drive_id)
        .context("committing outcomes")?;

    println!("committed {} outcome(s)", outcomes.len());
    Ok(())
}

fn print_plan(plan: &ActionPlan) {
    if plan.is_empty() {
        println!("nothing to do");
        return;
    }
    for (i, action) in plan.actions.iter().enumerate() {
        println!(
            "{i:>3}. {:?} {} {}",
            action.action_type,
            action.path.as_str(),
            action
                .old_path
                .as_ref()
                .map(|p| format!("(from {})", p.as_str()))
                .unwrap_or_default()
        );
        if !plan.deps[i].is_empty() {
            println!("     depends on: {:?}", plan.deps[i]);
        }
    }
}
