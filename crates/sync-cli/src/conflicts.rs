use crate::cli::{ConflictsArgs, ResolveArgs};
use crate::context::AppContext;
use chrono::Utc;
use eyre::{eyre, Context, Result};
use sync_core::model::ConflictRecord;
use uuid::Uuid;

pub fn run_list(args: &ConflictsArgs) -> Result<()> {
    let ctx = AppContext::load(&args.db)?;
    let records = if args.all {
        ctx.store.list_all_conflicts()?
    } else {
        ctx.store.list_conflicts()?
    };

    if records.is_empty() {
        println!("no conflicts");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

pub fn run_resolve(args: &ResolveArgs) -> Result<()> {
    let ctx = AppContext::load(&args.db)?;
    let id = Uuid::parse_str(&args.id).map_err(|e| eyre!("invalid conflict id {}: {e}", args.id))?;
    ctx.store
        .resolve_conflict(id, args.resolution.into(), Utc::now())
        .context("resolving conflict")?;
    println!("resolved {id}");
    Ok(())
}

fn print_record(record: &ConflictRecord) {
    println!(
        "{} {:?} {} (resolution: {:?})",
        record.id,
        record.conflict_type,
        record.path.as_str(),
        record.resolution
    );
}
