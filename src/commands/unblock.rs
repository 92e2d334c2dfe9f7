//! Unblock command.

use anyhow::Result;

use super::{resolve_entries, Ctx};

pub async fn run(ctx: &Ctx, names: &[String], all: bool) -> Result<()> {
    if all {
        // Converge onto the empty set; no catalog needed.
        let report = ctx.reconcile_entries(&[]).await?;
        println!("All servers unblocked ({} rules removed).", report.removed);
        return Ok(());
    }

    if names.is_empty() {
        anyhow::bail!("specify servers to unblock or use --all");
    }

    let catalog = ctx.fetch_catalog().await?;
    let entries = resolve_entries(&catalog, names, ctx.clustered);
    if entries.is_empty() {
        anyhow::bail!("no matching servers to unblock");
    }

    let mut blocked = ctx.store.load_blocked();
    for entry in &entries {
        blocked.remove(&entry.code);
    }

    let desired = catalog.entries_for_codes(blocked.iter(), ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!("Blocked servers remaining: {}", report.effective.len());
    Ok(())
}
