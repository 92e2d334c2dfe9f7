//! Block commands: block, block-all, block-except.

use anyhow::Result;

use super::{resolve_entries, Ctx};

/// Block the named servers, converging the firewall onto the union of the
/// persisted blocked set and the new entries.
pub async fn run(ctx: &Ctx, names: &[String]) -> Result<()> {
    let catalog = ctx.fetch_catalog().await?;
    let entries = resolve_entries(&catalog, names, ctx.clustered);
    if entries.is_empty() {
        anyhow::bail!("no matching servers to block");
    }

    let mut blocked = ctx.store.load_blocked();
    for entry in &entries {
        blocked.insert(entry.code.clone());
    }

    let desired = catalog.entries_for_codes(blocked.iter(), ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!("Blocked servers: {}", report.effective.len());
    Ok(())
}

/// Block every server the provider knows about.
pub async fn run_all(ctx: &Ctx) -> Result<()> {
    let catalog = ctx.fetch_catalog().await?;
    let desired = catalog.universe(ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!("Blocked servers: {}", report.effective.len());
    Ok(())
}

/// Block everything except the named servers.
pub async fn run_except(ctx: &Ctx, keep_names: &[String]) -> Result<()> {
    let catalog = ctx.fetch_catalog().await?;
    let keep = resolve_entries(&catalog, keep_names, ctx.clustered);
    if keep.is_empty() {
        anyhow::bail!("no valid servers specified to keep");
    }

    let keep_codes: Vec<String> = keep.iter().map(|e| e.code.clone()).collect();
    let desired: Vec<_> = catalog
        .universe(ctx.clustered)
        .into_iter()
        .filter(|entry| !keep_codes.contains(&entry.code))
        .collect();

    let report = ctx.reconcile_entries(&desired).await?;
    println!(
        "Blocked {} servers, keeping {} unblocked",
        report.effective.len(),
        keep_codes.len()
    );
    Ok(())
}
