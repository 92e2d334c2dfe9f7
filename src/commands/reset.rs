//! Reset command: flush every rule, keep the container.

use anyhow::Result;

use crate::models::BlockedSet;

use super::Ctx;

pub async fn run(ctx: &Ctx) -> Result<()> {
    let before = ctx.backend.list_rules().await?.len();
    ctx.backend.flush_container().await?;

    if ctx.dry_run {
        for line in ctx.shell.recorded() {
            println!("[dry-run] would execute: {}", line);
        }
        println!("[dry-run] would flush {} rules", before);
        return Ok(());
    }

    ctx.store.save_blocked(&BlockedSet::new())?;
    println!("Flushed {} rules; container kept for reuse.", before);
    Ok(())
}
