//! Status command.

use anyhow::Result;

use super::Ctx;

pub async fn run(ctx: &Ctx) -> Result<()> {
    let exists = ctx.backend.container_exists().await?;
    let rules = ctx.backend.list_rules().await?;
    let blocked = ctx.store.load_blocked();
    let presets = ctx.store.load_presets();

    println!();
    println!("Deadlock Server Picker Status");
    println!("-----------------------------");

    let backend_name = if ctx.configured_auto {
        format!("{} (auto)", ctx.kind.as_str())
    } else {
        ctx.kind.as_str().to_string()
    };
    println!("Backend: {}", backend_name);
    if ctx.dry_run {
        println!("Mode: DRY RUN");
    }
    println!("Container present: {}", if exists { "yes" } else { "no" });
    println!("Active rules: {}", rules.len());

    println!();
    println!("Declared blocked servers: {}", blocked.len());
    for code in blocked.iter().take(10) {
        println!("  - {}", code);
    }
    if blocked.len() > 10 {
        println!("  ... and {} more", blocked.len() - 10);
    }

    // The declared set and the firewall can diverge after crashes or
    // manual edits; surface that rather than hiding it.
    let declared_empty = blocked.is_empty();
    if declared_empty && !rules.is_empty() {
        println!();
        println!(
            "Note: {} rules present with no declared blocks; run 'reset' or re-block to converge.",
            rules.len()
        );
    }

    println!();
    println!("Saved presets: {}", presets.len());
    println!();

    Ok(())
}
