//! Apply command: converge onto the configured preferences.
//!
//! Intended for the system-service invocation, so the container persists
//! after this command (no cleanup-on-exit). Preference precedence:
//! `default_region` shapes the base set, `always_block` is added on top,
//! `never_block` wins over everything.

use anyhow::Result;
use std::collections::BTreeSet;

use crate::regions;

use super::Ctx;

pub async fn run(ctx: &Ctx) -> Result<()> {
    let config = &ctx.config;
    if config.default_region.is_none()
        && config.always_block.is_empty()
        && config.never_block.is_empty()
    {
        println!("No preferences configured to apply.");
        println!("Use 'config set default_region <region>' to set preferences.");
        return Ok(());
    }

    let catalog = ctx.fetch_catalog().await?;
    let universe = catalog.universe(ctx.clustered);

    let mut desired_codes: BTreeSet<String> = ctx.store.load_blocked().codes().clone();

    if let Some(region) = &config.default_region {
        // Validated at load time; a stale config degrades to no region.
        if let Some(allowed) = regions::region_servers(region) {
            for entry in &universe {
                if !allowed.contains(&entry.code.as_str()) {
                    desired_codes.insert(entry.code.clone());
                }
            }
        }
    }

    for code in &config.always_block {
        desired_codes.insert(code.clone());
    }
    for code in &config.never_block {
        desired_codes.remove(code);
    }

    let desired = catalog.entries_for_codes(desired_codes.iter(), ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!(
        "Applied preferences: {} servers blocked",
        report.effective.len()
    );
    Ok(())
}
