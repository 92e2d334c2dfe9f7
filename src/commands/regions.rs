//! Region commands: regions, list-region, allow-region, block-region,
//! unblock-region.

use anyhow::Result;
use std::collections::BTreeSet;

use crate::config::{Config, ConfigManager};
use crate::fetcher::Fetcher;
use crate::models::ServerStatus;
use crate::ping::PingService;
use crate::regions;
use crate::store::StateStore;

use super::list::print_server_table;
use super::Ctx;

/// Show the built-in region presets and their aliases.
pub fn run_regions() -> Result<()> {
    println!("Available Region Presets:");
    println!("{}", "-".repeat(60));

    let mut shown = BTreeSet::new();
    for (alias, canonical) in regions::aliases() {
        if !shown.insert(*canonical) {
            continue;
        }
        let preset = regions::resolve(canonical).expect("alias table is consistent");
        println!(
            "  {:<6} {:<20} {} ({} servers)",
            alias,
            preset.name,
            preset.description,
            preset.servers.len()
        );
    }

    println!();
    println!("Usage examples:");
    println!("  deadlock-server-picker allow-region na      # Allow only North America");
    println!("  deadlock-server-picker block-region cn      # Block China servers");
    println!("  deadlock-server-picker list-region eu       # List European servers");
    Ok(())
}

/// List the servers of one region.
pub async fn run_list_region(
    manager: &ConfigManager,
    config: &Config,
    region: &str,
    ping: bool,
    clustered: bool,
) -> Result<()> {
    let Some(codes) = regions::region_servers(region) else {
        anyhow::bail!("unknown region '{}' (see 'regions')", region);
    };

    let fetcher = Fetcher::new(manager.dir())?;
    let catalog = fetcher.fetch().await?;
    let store = StateStore::new(manager.dir().to_path_buf());
    let blocked = store.load_blocked();

    let mut servers: Vec<_> = catalog
        .universe(clustered)
        .into_iter()
        .filter(|s| codes.contains(&s.code.as_str()))
        .collect();
    for entry in &mut servers {
        if blocked.contains(&entry.code) {
            entry.status = ServerStatus::Blocked;
        }
    }

    if ping {
        println!("Pinging servers...");
        PingService::new(config.ping_timeout)
            .ping_servers(&mut servers)
            .await;
    }

    println!();
    println!("Servers in {}:", region);
    print_server_table(&servers, ping);
    println!();
    println!("Total: {} servers", servers.len());
    Ok(())
}

/// Allow only one region: converge onto "everything but the region".
pub async fn run_allow_region(ctx: &Ctx, region: &str) -> Result<()> {
    let Some(codes) = regions::region_servers(region) else {
        anyhow::bail!("unknown region '{}' (see 'regions')", region);
    };

    let catalog = ctx.fetch_catalog().await?;
    let desired: Vec<_> = catalog
        .universe(ctx.clustered)
        .into_iter()
        .filter(|s| !codes.contains(&s.code.as_str()))
        .collect();

    let report = ctx.reconcile_entries(&desired).await?;
    println!(
        "Allowed only {}: {} servers blocked",
        region,
        report.effective.len()
    );
    Ok(())
}

/// Add a region's servers to the blocked set.
pub async fn run_block_region(ctx: &Ctx, region: &str) -> Result<()> {
    let Some(codes) = regions::region_servers(region) else {
        anyhow::bail!("unknown region '{}' (see 'regions')", region);
    };

    let catalog = ctx.fetch_catalog().await?;
    let mut blocked = ctx.store.load_blocked();
    for entry in catalog.universe(ctx.clustered) {
        if codes.contains(&entry.code.as_str()) {
            blocked.insert(entry.code);
        }
    }

    let desired = catalog.entries_for_codes(blocked.iter(), ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!("Blocked servers: {}", report.effective.len());
    Ok(())
}

/// Remove a region's servers from the blocked set.
pub async fn run_unblock_region(ctx: &Ctx, region: &str) -> Result<()> {
    let Some(codes) = regions::region_servers(region) else {
        anyhow::bail!("unknown region '{}' (see 'regions')", region);
    };

    let catalog = ctx.fetch_catalog().await?;
    let mut blocked = ctx.store.load_blocked();
    for code in codes {
        blocked.remove(code);
    }

    let desired = catalog.entries_for_codes(blocked.iter(), ctx.clustered);
    let report = ctx.reconcile_entries(&desired).await?;
    println!("Blocked servers remaining: {}", report.effective.len());
    Ok(())
}
