//! Preset commands.

use anyhow::Result;

use crate::cli::{Cli, PresetAction};
use crate::config::ConfigManager;
use crate::fetcher::Fetcher;
use crate::models::Preset;
use crate::store::StateStore;

use super::{resolve_entries, Ctx};

pub async fn run(cli: &Cli, action: &PresetAction) -> Result<()> {
    match action {
        PresetAction::List => list(cli),
        PresetAction::Create { name, servers } => create(cli, name, servers).await,
        PresetAction::Delete { name } => delete(cli, name),
        PresetAction::Apply { name, block_others } => apply(cli, name, *block_others).await,
    }
}

fn store_for(cli: &Cli) -> StateStore {
    let manager = ConfigManager::new(cli.config_dir.as_deref());
    StateStore::new(manager.dir().to_path_buf())
}

fn list(cli: &Cli) -> Result<()> {
    let presets = store_for(cli).load_presets();
    if presets.is_empty() {
        println!("No presets found.");
        return Ok(());
    }

    println!("Saved Presets:");
    println!("{}", "-".repeat(50));
    for preset in presets {
        let mode = if preset.clustered {
            "clustered"
        } else {
            "unclustered"
        };
        println!("  {} ({} servers, {})", preset.name, preset.servers.len(), mode);
        for server in preset.servers.iter().take(5) {
            println!("    - {}", server);
        }
        if preset.servers.len() > 5 {
            println!("    ... and {} more", preset.servers.len() - 5);
        }
    }
    Ok(())
}

async fn create(cli: &Cli, name: &str, servers: &[String]) -> Result<()> {
    let manager = ConfigManager::new(cli.config_dir.as_deref());
    let config = manager.load();
    let clustered = cli.clustered || config.clustered;

    // Validate against live server data so presets hold real codes.
    let fetcher = Fetcher::new(manager.dir())?;
    let catalog = fetcher.fetch().await?;
    let entries = resolve_entries(&catalog, servers, clustered);
    if entries.is_empty() {
        anyhow::bail!("no valid servers for preset");
    }

    let preset = Preset {
        name: name.to_string(),
        servers: entries.iter().map(|e| e.code.clone()).collect(),
        clustered,
    };
    let count = preset.servers.len();

    let created = store_for(cli).add_preset(preset)?;
    let verb = if created { "Created" } else { "Replaced" };
    println!("{} preset '{}' with {} servers", verb, name, count);
    Ok(())
}

fn delete(cli: &Cli, name: &str) -> Result<()> {
    if store_for(cli).delete_preset(name)? {
        println!("Deleted preset '{}'", name);
        Ok(())
    } else {
        anyhow::bail!("preset '{}' not found", name)
    }
}

async fn apply(cli: &Cli, name: &str, block_others: bool) -> Result<()> {
    let ctx = Ctx::init(cli)?;
    let Some(preset) = ctx.store.get_preset(name) else {
        anyhow::bail!("preset '{}' not found", name);
    };

    let catalog = ctx.fetch_catalog().await?;
    let clustered = preset.clustered;

    if block_others {
        // Desired = everything not named by the preset.
        let desired: Vec<_> = catalog
            .universe(clustered)
            .into_iter()
            .filter(|entry| !preset.servers.contains(&entry.code))
            .collect();
        let report = ctx.reconcile_entries(&desired).await?;
        println!(
            "Applied preset '{}': {} servers blocked, {} kept open",
            name,
            report.effective.len(),
            preset.servers.len()
        );
    } else {
        // Just make sure the preset's servers are not blocked.
        let mut blocked = ctx.store.load_blocked();
        for code in &preset.servers {
            blocked.remove(code);
        }
        let desired = catalog.entries_for_codes(blocked.iter(), clustered);
        let report = ctx.reconcile_entries(&desired).await?;
        println!(
            "Applied preset '{}': {} servers remain blocked",
            name,
            report.effective.len()
        );
    }
    Ok(())
}
