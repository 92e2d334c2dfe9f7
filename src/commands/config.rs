//! Config commands: show, set, reset, path.

use anyhow::Result;

use crate::cli::{Cli, ConfigAction};
use crate::config::{Config, ConfigManager};

pub fn run(cli: &Cli, action: &ConfigAction) -> Result<()> {
    let manager = ConfigManager::new(cli.config_dir.as_deref());

    match action {
        ConfigAction::Show => show(&manager),
        ConfigAction::Set { key, value } => set(&manager, key, value),
        ConfigAction::Reset => {
            manager.save(&Config::default())?;
            println!("Configuration reset to defaults");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", manager.config_path().display());
            Ok(())
        }
    }
}

fn show(manager: &ConfigManager) -> Result<()> {
    let config = manager.load();

    fn list_or_none(values: &[String]) -> String {
        if values.is_empty() {
            "(none)".to_string()
        } else {
            values.join(", ")
        }
    }

    println!("Current Configuration:");
    println!("{}", "-".repeat(40));
    println!("  backend:            {}", config.backend);
    println!("  use_sudo:           {}", config.use_sudo);
    println!("  auto_reset_on_exit: {}", config.auto_reset_on_exit);
    println!(
        "  default_region:     {}",
        config.default_region.as_deref().unwrap_or("(not set)")
    );
    println!("  ping_timeout:       {}s", config.ping_timeout);
    println!("  clustered:          {}", config.clustered);
    println!("  favorites:          {}", list_or_none(&config.favorites));
    println!("  always_block:       {}", list_or_none(&config.always_block));
    println!("  never_block:        {}", list_or_none(&config.never_block));
    println!();
    println!("Config file: {}", manager.config_path().display());
    Ok(())
}

fn set(manager: &ConfigManager, key: &str, value: &str) -> Result<()> {
    let mut config = manager.load();
    config.set_value(key, value)?;
    manager.save(&config)?;
    println!("Set {} = {}", key, value);
    Ok(())
}
