//! Ping command.

use anyhow::Result;

use crate::config::{Config, ConfigManager};
use crate::fetcher::Fetcher;
use crate::ping::PingService;

use super::list::print_server_table;

pub async fn run(
    manager: &ConfigManager,
    config: &Config,
    names: &[String],
    clustered: bool,
) -> Result<()> {
    let fetcher = Fetcher::new(manager.dir())?;
    let catalog = fetcher.fetch().await?;

    let mut targets = if names.is_empty() {
        catalog.universe(clustered)
    } else {
        let mut found = Vec::new();
        for name in names {
            match catalog.resolve(name, clustered) {
                Some(entry) => found.push(entry.clone()),
                None => println!("Server not found: {}", name),
            }
        }
        found
    };

    if targets.is_empty() {
        anyhow::bail!("no servers to ping");
    }

    println!("Pinging {} server(s)...", targets.len());
    PingService::new(config.ping_timeout)
        .ping_servers(&mut targets)
        .await;

    print_server_table(&targets, true);
    Ok(())
}
