//! List command: servers with blocked state and optional latency.

use anyhow::Result;

use crate::config::{Config, ConfigManager};
use crate::fetcher::Fetcher;
use crate::models::{ServerEntry, ServerStatus};
use crate::ping::PingService;
use crate::store::StateStore;

/// Width of the name column; long names are truncated to fit.
const NAME_WIDTH: usize = 30;

pub struct ListOpts {
    pub ping: bool,
    pub blocked_only: bool,
    pub clustered: bool,
}

pub async fn run(manager: &ConfigManager, config: &Config, opts: ListOpts) -> Result<()> {
    let fetcher = Fetcher::new(manager.dir())?;
    let catalog = fetcher.fetch().await?;
    let store = StateStore::new(manager.dir().to_path_buf());
    let blocked = store.load_blocked();

    let mut servers = catalog.universe(opts.clustered);
    for entry in &mut servers {
        if blocked.contains(&entry.code) {
            entry.status = ServerStatus::Blocked;
        }
    }

    if opts.blocked_only {
        servers.retain(|s| s.status == ServerStatus::Blocked);
    }

    if opts.ping {
        println!("Pinging {} server(s)...", servers.len());
        PingService::new(config.ping_timeout)
            .ping_servers(&mut servers)
            .await;
    }

    let mode = if opts.clustered {
        "clustered"
    } else {
        "unclustered"
    };
    println!();
    println!("Deadlock Servers ({} mode):", mode);
    print_server_table(&servers, opts.ping);

    println!();
    println!("Total: {} servers", servers.len());
    let blocked_count = servers
        .iter()
        .filter(|s| s.status == ServerStatus::Blocked)
        .count();
    if blocked_count > 0 {
        println!("Blocked: {}", blocked_count);
    }

    Ok(())
}

pub fn print_server_table(servers: &[ServerEntry], show_latency: bool) {
    if servers.is_empty() {
        println!("No servers found.");
        return;
    }

    let mut header = format!("{:<width$}  {:<12}", "Server", "Status", width = NAME_WIDTH);
    if show_latency {
        header.push_str(&format!("  {:<10}", "Latency"));
    }
    header.push_str("  IPs");
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    let mut sorted: Vec<&ServerEntry> = servers.iter().collect();
    sorted.sort_by_key(|s| (s.status != ServerStatus::Blocked, s.latency_ms.unwrap_or(u32::MAX)));

    for server in sorted {
        let mut row = format!(
            "{:<width$}  {:<12}",
            truncate(&server.display_name(), NAME_WIDTH),
            server.status.to_string(),
            width = NAME_WIDTH
        );
        if show_latency {
            let latency = match server.latency_ms {
                Some(ms) => format!("{}ms", ms),
                None => "N/A".to_string(),
            };
            row.push_str(&format!("  {:<10}", latency));
        }
        row.push_str(&format!("  {}", server.relays.len()));
        println!("{}", row);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly-10", 10), "exactly-10");
        assert_eq!(truncate("much longer than that", 10), "much long…");
    }
}
