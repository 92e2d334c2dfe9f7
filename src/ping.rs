//! Latency measurement for server relays.
//!
//! Tries the system `ping` first (works unprivileged on most distros) and
//! falls back to timing a TCP connect. Servers that answer neither within
//! the timeout are marked as timed out.

use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

use crate::models::{ServerEntry, ServerStatus};

const TCP_FALLBACK_PORT: u16 = 443;

pub struct PingService {
    timeout: Duration,
}

impl PingService {
    pub fn new(timeout_secs: f64) -> Self {
        Self {
            timeout: Duration::from_secs_f64(timeout_secs),
        }
    }

    /// Ping every server concurrently, annotating latency and status.
    pub async fn ping_servers(&self, servers: &mut [ServerEntry]) {
        let mut tasks = JoinSet::new();

        for (idx, entry) in servers.iter().enumerate() {
            let Some(ip) = entry.ip_addresses().into_iter().next() else {
                continue;
            };
            let timeout = self.timeout;
            tasks.spawn(async move { (idx, ping_host(ip, timeout).await) });
        }

        while let Some(result) = tasks.join_next().await {
            let Ok((idx, latency)) = result else {
                continue;
            };
            match latency {
                Some(ms) => {
                    servers[idx].latency_ms = Some(ms);
                    if servers[idx].status == ServerStatus::Unknown {
                        servers[idx].status = ServerStatus::Available;
                    }
                }
                None => servers[idx].status = ServerStatus::Timeout,
            }
        }
    }
}

/// Round-trip time to a host in milliseconds, or None on timeout.
pub async fn ping_host(ip: IpAddr, timeout: Duration) -> Option<u32> {
    if let Some(ms) = subprocess_ping(ip, timeout).await {
        return Some(ms);
    }
    tcp_ping(ip, timeout).await
}

async fn subprocess_ping(ip: IpAddr, timeout: Duration) -> Option<u32> {
    let wait_secs = timeout.as_secs().max(1).to_string();
    let output = tokio::process::Command::new("ping")
        .args(["-c", "1", "-W", &wait_secs, &ip.to_string()])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_ping_time(&String::from_utf8_lossy(&output.stdout))
}

async fn tcp_ping(ip: IpAddr, timeout: Duration) -> Option<u32> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((ip, TCP_FALLBACK_PORT))).await {
        Ok(Ok(_)) => Some(start.elapsed().as_millis() as u32),
        other => {
            debug!("tcp ping to {} failed: {:?}", ip, other.is_err());
            None
        }
    }
}

/// Extract the `time=` value from ping output.
fn parse_ping_time(output: &str) -> Option<u32> {
    for line in output.lines() {
        let Some(idx) = line.find("time=") else {
            continue;
        };
        let after = &line[idx + 5..];
        let value: String = after
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(ms) = value.parse::<f64>() {
            return Some(ms.round() as u32);
        }
    }
    None
}
