//! Data models shared across the tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Display status of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Unknown,
    Available,
    Blocked,
    Timeout,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Unknown => "unknown",
            ServerStatus::Available => "available",
            ServerStatus::Blocked => "blocked",
            ServerStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A single relay address published for a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRelay {
    pub ipv4: Ipv4Addr,
    pub port_range: Option<(u16, u16)>,
}

/// A game-server region as published by the provider.
///
/// Immutable once loaded; `latency_ms` and `status` are display-side
/// annotations filled in by the ping service and the blocked-set lookup.
#[derive(Debug, Clone)]
pub struct ServerEntry {
    /// Short code, e.g. "sgp"
    pub code: String,
    /// Human-readable name, e.g. "Singapore"
    pub name: String,
    /// Region tag from the built-in region presets, if any
    pub region: Option<String>,
    pub relays: Vec<ServerRelay>,
    pub latency_ms: Option<u32>,
    pub status: ServerStatus,
}

impl ServerEntry {
    pub fn new(code: impl Into<String>, name: impl Into<String>, relays: Vec<ServerRelay>) -> Self {
        let code = code.into();
        Self {
            region: crate::regions::region_for_code(&code).map(str::to_string),
            code,
            name: name.into(),
            relays,
            latency_ms: None,
            status: ServerStatus::Unknown,
        }
    }

    /// All relay addresses, in relay order.
    pub fn ip_addresses(&self) -> Vec<IpAddr> {
        self.relays.iter().map(|r| IpAddr::V4(r.ipv4)).collect()
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.code)
    }
}

impl fmt::Display for ServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())?;
        if let Some(ms) = self.latency_ms {
            write!(f, " - {}ms", ms)?;
        }
        if self.status != ServerStatus::Unknown {
            write!(f, " [{}]", self.status)?;
        }
        Ok(())
    }
}

/// The set of server codes the user intends to have blocked.
///
/// This is the single source of truth the engine reconciles the firewall
/// against; it may diverge from what the firewall currently contains after
/// crashes or manual edits, and reconciliation tolerates that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockedSet {
    codes: BTreeSet<String>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>) -> bool {
        self.codes.insert(code.into())
    }

    pub fn remove(&mut self, code: &str) -> bool {
        self.codes.remove(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.codes.iter()
    }

    pub fn codes(&self) -> &BTreeSet<String> {
        &self.codes
    }
}

impl FromIterator<String> for BlockedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

/// A saved preset of server codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub servers: Vec<String>,
    #[serde(default)]
    pub clustered: bool,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} servers)", self.name, self.servers.len())
    }
}

/// Name keywords used to merge related servers into one clustered entry.
pub const DEFAULT_CLUSTERS: &[(&str, &[&str])] = &[
    ("China", &["Perfect", "Hong Kong", "Alibaba", "Tencent"]),
    ("Japan", &["Tokyo"]),
    ("Stockholm (Sweden)", &["Stockholm"]),
    ("India", &["Chennai", "Mumbai"]),
];
