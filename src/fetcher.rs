//! Server data provider: fetches relay data from the Steam SDR API.
//!
//! The last successful payload is snapshotted to disk so the tool keeps
//! working (on possibly stale data) when the network is down. The engine
//! operates purely on the identifiers and addresses handed to it and does
//! not retry fetches itself.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{ServerEntry, ServerRelay, DEFAULT_CLUSTERS};

pub const STEAM_SDR_API_URL: &str =
    "https://api.steampowered.com/ISteamApps/GetSDRConfig/v1/?appid=730";

const TIMEOUT_SECS: u64 = 30;
const SNAPSHOT_FILE: &str = "servers.json";

#[derive(Debug, Deserialize)]
struct SdrConfig {
    revision: Option<serde_json::Value>,
    #[serde(default)]
    pops: BTreeMap<String, SdrPop>,
}

#[derive(Debug, Deserialize)]
struct SdrPop {
    desc: Option<String>,
    #[serde(default)]
    relays: Vec<SdrRelay>,
}

#[derive(Debug, Deserialize)]
struct SdrRelay {
    ipv4: Option<Ipv4Addr>,
    port_range: Option<(u16, u16)>,
}

/// Parsed server data, in both the flat and the clustered view.
#[derive(Debug, Clone)]
pub struct ServerCatalog {
    pub revision: String,
    servers: BTreeMap<String, ServerEntry>,
    clustered: BTreeMap<String, ServerEntry>,
}

impl ServerCatalog {
    pub(crate) fn build(revision: String, entries: Vec<ServerEntry>) -> Self {
        let mut servers = BTreeMap::new();
        let mut clustered: BTreeMap<String, ServerEntry> = BTreeMap::new();

        for entry in entries {
            let cluster = DEFAULT_CLUSTERS
                .iter()
                .find(|(_, keywords)| keywords.iter().any(|k| entry.name.contains(k)))
                .map(|(name, _)| *name);

            match cluster {
                Some(name) => {
                    let code = cluster_code(name);
                    clustered
                        .entry(code.clone())
                        .and_modify(|merged| merged.relays.extend(entry.relays.clone()))
                        .or_insert_with(|| {
                            ServerEntry::new(code.clone(), name, entry.relays.clone())
                        });
                }
                None => {
                    clustered.insert(entry.code.clone(), entry.clone());
                }
            }

            servers.insert(entry.code.clone(), entry);
        }

        Self {
            revision,
            servers,
            clustered,
        }
    }

    fn from_payload(payload: &str) -> Result<Self, EngineError> {
        let config: SdrConfig = serde_json::from_str(payload)
            .map_err(|err| EngineError::ProviderUnavailable(format!("bad payload: {}", err)))?;

        let revision = match config.revision {
            Some(value) => value.to_string().trim_matches('"').to_string(),
            None => {
                return Err(EngineError::ProviderUnavailable(
                    "server data missing revision field".to_string(),
                ))
            }
        };

        let mut entries = Vec::new();
        for (code, pop) in config.pops {
            let relays: Vec<ServerRelay> = pop
                .relays
                .iter()
                .filter_map(|relay| {
                    relay.ipv4.map(|ipv4| ServerRelay {
                        ipv4,
                        port_range: relay.port_range,
                    })
                })
                .collect();
            if relays.is_empty() {
                continue;
            }
            let name = pop.desc.unwrap_or_else(|| code.clone());
            entries.push(ServerEntry::new(code, name, relays));
        }

        Ok(Self::build(revision, entries))
    }

    /// Servers in the requested view.
    pub fn servers(&self, clustered: bool) -> &BTreeMap<String, ServerEntry> {
        if clustered {
            &self.clustered
        } else {
            &self.servers
        }
    }

    /// All entries of a view, cloned for annotation.
    pub fn universe(&self, clustered: bool) -> Vec<ServerEntry> {
        self.servers(clustered).values().cloned().collect()
    }

    /// Find a server by code, name, or display name, case-insensitively.
    pub fn resolve(&self, query: &str, clustered: bool) -> Option<&ServerEntry> {
        let lowered = query.to_lowercase();
        let servers = self.servers(clustered);

        servers
            .values()
            .find(|s| s.code.to_lowercase() == lowered)
            .or_else(|| {
                servers.values().find(|s| {
                    s.name.to_lowercase() == lowered
                        || s.display_name().to_lowercase() == lowered
                })
            })
    }

    /// Entries for a set of codes, tolerating stale codes the provider no
    /// longer publishes.
    pub fn entries_for_codes<'a, I>(&self, codes: I, clustered: bool) -> Vec<ServerEntry>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let servers = self.servers(clustered);
        let mut entries = Vec::new();
        for code in codes {
            match servers.get(code) {
                Some(entry) => entries.push(entry.clone()),
                None => warn!("Ignoring unknown server code '{}'", code),
            }
        }
        entries
    }
}

fn cluster_code(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '(' && *c != ')')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// HTTP client for the SDR endpoint, with a disk snapshot fallback.
pub struct Fetcher {
    client: Client,
    api_url: String,
    snapshot_path: PathBuf,
}

impl Fetcher {
    pub fn new(state_dir: &Path) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!(
                "deadlock-server-picker/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: STEAM_SDR_API_URL.to_string(),
            snapshot_path: state_dir.join(SNAPSHOT_FILE),
        })
    }

    /// Fetch and parse server data, falling back to the last snapshot.
    pub async fn fetch(&self) -> Result<ServerCatalog, EngineError> {
        match self.fetch_remote().await {
            Ok(payload) => {
                let catalog = ServerCatalog::from_payload(&payload)?;
                self.write_snapshot(&payload);
                info!(
                    "Server data loaded (revision {}, {} servers)",
                    catalog.revision,
                    catalog.servers(false).len()
                );
                Ok(catalog)
            }
            Err(err) => {
                warn!("Fetch failed ({}), trying cached snapshot", err);
                match self.load_snapshot() {
                    Some(payload) => {
                        let catalog = ServerCatalog::from_payload(&payload)?;
                        warn!(
                            "Using cached server data (revision {}); it may be stale",
                            catalog.revision
                        );
                        Ok(catalog)
                    }
                    None => Err(EngineError::ProviderUnavailable(err)),
                }
            }
        }
    }

    async fn fetch_remote(&self) -> Result<String, String> {
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    fn write_snapshot(&self, payload: &str) {
        if let Some(parent) = self.snapshot_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::write(&self.snapshot_path, payload) {
            debug!("Could not write server snapshot: {}", err);
        }
    }

    fn load_snapshot(&self) -> Option<String> {
        std::fs::read_to_string(&self.snapshot_path).ok()
    }
}
