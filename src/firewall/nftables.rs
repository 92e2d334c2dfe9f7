//! nftables backend implementation.
//!
//! Rules live in a dedicated `inet` table with a `block` chain on the
//! output hook and a `forward_block` chain on the forward hook. Batch
//! scripts are fed to `nft -f -` on stdin so each operation applies
//! atomically; deletions resolve rule handles from `nft -a list`.

use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::{format_target, parse_target, FirewallBackend, RuleDescriptor};
use crate::error::EngineError;
use crate::shell::{args_to_strings, Shell};

const TABLE: &str = "deadlock_server_picker";
const BLOCK_CHAIN: &str = "block";
const FORWARD_CHAIN: &str = "forward_block";

/// nftables backend
pub struct NftablesBackend {
    shell: Arc<Shell>,
}

impl NftablesBackend {
    pub fn new(shell: Arc<Shell>) -> Self {
        Self { shell }
    }

    fn exec_script(&self, operation: &str, script: &str) -> Result<(), EngineError> {
        debug!("nft script for {}:\n{}", operation, script);
        self.shell
            .mutate_with_stdin(operation, "nft", &args_to_strings(&["-f", "-"]), script)?;
        Ok(())
    }

    fn table_present(&self) -> Result<bool, EngineError> {
        let args = args_to_strings(&["list", "table", "inet", TABLE]);
        Ok(self.shell.probe("nft", &args)?.success)
    }

    fn listing(&self, with_handles: bool) -> Result<Option<String>, EngineError> {
        let args = if with_handles {
            args_to_strings(&["-a", "list", "table", "inet", TABLE])
        } else {
            args_to_strings(&["list", "table", "inet", TABLE])
        };
        let output = self.shell.probe("nft", &args)?;
        if output.success {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }
}

/// Match expression family selector for a target.
fn family(target: &IpNet) -> &'static str {
    match target {
        IpNet::V4(_) => "ip",
        IpNet::V6(_) => "ip6",
    }
}

#[async_trait]
impl FirewallBackend for NftablesBackend {
    async fn ensure_container(&self) -> Result<(), EngineError> {
        // `add` is idempotent for both tables and chains.
        let script = format!(
            "add table inet {table}\n\
             add chain inet {table} {block} {{ type filter hook output priority 0 ; policy accept ; }}\n\
             add chain inet {table} {forward} {{ type filter hook forward priority 0 ; policy accept ; }}\n",
            table = TABLE,
            block = BLOCK_CHAIN,
            forward = FORWARD_CHAIN,
        );
        self.exec_script("ensure container", &script)
    }

    async fn add_rule(&self, rule: &RuleDescriptor) -> Result<bool, EngineError> {
        if self.list_rules().await?.contains(rule) {
            return Ok(false);
        }

        let addr = format_target(&rule.target);
        let fam = family(&rule.target);
        let script = format!(
            "add rule inet {table} {block} {fam} daddr {addr} drop\n\
             add rule inet {table} {forward} {fam} daddr {addr} drop\n",
            table = TABLE,
            block = BLOCK_CHAIN,
            forward = FORWARD_CHAIN,
            fam = fam,
            addr = addr,
        );
        self.exec_script(&format!("add rule for {}", rule.target), &script)?;
        Ok(true)
    }

    async fn remove_rule(&self, rule: &RuleDescriptor) -> Result<(), EngineError> {
        let Some(listing) = self.listing(true)? else {
            return Ok(());
        };

        let handles = collect_handles(&listing, &rule.target);
        if handles.is_empty() {
            return Ok(());
        }

        let mut script = String::new();
        for (chain, handle) in &handles {
            script.push_str(&format!(
                "delete rule inet {} {} handle {}\n",
                TABLE, chain, handle
            ));
        }
        self.exec_script(&format!("remove rule for {}", rule.target), &script)
    }

    async fn list_rules(&self) -> Result<BTreeSet<RuleDescriptor>, EngineError> {
        match self.listing(false)? {
            // The forward chain mirrors the block chain, so parsing the
            // block chain alone yields the logical rule set.
            Some(listing) => Ok(parse_block_chain(&listing)),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn flush_container(&self) -> Result<(), EngineError> {
        if !self.table_present()? {
            return Ok(());
        }
        let script = format!(
            "flush chain inet {table} {block}\nflush chain inet {table} {forward}\n",
            table = TABLE,
            block = BLOCK_CHAIN,
            forward = FORWARD_CHAIN,
        );
        self.exec_script("flush container", &script)
    }

    async fn container_exists(&self) -> Result<bool, EngineError> {
        self.table_present()
    }
}

/// Parse the `block` chain of a `nft list table` listing into descriptors.
fn parse_block_chain(listing: &str) -> BTreeSet<RuleDescriptor> {
    let mut rules = BTreeSet::new();
    let mut current_chain: Option<String> = None;
    let mut position = 0u32;

    for line in listing.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("chain ") {
            current_chain = rest.split_whitespace().next().map(str::to_string);
            continue;
        }
        if current_chain.as_deref() != Some(BLOCK_CHAIN) {
            continue;
        }
        if let Some(target) = rule_target(trimmed) {
            position += 1;
            rules.insert(RuleDescriptor::drop_outbound(target).at_position(position));
        }
    }

    rules
}

/// Extract the drop target from one rule line, if it is one of ours.
fn rule_target(line: &str) -> Option<IpNet> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if !tokens.contains(&"drop") {
        return None;
    }
    let idx = tokens.iter().position(|t| *t == "daddr")?;
    tokens.get(idx + 1).and_then(|s| parse_target(s))
}

/// Find (chain, handle) pairs for rules matching a target in the output of
/// `nft -a list table`.
fn collect_handles(listing: &str, target: &IpNet) -> Vec<(String, u64)> {
    let mut handles = Vec::new();
    let mut current_chain: Option<String> = None;

    for line in listing.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("chain ") {
            current_chain = rest.split_whitespace().next().map(str::to_string);
            continue;
        }
        let Some(chain) = current_chain.as_deref() else {
            continue;
        };
        if rule_target(trimmed) != Some(*target) {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if let Some(idx) = tokens.iter().position(|t| *t == "handle") {
            if let Some(handle) = tokens.get(idx + 1).and_then(|s| s.parse::<u64>().ok()) {
                handles.push((chain.to_string(), handle));
            }
        }
    }

    handles
}
