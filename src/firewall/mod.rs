//! Firewall backend abstraction (iptables, nftables).
//!
//! The engine owns one dedicated rule container per backend and never
//! enumerates or mutates rules outside it. Backends are selected once per
//! process by [`detect_backend`] and expose the fixed capability set of
//! [`FirewallBackend`].

mod iptables;
mod nftables;

use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;

pub use iptables::IptablesBackend;
pub use nftables::NftablesBackend;

use crate::config::Backend;
use crate::error::EngineError;
use crate::shell::{args_to_strings, CommandExecutor, Shell};

/// Logical name of the tool-owned rule container, shared across invocations
/// and process restarts. Realized as the iptables chain of the same name or
/// the nftables table `inet deadlock_server_picker`.
pub const CONTAINER_NAME: &str = "DEADLOCK_SERVER_PICKER";

/// Which firewall subsystem is driving the rules. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Iptables,
    Nftables,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Iptables => "iptables",
            BackendKind::Nftables => "nftables",
        }
    }
}

/// Traffic direction a rule applies to. Only outbound blocking is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Outbound,
}

/// What the rule does to matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleAction {
    Drop,
}

/// One concrete firewall rule inside the dedicated container.
///
/// Generated by the compiler or parsed back from a backend listing, never
/// hand-edited. Equality, ordering, and hashing deliberately ignore
/// `position`: presence is checked by what the rule matches, not where it
/// sits in the container.
#[derive(Debug, Clone)]
pub struct RuleDescriptor {
    pub target: IpNet,
    pub direction: Direction,
    pub action: RuleAction,
    pub container: String,
    pub position: Option<u32>,
}

impl RuleDescriptor {
    /// The only rule shape this tool emits: drop outbound traffic to a
    /// target, inside the dedicated container.
    pub fn drop_outbound(target: IpNet) -> Self {
        Self {
            target,
            direction: Direction::Outbound,
            action: RuleAction::Drop,
            container: CONTAINER_NAME.to_string(),
            position: None,
        }
    }

    pub fn at_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    fn key(&self) -> (&str, IpNet, Direction, RuleAction) {
        (
            self.container.as_str(),
            self.target,
            self.direction,
            self.action,
        )
    }
}

impl PartialEq for RuleDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RuleDescriptor {}

impl Ord for RuleDescriptor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for RuleDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for RuleDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Capability set every firewall backend implements.
///
/// All operations are idempotent: repeating any of them converges on the
/// same firewall state, which is what makes retry after partial failure
/// safe.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Create the dedicated container if absent; success if present.
    async fn ensure_container(&self) -> Result<(), EngineError>;

    /// Insert the rule if not already present (checked by descriptor
    /// equality, not position). Returns whether an insertion occurred, so
    /// callers can distinguish "already blocked" from "newly blocked".
    async fn add_rule(&self, rule: &RuleDescriptor) -> Result<bool, EngineError>;

    /// Delete a matching rule if present; no-op success if absent.
    async fn remove_rule(&self, rule: &RuleDescriptor) -> Result<(), EngineError>;

    /// Rules inside the dedicated container, parsed from the backend's
    /// native listing format. Empty when the container does not exist.
    async fn list_rules(&self) -> Result<BTreeSet<RuleDescriptor>, EngineError>;

    /// Remove all rules inside the container without deleting the
    /// container itself.
    async fn flush_container(&self) -> Result<(), EngineError>;

    async fn container_exists(&self) -> Result<bool, EngineError>;
}

/// Probe whether a firewall control tool is present and invocable.
fn tool_usable(executor: &dyn CommandExecutor, tool: &str) -> bool {
    executor
        .execute(tool, &args_to_strings(&["--version"]))
        .map(|output| output.success)
        .unwrap_or(false)
}

/// Determine which firewall subsystem to use.
///
/// An explicit override is honored (failing with `NoBackendAvailable` when
/// the named tool is missing). Auto-detection prefers the legacy iptables
/// tooling and falls back to nftables only when iptables is absent. The
/// result is cached by the caller for the process lifetime; detection is
/// never re-run per operation.
pub fn detect_backend(
    executor: &dyn CommandExecutor,
    configured: Backend,
) -> Result<BackendKind, EngineError> {
    match configured {
        Backend::Iptables => {
            if tool_usable(executor, "iptables") {
                Ok(BackendKind::Iptables)
            } else {
                Err(EngineError::NoBackendAvailable)
            }
        }
        Backend::Nftables => {
            if tool_usable(executor, "nft") {
                Ok(BackendKind::Nftables)
            } else {
                Err(EngineError::NoBackendAvailable)
            }
        }
        Backend::Auto => {
            if tool_usable(executor, "iptables") {
                Ok(BackendKind::Iptables)
            } else if tool_usable(executor, "nft") {
                Ok(BackendKind::Nftables)
            } else {
                Err(EngineError::NoBackendAvailable)
            }
        }
    }
}

/// Instantiate the adapter for a detected backend.
pub fn create_backend(shell: Arc<Shell>, kind: BackendKind) -> Box<dyn FirewallBackend> {
    match kind {
        BackendKind::Iptables => Box::new(IptablesBackend::new(shell)),
        BackendKind::Nftables => Box::new(NftablesBackend::new(shell)),
    }
}

/// Parse a rule target as printed by either backend: bare address or CIDR.
pub(crate) fn parse_target(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    s.parse::<IpAddr>().ok().map(IpNet::from)
}

/// Format a target the way the backends expect it: bare address for host
/// routes, CIDR otherwise.
pub(crate) fn format_target(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{CommandOutput, MockCommandExecutor};

    #[test]
    fn test_descriptor_equality_ignores_position() {
        let a = RuleDescriptor::drop_outbound("1.2.3.4/32".parse().unwrap());
        let b = a.clone().at_position(7);
        assert_eq!(a, b);

        let mut set = BTreeSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_descriptor_distinct_targets_differ() {
        let a = RuleDescriptor::drop_outbound("1.2.3.4/32".parse().unwrap());
        let b = RuleDescriptor::drop_outbound("5.6.7.8/32".parse().unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_target_accepts_bare_and_cidr() {
        assert_eq!(
            parse_target("1.2.3.4"),
            Some("1.2.3.4/32".parse().unwrap())
        );
        assert_eq!(
            parse_target("10.0.0.0/8"),
            Some("10.0.0.0/8".parse().unwrap())
        );
        assert_eq!(parse_target("2001:db8::1"), "2001:db8::1/128".parse().ok());
        assert_eq!(parse_target("not-an-ip"), None);
    }

    #[test]
    fn test_format_target_host_and_cidr() {
        assert_eq!(
            format_target(&"1.2.3.4/32".parse().unwrap()),
            "1.2.3.4"
        );
        assert_eq!(
            format_target(&"10.0.0.0/8".parse().unwrap()),
            "10.0.0.0/8"
        );
    }

    fn executor_with(iptables: bool, nft: bool) -> MockCommandExecutor {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(move |cmd, _| {
            let success = match cmd {
                "iptables" => iptables,
                "nft" => nft,
                _ => false,
            };
            Ok(CommandOutput {
                success,
                code: Some(if success { 0 } else { 127 }),
                ..Default::default()
            })
        });
        mock
    }

    #[test]
    fn test_detect_prefers_iptables() {
        let executor = executor_with(true, true);
        let kind = detect_backend(&executor, Backend::Auto).unwrap();
        assert_eq!(kind, BackendKind::Iptables);
    }

    #[test]
    fn test_detect_falls_back_to_nftables() {
        let executor = executor_with(false, true);
        let kind = detect_backend(&executor, Backend::Auto).unwrap();
        assert_eq!(kind, BackendKind::Nftables);
    }

    #[test]
    fn test_detect_no_backend() {
        let executor = executor_with(false, false);
        let err = detect_backend(&executor, Backend::Auto).unwrap_err();
        assert!(matches!(err, EngineError::NoBackendAvailable));
    }

    #[test]
    fn test_detect_honors_explicit_override() {
        let executor = executor_with(true, true);
        let kind = detect_backend(&executor, Backend::Nftables).unwrap();
        assert_eq!(kind, BackendKind::Nftables);
    }

    #[test]
    fn test_detect_explicit_override_missing_tool() {
        let executor = executor_with(true, false);
        let err = detect_backend(&executor, Backend::Nftables).unwrap_err();
        assert!(matches!(err, EngineError::NoBackendAvailable));
    }
}
