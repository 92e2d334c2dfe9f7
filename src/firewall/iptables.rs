//! iptables backend implementation.
//!
//! Rules live in a dedicated chain hooked from OUTPUT and FORWARD (the
//! FORWARD hook covers Wine/Proton and VM traffic routed through the
//! host). Each blocked address is one `-d <addr> -j DROP` rule tagged with
//! an identifying comment.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::{format_target, parse_target, FirewallBackend, RuleDescriptor, CONTAINER_NAME};
use crate::error::EngineError;
use crate::shell::{args_to_strings, Shell};

const CHAIN: &str = CONTAINER_NAME;
const RULE_COMMENT: &str = CONTAINER_NAME;

/// iptables backend
pub struct IptablesBackend {
    shell: Arc<Shell>,
}

impl IptablesBackend {
    pub fn new(shell: Arc<Shell>) -> Self {
        Self { shell }
    }

    /// The match portion of a rule, shared by -C/-A/-D so presence checks
    /// and deletions address exactly what was inserted.
    fn rule_spec(rule: &RuleDescriptor) -> Vec<String> {
        vec![
            "-d".to_string(),
            format_target(&rule.target),
            "-j".to_string(),
            "DROP".to_string(),
            "-m".to_string(),
            "comment".to_string(),
            "--comment".to_string(),
            RULE_COMMENT.to_string(),
        ]
    }

    fn with_action(action: &[&str], spec: &[String]) -> Vec<String> {
        let mut args = args_to_strings(action);
        args.extend_from_slice(spec);
        args
    }

    fn rule_present(&self, rule: &RuleDescriptor) -> Result<bool, EngineError> {
        let args = Self::with_action(&["-C", CHAIN], &Self::rule_spec(rule));
        Ok(self.shell.probe("iptables", &args)?.success)
    }

    fn chain_present(&self) -> Result<bool, EngineError> {
        let args = args_to_strings(&["-L", CHAIN, "-n"]);
        Ok(self.shell.probe("iptables", &args)?.success)
    }
}

#[async_trait]
impl FirewallBackend for IptablesBackend {
    async fn ensure_container(&self) -> Result<(), EngineError> {
        if self.chain_present()? {
            return Ok(());
        }

        self.shell
            .mutate("create chain", "iptables", &args_to_strings(&["-N", CHAIN]))?;

        // Hook the chain from OUTPUT (native apps) and FORWARD (routed
        // traffic); the comment lets the jump rules be identified later.
        for hook in ["OUTPUT", "FORWARD"] {
            self.shell.mutate(
                "hook chain",
                "iptables",
                &args_to_strings(&[
                    "-I", hook, "1", "-j", CHAIN, "-m", "comment", "--comment", RULE_COMMENT,
                ]),
            )?;
        }

        debug!("Created iptables chain {}", CHAIN);
        Ok(())
    }

    async fn add_rule(&self, rule: &RuleDescriptor) -> Result<bool, EngineError> {
        if self.rule_present(rule)? {
            return Ok(false);
        }

        let args = Self::with_action(&["-A", CHAIN], &Self::rule_spec(rule));
        self.shell
            .mutate(&format!("add rule for {}", rule.target), "iptables", &args)?;
        Ok(true)
    }

    async fn remove_rule(&self, rule: &RuleDescriptor) -> Result<(), EngineError> {
        if !self.rule_present(rule)? {
            return Ok(());
        }

        let args = Self::with_action(&["-D", CHAIN], &Self::rule_spec(rule));
        match self
            .shell
            .mutate(&format!("remove rule for {}", rule.target), "iptables", &args)
        {
            Ok(_) => Ok(()),
            // The rule vanished between the check and the delete; the
            // desired end state holds either way.
            Err(EngineError::BackendOperationFailed { detail, .. })
                if detail.contains("No chain/target/match by that name")
                    || detail.contains("does a matching rule exist") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn list_rules(&self) -> Result<BTreeSet<RuleDescriptor>, EngineError> {
        let output = self
            .shell
            .probe("iptables", &args_to_strings(&["-S", CHAIN]))?;
        if !output.success {
            return Ok(BTreeSet::new());
        }
        Ok(parse_rule_listing(&output.stdout))
    }

    async fn flush_container(&self) -> Result<(), EngineError> {
        if !self.chain_present()? {
            return Ok(());
        }
        self.shell
            .mutate("flush chain", "iptables", &args_to_strings(&["-F", CHAIN]))?;
        Ok(())
    }

    async fn container_exists(&self) -> Result<bool, EngineError> {
        self.chain_present()
    }
}

/// Parse `iptables -S <chain>` output into descriptors.
///
/// Lines look like:
/// `-A DEADLOCK_SERVER_PICKER -d 1.2.3.4/32 -m comment --comment DEADLOCK_SERVER_PICKER -j DROP`
fn parse_rule_listing(output: &str) -> BTreeSet<RuleDescriptor> {
    let mut rules = BTreeSet::new();
    let mut position = 0u32;

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&"-A") || tokens.get(1) != Some(&CHAIN) {
            continue;
        }
        if !tokens.windows(2).any(|w| w == ["-j", "DROP"]) {
            continue;
        }
        let Some(idx) = tokens.iter().position(|t| *t == "-d") else {
            continue;
        };
        let Some(target) = tokens.get(idx + 1).and_then(|s| parse_target(s)) else {
            continue;
        };
        position += 1;
        rules.insert(RuleDescriptor::drop_outbound(target).at_position(position));
    }

    rules
}
