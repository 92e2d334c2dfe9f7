//! Rule compilation: desired server entries into concrete rule descriptors.
//!
//! Output ordering is deterministic (entries by code, then addresses) so
//! reconciliation diffs are reproducible and rule counts predictable.
//! Duplicate addresses across entries compile once, owned by the first
//! entry in code order.

use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};

use crate::firewall::RuleDescriptor;
use crate::models::ServerEntry;

/// The compiled form of a desired blocked-entry set.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    descriptors: Vec<RuleDescriptor>,
    owners: BTreeMap<IpNet, String>,
    entry_targets: BTreeMap<String, BTreeSet<IpNet>>,
}

impl CompiledRules {
    /// Descriptors in stable compilation order.
    pub fn descriptors(&self) -> &[RuleDescriptor] {
        &self.descriptors
    }

    pub fn descriptor_set(&self) -> BTreeSet<RuleDescriptor> {
        self.descriptors.iter().cloned().collect()
    }

    /// The entry a compiled target belongs to.
    pub fn owner_of(&self, target: &IpNet) -> Option<&str> {
        self.owners.get(target).map(String::as_str)
    }

    /// Entry codes with the targets compiled for them.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &BTreeSet<IpNet>)> {
        self.entry_targets.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Compile a set of entries into rule descriptors.
pub fn compile(entries: &[ServerEntry]) -> CompiledRules {
    let mut sorted: Vec<&ServerEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.code.cmp(&b.code));
    sorted.dedup_by(|a, b| a.code == b.code);

    let mut compiled = CompiledRules::default();
    let mut seen: BTreeSet<IpNet> = BTreeSet::new();

    for entry in sorted {
        let mut targets: Vec<IpNet> = entry.ip_addresses().into_iter().map(IpNet::from).collect();
        targets.sort();
        targets.dedup();

        let entry_targets = compiled
            .entry_targets
            .entry(entry.code.clone())
            .or_default();

        for target in targets {
            entry_targets.insert(target);
            if !seen.insert(target) {
                continue;
            }
            compiled.owners.insert(target, entry.code.clone());
            compiled
                .descriptors
                .push(RuleDescriptor::drop_outbound(target));
        }
    }

    compiled
}
