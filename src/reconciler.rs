//! State reconciliation: diff the desired rule set against the firewall
//! and converge with the minimal operations.
//!
//! Additions are issued before removals: narrowing a blocklist never opens
//! a transient window where traffic that should stay blocked is allowed,
//! while widening briefly carries extra rules rather than a gap.

use ipnet::IpNet;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::compiler::CompiledRules;
use crate::error::EngineError;
use crate::firewall::{FirewallBackend, RuleDescriptor};

/// Whether operations are issued or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    Apply,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Remove,
}

/// One operation the reconciler issued (or would issue, in dry-run).
#[derive(Debug, Clone)]
pub struct PlannedOp {
    pub kind: OpKind,
    pub target: IpNet,
    /// Owning entry code for additions; removals target rules outside the
    /// desired set, which have no desired-entry owner.
    pub entry: Option<String>,
}

/// Outcome of a reconciliation.
///
/// `effective` is the blocked-entry set as computed from the operations
/// that actually succeeded, not re-read from the backend; callers display
/// and persist it without a second backend read.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Operations not applied: the one that failed plus everything after
    /// it in the sequence. Zero on success and in dry-run.
    pub failed: usize,
    pub operations: Vec<PlannedOp>,
    pub effective: BTreeSet<String>,
}

impl ReconcileReport {
    fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            added: 0,
            removed: 0,
            unchanged: 0,
            failed: 0,
            operations: Vec::new(),
            effective: BTreeSet::new(),
        }
    }
}

/// A reconciliation that stopped partway: the partial report plus the
/// failure that aborted it. The firewall is left in the intermediate
/// state; re-invoking reconciliation is the recovery path (every backend
/// operation is idempotent), not rollback.
#[derive(Debug, Error)]
#[error("reconciliation aborted: {source}")]
pub struct ReconcileFailure {
    pub report: ReconcileReport,
    #[source]
    pub source: EngineError,
}

/// Entries whose compiled targets are all present in `applied`.
fn effective_entries(desired: &CompiledRules, applied: &BTreeSet<RuleDescriptor>) -> BTreeSet<String> {
    desired
        .entries()
        .filter(|(_, targets)| {
            targets
                .iter()
                .all(|t| applied.contains(&RuleDescriptor::drop_outbound(*t)))
        })
        .map(|(code, _)| code.clone())
        .collect()
}

/// Converge the firewall onto `desired`.
///
/// `current` must be a fresh read of the container's rules; the reconciler
/// never caches firewall state across invocations. In `Apply` mode the
/// container is ensured once (only when there is something to add; it is
/// created lazily on first block), then every missing rule is added, then
/// every extra rule removed. On the first failed operation the sequence
/// stops and the partial report is returned with the error.
pub async fn reconcile(
    backend: &dyn FirewallBackend,
    desired: &CompiledRules,
    current: &BTreeSet<RuleDescriptor>,
    mode: ReconcileMode,
) -> Result<ReconcileReport, ReconcileFailure> {
    let desired_set = desired.descriptor_set();

    let to_add: Vec<&RuleDescriptor> = desired
        .descriptors()
        .iter()
        .filter(|d| !current.contains(d))
        .collect();
    let to_remove: Vec<&RuleDescriptor> =
        current.iter().filter(|d| !desired_set.contains(d)).collect();

    let mut report = ReconcileReport::new(mode);
    report.unchanged = desired_set.intersection(current).count();

    for rule in &to_add {
        report.operations.push(PlannedOp {
            kind: OpKind::Add,
            target: rule.target,
            entry: desired.owner_of(&rule.target).map(str::to_string),
        });
    }
    for rule in &to_remove {
        report.operations.push(PlannedOp {
            kind: OpKind::Remove,
            target: rule.target,
            entry: None,
        });
    }

    if mode == ReconcileMode::DryRun {
        report.added = to_add.len();
        report.removed = to_remove.len();
        // As-if-applied: the set the operations would produce.
        let mut applied = current.clone();
        applied.extend(to_add.iter().map(|d| (*d).clone()));
        for rule in &to_remove {
            applied.remove(*rule);
        }
        report.effective = effective_entries(desired, &applied);
        return Ok(report);
    }

    let mut applied = current.clone();
    let mut done = 0usize;
    let planned = report.operations.len();

    let fail = |mut report: ReconcileReport,
                applied: &BTreeSet<RuleDescriptor>,
                done: usize,
                source: EngineError| {
        report.failed = planned - done;
        report.effective = effective_entries(desired, applied);
        ReconcileFailure { report, source }
    };

    if !to_add.is_empty() {
        if let Err(source) = backend.ensure_container().await {
            return Err(fail(report, &applied, done, source));
        }
    }

    for rule in &to_add {
        match backend.add_rule(rule).await {
            Ok(inserted) => {
                applied.insert((*rule).clone());
                done += 1;
                if inserted {
                    report.added += 1;
                } else {
                    // Appeared externally since the read; already converged.
                    report.unchanged += 1;
                }
            }
            Err(source) => return Err(fail(report, &applied, done, source)),
        }
    }

    for rule in &to_remove {
        match backend.remove_rule(rule).await {
            Ok(()) => {
                applied.remove(*rule);
                done += 1;
                report.removed += 1;
            }
            Err(source) => return Err(fail(report, &applied, done, source)),
        }
    }

    report.effective = effective_entries(desired, &applied);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::firewall::mock::MockBackend;
    use crate::models::{ServerEntry, ServerRelay};

    fn entry(code: &str, ips: &[&str]) -> ServerEntry {
        let relays = ips
            .iter()
            .map(|ip| ServerRelay {
                ipv4: ip.parse().unwrap(),
                port_range: None,
            })
            .collect();
        ServerEntry::new(code, code.to_uppercase(), relays)
    }

    async fn apply(backend: &MockBackend, entries: &[ServerEntry]) -> ReconcileReport {
        let compiled = compile(entries);
        let current = backend.list_rules().await.unwrap();
        reconcile(backend, &compiled, &current, ReconcileMode::Apply)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_convergence_from_empty() {
        let backend = MockBackend::new();
        let desired = vec![entry("sgp", &["1.2.3.4"]), entry("hkg", &["5.6.7.8"])];

        let report = apply(&backend, &desired).await;
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(report.unchanged, 0);

        let rules = backend.list_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        let compiled = compile(&desired);
        assert_eq!(rules, compiled.descriptor_set());
    }

    #[tokio::test]
    async fn test_idempotence() {
        let backend = MockBackend::new();
        let desired = vec![entry("sgp", &["1.2.3.4"]), entry("hkg", &["5.6.7.8"])];

        apply(&backend, &desired).await;
        let second = apply(&backend, &desired).await;

        assert_eq!(second.added, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(second.unchanged, 2);
    }

    #[tokio::test]
    async fn test_worked_example_partial_overlap() {
        // desired={sgp:[1.2.3.4], hkg:[5.6.7.8]}, current={sgp:[1.2.3.4]}
        let backend = MockBackend::with_rules(&["1.2.3.4"]);
        let desired = vec![entry("sgp", &["1.2.3.4"]), entry("hkg", &["5.6.7.8"])];

        let report = apply(&backend, &desired).await;
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(report.unchanged, 1);
        assert!(report.effective.contains("sgp"));
        assert!(report.effective.contains("hkg"));
    }

    #[tokio::test]
    async fn test_additions_before_removals() {
        // current={A,B}, desired={B,C}: add(C) must precede remove(A).
        let backend = MockBackend::with_rules(&["10.0.0.1", "10.0.0.2"]);
        let desired = vec![entry("b", &["10.0.0.2"]), entry("c", &["10.0.0.3"])];

        let report = apply(&backend, &desired).await;
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.unchanged, 1);

        let journal = backend.journal();
        let add_idx = journal.iter().position(|op| op == "add 10.0.0.3/32").unwrap();
        let remove_idx = journal
            .iter()
            .position(|op| op == "remove 10.0.0.1/32")
            .unwrap();
        assert!(add_idx < remove_idx, "journal: {:?}", journal);
    }

    #[tokio::test]
    async fn test_operations_report_order_matches() {
        let backend = MockBackend::with_rules(&["10.0.0.1"]);
        let desired = vec![entry("c", &["10.0.0.3"])];
        let report = apply(&backend, &desired).await;

        assert_eq!(report.operations.len(), 2);
        assert_eq!(report.operations[0].kind, OpKind::Add);
        assert_eq!(report.operations[0].entry.as_deref(), Some("c"));
        assert_eq!(report.operations[1].kind, OpKind::Remove);
        assert!(report.operations[1].entry.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let backend = MockBackend::with_rules(&["10.0.0.1"]);
        let desired = vec![entry("c", &["10.0.0.3"])];
        let compiled = compile(&desired);
        let before = backend.list_rules().await.unwrap();

        let report = reconcile(&backend, &compiled, &before, ReconcileMode::DryRun)
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(backend.list_rules().await.unwrap(), before);
        assert!(backend.journal().is_empty());
        assert!(report.effective.contains("c"));
    }

    #[tokio::test]
    async fn test_empty_desired_skips_ensure_container() {
        let backend = MockBackend::with_rules(&["10.0.0.1"]);
        let report = apply(&backend, &[]).await;

        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 1);
        assert!(!backend.journal().contains(&"ensure".to_string()));
        assert!(backend.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_container_issued_once_before_adds() {
        let backend = MockBackend::new();
        let desired = vec![entry("sgp", &["1.2.3.4"]), entry("hkg", &["5.6.7.8"])];
        apply(&backend, &desired).await;

        let journal = backend.journal();
        assert_eq!(journal.iter().filter(|op| *op == "ensure").count(), 1);
        assert_eq!(journal[0], "ensure");
    }

    #[tokio::test]
    async fn test_partial_failure_stops_and_reports() {
        let backend = MockBackend::new();
        *backend.fail_target.lock().unwrap() = Some("5.6.7.8/32".parse().unwrap());

        // Compilation order: 1.2.3.4 (aaa), 5.6.7.8 (bbb), 9.9.9.9 (ccc).
        let desired = vec![
            entry("aaa", &["1.2.3.4"]),
            entry("bbb", &["5.6.7.8"]),
            entry("ccc", &["9.9.9.9"]),
        ];
        let compiled = compile(&desired);
        let current = backend.list_rules().await.unwrap();

        let failure = reconcile(&backend, &compiled, &current, ReconcileMode::Apply)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.source,
            EngineError::BackendOperationFailed { .. }
        ));
        // One rule applied before the failure; nothing after it issued.
        assert_eq!(failure.report.added, 1);
        assert_eq!(failure.report.failed, 2);
        assert_eq!(backend.list_rules().await.unwrap().len(), 1);
        // Bookkeeping reflects only what actually succeeded.
        assert!(failure.report.effective.contains("aaa"));
        assert!(!failure.report.effective.contains("bbb"));
        assert!(!failure.report.effective.contains("ccc"));
    }

    #[tokio::test]
    async fn test_retry_after_partial_failure_converges() {
        let backend = MockBackend::new();
        *backend.fail_target.lock().unwrap() = Some("5.6.7.8/32".parse().unwrap());

        let desired = vec![entry("aaa", &["1.2.3.4"]), entry("bbb", &["5.6.7.8"])];
        let compiled = compile(&desired);
        let current = backend.list_rules().await.unwrap();
        assert!(reconcile(&backend, &compiled, &current, ReconcileMode::Apply)
            .await
            .is_err());

        // Clear the fault and retry: idempotent convergence.
        *backend.fail_target.lock().unwrap() = None;
        let report = apply(&backend, &desired).await;
        assert_eq!(report.added, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(backend.list_rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_narrowing_to_subset() {
        let backend = MockBackend::new();
        let all = vec![
            entry("sgp", &["1.2.3.4"]),
            entry("hkg", &["5.6.7.8"]),
            entry("tyo", &["9.9.9.9"]),
        ];
        apply(&backend, &all).await;

        let narrowed = vec![entry("tyo", &["9.9.9.9"])];
        let report = apply(&backend, &narrowed).await;
        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.effective.iter().collect::<Vec<_>>(), ["tyo"]);
    }

    #[tokio::test]
    async fn test_block_except_expansion() {
        // Keeping tyo out of universe {sgp,hkg,tyo} yields desired
        // {sgp,hkg}; against an empty firewall that is two additions.
        let backend = MockBackend::new();
        let universe = vec![
            entry("sgp", &["1.2.3.4"]),
            entry("hkg", &["5.6.7.8"]),
            entry("tyo", &["9.9.9.9"]),
        ];
        let desired: Vec<ServerEntry> = universe
            .into_iter()
            .filter(|e| e.code != "tyo")
            .collect();

        let report = apply(&backend, &desired).await;
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(report.failed, 0);
        assert!(!report.effective.contains("tyo"));
    }

    #[tokio::test]
    async fn test_shared_ip_entries_both_effective() {
        let backend = MockBackend::new();
        let desired = vec![entry("aaa", &["1.2.3.4"]), entry("bbb", &["1.2.3.4"])];
        let report = apply(&backend, &desired).await;

        // One rule serves both entries.
        assert_eq!(report.added, 1);
        assert!(report.effective.contains("aaa"));
        assert!(report.effective.contains("bbb"));
    }
}
