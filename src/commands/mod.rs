//! CLI command implementations.
//!
//! Each blocking command builds a desired blocked-entry set, hands it to
//! the reconciler, prints the report, and persists the effective set:
//! the one computed from operations that actually succeeded.

pub mod apply;
pub mod block;
pub mod config;
pub mod interactive;
pub mod list;
pub mod ping;
pub mod preset;
pub mod regions;
pub mod reset;
pub mod status;
pub mod unblock;

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use crate::cli::Cli;
use crate::compiler::compile;
use crate::config::{Config, ConfigManager};
use crate::fetcher::{Fetcher, ServerCatalog};
use crate::firewall::{create_backend, detect_backend, BackendKind, FirewallBackend};
use crate::models::{BlockedSet, ServerEntry};
use crate::reconciler::{reconcile, OpKind, ReconcileMode, ReconcileReport};
use crate::shell::{is_root, CommandExecutor, RealCommandExecutor, Shell};
use crate::store::StateStore;

/// Everything an engine-backed command needs, built once per invocation.
/// The detected backend kind is fixed here for the process lifetime.
pub struct Ctx {
    pub config: Config,
    pub manager: ConfigManager,
    pub store: StateStore,
    pub shell: Arc<Shell>,
    pub backend: Box<dyn FirewallBackend>,
    pub kind: BackendKind,
    pub configured_auto: bool,
    pub dry_run: bool,
    pub clustered: bool,
}

impl Ctx {
    pub fn init(cli: &Cli) -> Result<Self> {
        let manager = ConfigManager::new(cli.config_dir.as_deref());
        let config = manager.load();
        config.validate()?;

        let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor::new());
        let preference = cli.backend.unwrap_or(config.backend);
        let kind = detect_backend(executor.as_ref(), preference)?;

        let use_sudo = config.use_sudo && !cli.no_sudo && !is_root();
        let shell = Arc::new(Shell::new(executor, use_sudo, cli.dry_run));
        let backend = create_backend(shell.clone(), kind);
        let store = StateStore::new(manager.dir().to_path_buf());

        Ok(Self {
            clustered: cli.clustered || config.clustered,
            configured_auto: preference == crate::config::Backend::Auto,
            dry_run: cli.dry_run,
            config,
            manager,
            store,
            shell,
            backend,
            kind,
        })
    }

    pub async fn fetch_catalog(&self) -> Result<ServerCatalog> {
        let fetcher = Fetcher::new(self.manager.dir())?;
        Ok(fetcher.fetch().await?)
    }

    pub fn mode(&self) -> ReconcileMode {
        if self.dry_run {
            ReconcileMode::DryRun
        } else {
            ReconcileMode::Apply
        }
    }

    /// Reconcile the firewall onto `desired` and persist the effective
    /// blocked set. Prints the report either way; on partial failure the
    /// partial counts are shown and the typed error propagates for the
    /// exit code.
    pub async fn reconcile_entries(&self, desired: &[ServerEntry]) -> Result<ReconcileReport> {
        let compiled = compile(desired);
        let current = self.backend.list_rules().await?;

        match reconcile(self.backend.as_ref(), &compiled, &current, self.mode()).await {
            Ok(report) => {
                self.persist_effective(&report);
                print_report(&report);
                Ok(report)
            }
            Err(failure) => {
                self.persist_effective(&failure.report);
                print_report(&failure.report);
                eprintln!("Reconciliation stopped early; re-run the command to retry.");
                Err(failure.into())
            }
        }
    }

    fn persist_effective(&self, report: &ReconcileReport) {
        if self.dry_run {
            return;
        }
        let blocked: BlockedSet = report.effective.iter().cloned().collect();
        if let Err(err) = self.store.save_blocked(&blocked) {
            warn!("Could not persist blocked set: {}", err);
        }
    }
}

/// Resolve server names/codes against the catalog, reporting misses.
pub fn resolve_entries(
    catalog: &ServerCatalog,
    names: &[String],
    clustered: bool,
) -> Vec<ServerEntry> {
    let mut entries = Vec::new();
    for name in names {
        match catalog.resolve(name, clustered) {
            Some(entry) => entries.push(entry.clone()),
            None => println!("Server not found: {}", name),
        }
    }
    entries
}

/// Print a reconcile report. Dry-run output is textually distinct from a
/// real application.
pub fn print_report(report: &ReconcileReport) {
    match report.mode {
        ReconcileMode::DryRun => {
            for op in &report.operations {
                let label = match &op.entry {
                    Some(entry) => format!("{} ({})", op.target, entry),
                    None => op.target.to_string(),
                };
                match op.kind {
                    OpKind::Add => println!("[dry-run] would add drop {}", label),
                    OpKind::Remove => println!("[dry-run] would remove drop {}", label),
                }
            }
            println!(
                "[dry-run] summary: {} to add, {} to remove, {} unchanged",
                report.added, report.removed, report.unchanged
            );
        }
        ReconcileMode::Apply => {
            if report.failed > 0 {
                println!(
                    "Rules: {} added, {} removed, {} unchanged, {} failed",
                    report.added, report.removed, report.unchanged, report.failed
                );
            } else {
                println!(
                    "Rules: {} added, {} removed, {} unchanged",
                    report.added, report.removed, report.unchanged
                );
            }
        }
    }
}
