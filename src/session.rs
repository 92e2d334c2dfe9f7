//! Interactive session with guaranteed cleanup on exit.
//!
//! Rules applied during a session are scoped to it: every exit path
//! (normal quit, EOF, a failing command loop, SIGINT, SIGTERM) runs the
//! same cleanup, which flushes the rule container and clears the persisted
//! blocked set (unless `auto_reset_on_exit` is disabled). The session
//! keeps an in-memory mirror of the blocked set so cleanup does not depend
//! on re-reading anything.

use anyhow::Result;
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::compiler::compile;
use crate::fetcher::ServerCatalog;
use crate::firewall::FirewallBackend;
use crate::models::BlockedSet;
use crate::reconciler::{reconcile, ReconcileMode, ReconcileReport};
use crate::store::StateStore;

#[derive(Debug, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Quit,
}

pub struct InteractiveSession<'a> {
    backend: &'a dyn FirewallBackend,
    store: &'a StateStore,
    catalog: &'a ServerCatalog,
    clustered: bool,
    dry_run: bool,
    auto_reset: bool,
    blocked: BlockedSet,
}

impl<'a> InteractiveSession<'a> {
    pub fn new(
        backend: &'a dyn FirewallBackend,
        store: &'a StateStore,
        catalog: &'a ServerCatalog,
        clustered: bool,
        dry_run: bool,
        auto_reset: bool,
    ) -> Self {
        let blocked = store.load_blocked();
        Self {
            backend,
            store,
            catalog,
            clustered,
            dry_run,
            auto_reset,
            blocked,
        }
    }

    /// Run the command loop. Cleanup executes on every exit path.
    pub async fn run(mut self) -> Result<()> {
        let mut signals = crate::signal::Signals::install();
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        println!("deadlock-server-picker interactive mode");
        if self.dry_run {
            println!("[dry-run] firewall mutations are simulated");
        }
        println!("Type 'help' for commands, 'quit' to exit.");

        let outcome = loop {
            print!("> ");
            let _ = std::io::stdout().flush();

            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        match self.dispatch(line.trim()).await {
                            Ok(LoopAction::Quit) => break Ok(()),
                            Ok(LoopAction::Continue) => {}
                            // Per-command failures are reported and the
                            // loop continues; cleanup still runs if the
                            // user bails out afterwards.
                            Err(err) => eprintln!("Error: {:#}", err),
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(err.into()),
                },
                _ = signals.recv() => {
                    println!();
                    info!("Signal received, cleaning up session");
                    break Ok(());
                }
            }
        };

        let cleanup = self.cleanup().await;
        outcome.and(cleanup)
    }

    async fn dispatch(&mut self, line: &str) -> Result<LoopAction> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Ok(LoopAction::Continue);
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "quit" | "exit" | "q" => return Ok(LoopAction::Quit),
            "help" => self.print_help(),
            "list" => self.print_servers(),
            "status" => self.print_status().await?,
            "block" => self.block(&args).await?,
            "unblock" => {
                if args.first() == Some(&"all") {
                    self.blocked.clear();
                    let report = self.converge().await?;
                    print_counts(&report);
                } else {
                    self.unblock(&args).await?;
                }
            }
            "reset" => {
                self.backend.flush_container().await?;
                self.blocked.clear();
                self.persist()?;
                println!("All rules flushed.");
            }
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }

        Ok(LoopAction::Continue)
    }

    async fn block(&mut self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            println!("Usage: block <server>...");
            return Ok(());
        }
        for name in names {
            match self.catalog.resolve(name, self.clustered) {
                Some(entry) => {
                    self.blocked.insert(entry.code.clone());
                }
                None => println!("Server not found: {}", name),
            }
        }
        let report = self.converge().await?;
        print_counts(&report);
        Ok(())
    }

    async fn unblock(&mut self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            println!("Usage: unblock <server>... | unblock all");
            return Ok(());
        }
        for name in names {
            match self.catalog.resolve(name, self.clustered) {
                Some(entry) => {
                    self.blocked.remove(&entry.code);
                }
                None => println!("Server not found: {}", name),
            }
        }
        let report = self.converge().await?;
        print_counts(&report);
        Ok(())
    }

    /// Reconcile the firewall onto the session's blocked set, persisting
    /// only what actually succeeded.
    async fn converge(&mut self) -> Result<ReconcileReport> {
        let desired = self
            .catalog
            .entries_for_codes(self.blocked.iter(), self.clustered);
        let compiled = compile(&desired);
        let current = self.backend.list_rules().await?;

        let mode = if self.dry_run {
            ReconcileMode::DryRun
        } else {
            ReconcileMode::Apply
        };

        match reconcile(self.backend, &compiled, &current, mode).await {
            Ok(report) => {
                self.blocked = report.effective.iter().cloned().collect();
                self.persist()?;
                Ok(report)
            }
            Err(failure) => {
                self.blocked = failure.report.effective.iter().cloned().collect();
                self.persist()?;
                print_counts(&failure.report);
                Err(failure.into())
            }
        }
    }

    fn persist(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.store.save_blocked(&self.blocked)?;
        Ok(())
    }

    /// Best-effort release of everything the session applied.
    pub async fn cleanup(&mut self) -> Result<()> {
        if !self.auto_reset {
            info!("auto_reset_on_exit disabled; leaving rules in place");
            return Ok(());
        }
        self.backend.flush_container().await?;
        self.blocked.clear();
        self.persist()?;
        println!("Session rules cleaned up.");
        Ok(())
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  list                 Show servers and blocked state");
        println!("  status               Show firewall container state");
        println!("  block <server>...    Block servers by code or name");
        println!("  unblock <server>...  Unblock servers");
        println!("  unblock all          Unblock everything");
        println!("  reset                Flush all rules");
        println!("  quit                 Exit (rules are cleaned up)");
    }

    fn print_servers(&self) {
        for entry in self.catalog.servers(self.clustered).values() {
            let marker = if self.blocked.contains(&entry.code) {
                " [blocked]"
            } else {
                ""
            };
            println!("  {}{}", entry.display_name(), marker);
        }
        println!("Blocked: {}", self.blocked.len());
    }

    async fn print_status(&self) -> Result<()> {
        let exists = self.backend.container_exists().await?;
        let rules = self.backend.list_rules().await?;
        println!("Container present: {}", if exists { "yes" } else { "no" });
        println!("Active rules: {}", rules.len());
        println!(
            "Declared blocked: {}",
            if self.blocked.is_empty() {
                "(none)".to_string()
            } else {
                self.blocked
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );
        Ok(())
    }
}

fn print_counts(report: &ReconcileReport) {
    match report.mode {
        ReconcileMode::DryRun => println!(
            "[dry-run] would add {}, would remove {}, unchanged {}",
            report.added, report.removed, report.unchanged
        ),
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
