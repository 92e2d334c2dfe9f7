//! # Deadlock Server Picker
//!
//! Block or unblock Deadlock game-server relays by managing host firewall
//! rules, with idempotent, reversible state over either iptables or
//! nftables.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  deadlock-server-picker                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: block, unblock, block-except, reset, ...   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Provider (reqwest)                                         │
//! │    └── Steam SDR relay data, disk snapshot fallback         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compiler                                                   │
//! │    └── Blocked entries → ordered, de-duplicated rules       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler                                                 │
//! │    └── Diff + converge, additions before removals, dry-run  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Firewall (FirewallBackend trait)                           │
//! │    ├── IptablesBackend (dedicated chain)                    │
//! │    └── NftablesBackend (dedicated table)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Shell                                                      │
//! │    └── sudo elevation, dry-run interception, typed errors   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All of this tool's rules live inside one dedicated container (an
//! iptables chain or nftables table); rules outside it are never read or
//! touched. Every backend operation is idempotent, so any partial failure
//! is recovered by simply reconciling again.
//!
//! ## Example
//!
//! ```no_run
//! use deadlock_server_picker::compiler::compile;
//! use deadlock_server_picker::config::Backend;
//! use deadlock_server_picker::firewall::{create_backend, detect_backend};
//! use deadlock_server_picker::reconciler::{reconcile, ReconcileMode};
//! use deadlock_server_picker::shell::{RealCommandExecutor, Shell};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let executor = Arc::new(RealCommandExecutor::new());
//!     let kind = detect_backend(executor.as_ref(), Backend::Auto)?;
//!     let shell = Arc::new(Shell::new(executor, true, false));
//!     let backend = create_backend(shell, kind);
//!
//!     let desired = compile(&[]);
//!     let current = backend.list_rules().await?;
//!     let report = reconcile(backend.as_ref(), &desired, &current, ReconcileMode::Apply).await?;
//!     println!("removed {} rules", report.removed);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod firewall;
pub mod models;
pub mod ping;
pub mod reconciler;
pub mod regions;
pub mod session;
pub mod shell;
pub mod signal;
pub mod store;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::EngineError;
