//! Deadlock Server Picker - relay blocking via the host firewall.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use deadlock_server_picker::cli::{Cli, Commands};
use deadlock_server_picker::commands::{self, Ctx};
use deadlock_server_picker::config::ConfigManager;
use deadlock_server_picker::error::EngineError;
use deadlock_server_picker::reconciler::ReconcileFailure;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", err);
    }

    if let Err(err) = run(&cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Version => {
            println!("deadlock-server-picker {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Regions => commands::regions::run_regions(),
        Commands::Config { action } => commands::config::run(cli, action),
        Commands::Preset { action } => commands::preset::run(cli, action).await,
        Commands::List { ping, blocked } => {
            let manager = ConfigManager::new(cli.config_dir.as_deref());
            let config = manager.load();
            let clustered = cli.clustered || config.clustered;
            commands::list::run(
                &manager,
                &config,
                commands::list::ListOpts {
                    ping: *ping,
                    blocked_only: *blocked,
                    clustered,
                },
            )
            .await
        }
        Commands::Ping { servers } => {
            let manager = ConfigManager::new(cli.config_dir.as_deref());
            let config = manager.load();
            let clustered = cli.clustered || config.clustered;
            commands::ping::run(&manager, &config, servers, clustered).await
        }
        Commands::ListRegion { region, ping } => {
            let manager = ConfigManager::new(cli.config_dir.as_deref());
            let config = manager.load();
            let clustered = cli.clustered || config.clustered;
            commands::regions::run_list_region(&manager, &config, region, *ping, clustered).await
        }

        // Everything below touches the firewall and needs the engine.
        Commands::Block { servers } => {
            let ctx = Ctx::init(cli)?;
            commands::block::run(&ctx, servers).await
        }
        Commands::Unblock { servers, all } => {
            let ctx = Ctx::init(cli)?;
            commands::unblock::run(&ctx, servers, *all).await
        }
        Commands::BlockAll => {
            let ctx = Ctx::init(cli)?;
            commands::block::run_all(&ctx).await
        }
        Commands::BlockExcept { servers } => {
            let ctx = Ctx::init(cli)?;
            commands::block::run_except(&ctx, servers).await
        }
        Commands::Reset => {
            let ctx = Ctx::init(cli)?;
            commands::reset::run(&ctx).await
        }
        Commands::Status => {
            let ctx = Ctx::init(cli)?;
            commands::status::run(&ctx).await
        }
        Commands::Apply => {
            let ctx = Ctx::init(cli)?;
            commands::apply::run(&ctx).await
        }
        Commands::AllowRegion { region } => {
            let ctx = Ctx::init(cli)?;
            commands::regions::run_allow_region(&ctx, region).await
        }
        Commands::BlockRegion { region } => {
            let ctx = Ctx::init(cli)?;
            commands::regions::run_block_region(&ctx, region).await
        }
        Commands::UnblockRegion { region } => {
            let ctx = Ctx::init(cli)?;
            commands::regions::run_unblock_region(&ctx, region).await
        }
        Commands::Interactive => {
            let ctx = Ctx::init(cli)?;
            commands::interactive::run(&ctx).await
        }
    }
}

/// Map the error chain onto the exit-code contract.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        return engine.exit_code();
    }
    if let Some(failure) = err.downcast_ref::<ReconcileFailure>() {
        return failure.source.exit_code();
    }
    1
}
