//! SQL Server database inventory tool.
//!
//! This binary connects to one or more SQL Server instances, lists their
//! databases, applies a single filter and optional backup staleness checks,
//! and prints the resulting report.
//!
//! # Security Guarantees
//! - Read-only catalog queries only
//! - No credentials stored or logged
//! - One failing instance never stops the rest of the batch

use anyhow::Context;
use clap::Parser;
use dbinventory::output::{render, render_json, save_report};
use dbinventory::{Cli, Command, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS};
use dbinventory_core::inventory::check_connection;
use dbinventory_core::{BatchResult, create_provider, init_logging, inventory_batch};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    let outcome = match cli.command {
        Some(Command::Test) => test_connections(&cli).await,
        None => run_inventory(&cli).await,
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Inventories every instance and prints or saves the report.
async fn run_inventory(cli: &Cli) -> anyhow::Result<u8> {
    let instances = cli.connection.instances()?;
    // Reject conflicting filters before asking for a password
    let criteria = cli.inventory_criteria();
    criteria.clone().into_request()?;

    let credentials = cli.connection.credentials()?;
    let provider = create_provider(cli.connection.connection_config())?;

    let result = inventory_batch(
        provider.as_ref(),
        instances,
        &credentials,
        criteria,
        &cli.connection.batch_config(),
    )
    .await?;

    if let Some(path) = &cli.output.output {
        let json = render_json(&result)?;
        save_report(&json, path, cli.output.compress)
            .await
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        info!("✓ Report saved to {}", path.display());
        if !cli.global.quiet {
            println!("Output: {}", path.display());
            println!("Databases: {}", result.metadata.databases_reported);
        }
    } else {
        print!("{}", render(&result, cli.output.format)?);
    }

    Ok(report_failures(&result))
}

/// Logs failed instances and picks the exit code.
fn report_failures(result: &BatchResult) -> u8 {
    if result.is_complete() {
        return EXIT_SUCCESS;
    }
    for failure in &result.failures {
        warn!("{} [{}]: {}", failure.instance, failure.kind, failure.message);
        eprintln!("{}: {} ({})", failure.instance, failure.kind, failure.message);
    }
    EXIT_PARTIAL
}

/// Tests connectivity to each instance without collecting anything.
async fn test_connections(cli: &Cli) -> anyhow::Result<u8> {
    let instances = cli.connection.instances()?;
    let credentials = cli.connection.credentials()?;
    let provider = create_provider(cli.connection.connection_config())?;

    let mut failed = 0usize;
    for instance in instances {
        info!("Testing connection to {}...", instance);
        match check_connection(provider.as_ref(), instance, &credentials).await {
            Ok(version) => {
                println!(
                    "{}: connected (version {})",
                    instance,
                    version.as_deref().unwrap_or("unknown")
                );
            }
            Err(e) => {
                failed = failed.saturating_add(1);
                error!("Connection test failed: {}", e);
                println!("{}: FAILED ({})", instance, e);
            }
        }
    }

    Ok(if failed == 0 { EXIT_SUCCESS } else { EXIT_PARTIAL })
}
