//! rscp - scp-protocol copies over the system ssh client
//!
//! Exactly one operand is remote; the direction follows from which one.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use rscp::cli::Args;
use rscp::log::{TransferLog, TransferLogEntry};
use rscp::logger::{ConsoleLogger, Logger, NoopLogger, TextLogger};
use rscp::{Client, ClientConfig};

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    let (remote, request) = args.plan()?;

    let mut config = ClientConfig::load(args.config.as_deref())?;
    args.apply(&mut config, &remote);
    let host = config.host.clone();

    // Choose logger once; zero overhead in hot paths with NoopLogger
    let logger: Arc<dyn Logger> = if let Some(ref p) = args.log_file {
        match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {}", p.display(), e);
                Arc::new(NoopLogger)
            }
        }
    } else if args.verbose {
        Arc::new(ConsoleLogger)
    } else {
        Arc::new(NoopLogger)
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let outcome = rt.block_on(async {
        let mut client = Client::new(config).with_logger(logger);
        let outcome = client.transfer(request.clone()).await;
        if let Err(e) = client.close().await {
            eprintln!("warning: {}", e);
        }
        outcome
    });

    if let Some(ref path) = args.journal {
        TransferLog::new(path)
            .add_entry(&TransferLogEntry::new(&host, &request, &outcome))
            .with_context(|| format!("write journal {}", path.display()))?;
    }

    let stats = outcome.with_context(|| format!("{} failed", request.direction))?;
    if args.verbose {
        println!(
            "{} files, {} directories, {} bytes",
            stats.files, stats.dirs, stats.bytes
        );
    }
    Ok(())
}
