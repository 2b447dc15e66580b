/// PlayOn DL - Main Entry Point
///
/// Logs into PlayOn Cloud, lists the recording library and downloads every
/// recording not yet present in the local ledger, one at a time.
mod client;
mod config;
mod progress;
mod sync;
mod transfer;

use clap::Parser;
use tracing::{error, info, warn};

use playon_shared::db;
use playon_shared::errors::{PlayOnError, PlayOnResult};

use client::{media_client, PlayOnClient};
use config::Cli;
use sync::{run_sync, SyncOptions};
use transfer::DownloadExecutor;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playon_downloader=info,playon_shared=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Some recordings could not be downloaded");
            std::process::exit(1);
        }
        Err(e) => {
            report_fatal(&e);
            std::process::exit(1);
        }
    }
}

/// Run the requested action. `Ok(false)` means the pass completed with
/// per-item failures.
async fn run(cli: Cli) -> PlayOnResult<bool> {
    let pool = db::open_ledger(&cli.database).await?;

    if cli.list_ledger {
        for entry in db::list_files(&pool).await? {
            match entry.release_year {
                Some(year) => println!("{} ({})\t{}", entry.name, year, entry.downloaded_at),
                None => println!("{}\t{}", entry.name, entry.downloaded_at),
            }
        }
        return Ok(true);
    }

    let credentials = cli.credentials()?;
    let client_config = cli.client_config();

    let session = PlayOnClient::new(client_config.clone())?
        .login(&credentials)
        .await?;
    let executor = DownloadExecutor::new(
        media_client(&client_config)?,
        cli.output_dir.clone(),
        cli.extension.clone(),
    );
    info!("Saving recordings to {}", executor.output_dir().display());

    let options = SyncOptions {
        dry_run: cli.dry_run,
        keep_going: cli.keep_going,
    };
    let report = run_sync(&session, &pool, &executor, options).await?;
    pool.close().await;

    println!("{}", report);
    Ok(report.is_clean())
}

/// Print a fatal error, including every field the service sent back.
fn report_fatal(err: &PlayOnError) {
    match err {
        PlayOnError::Authentication { .. } => error!("There was a problem with logging in"),
        PlayOnError::Protocol { operation, .. } => {
            error!("There was a problem trying to {}", operation)
        }
        other => error!("{}", other),
    }

    if let Some(dump) = err.diagnostics() {
        eprintln!("{}", dump);
    }
}
