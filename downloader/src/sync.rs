/// One pass over the remote library.
///
/// Items are processed strictly in list order: ledger check, resolve,
/// download, record. Anything downloaded before a failure stays recorded.
use sqlx::sqlite::SqlitePool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use playon_shared::db;
use playon_shared::errors::PlayOnResult;
use playon_shared::models::{LibraryItem, SyncReport};

use crate::client::Session;
use crate::progress;
use crate::transfer::{self, DownloadExecutor};

/// Knobs for a sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would be downloaded, touch nothing.
    pub dry_run: bool,
    /// Log per-item failures and continue instead of aborting the pass.
    pub keep_going: bool,
}

/// What happened to a single library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    AlreadyDownloaded,
    WouldDownload,
    Downloaded(std::path::PathBuf),
}

/// Download every library item missing from the ledger.
pub async fn run_sync(
    session: &Session,
    pool: &SqlitePool,
    executor: &DownloadExecutor,
    options: SyncOptions,
) -> PlayOnResult<SyncReport> {
    let items = session.list_library().await?;
    let mut report = SyncReport::default();

    for item in &items {
        match sync_item(session, pool, executor, item, options).await {
            Ok(ItemOutcome::AlreadyDownloaded) => report.skipped += 1,
            Ok(ItemOutcome::WouldDownload) => {}
            Ok(ItemOutcome::Downloaded(path)) => {
                report.downloaded += 1;
                report.files.push(path);
            }
            Err(e) if options.keep_going => {
                error!("{} failed: {}", item.title(), e);
                report.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!("Sync finished: {}", report);
    Ok(report)
}

/// Process one item: skip it if recorded, otherwise fetch and record it.
pub async fn sync_item(
    session: &Session,
    pool: &SqlitePool,
    executor: &DownloadExecutor,
    item: &LibraryItem,
    options: SyncOptions,
) -> PlayOnResult<ItemOutcome> {
    let title = item.title();
    let file_name = transfer::destination_name(item);
    let year = item.release_year.as_deref();

    if db::has_file(pool, &item.name, year).await? {
        info!("{} already downloaded. Skipping...", title);
        return Ok(ItemOutcome::AlreadyDownloaded);
    }

    if options.dry_run {
        info!(
            "{} would be downloaded to {}",
            title,
            executor.destination(&file_name).display()
        );
        return Ok(ItemOutcome::WouldDownload);
    }

    let descriptor = session.resolve_download(&item.id).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(progress::render(title.clone(), rx));
    let result = executor.download(&descriptor, &file_name, Some(&tx)).await;
    drop(tx);
    if let Err(e) = renderer.await {
        warn!("Progress renderer for {} stopped: {}", title, e);
    }
    let path = result?;

    db::add_file(pool, &item.name, year).await?;
    Ok(ItemOutcome::Downloaded(path))
}
