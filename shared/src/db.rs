/// Download ledger: the SQLite record of recordings already fetched.
///
/// Entries are keyed by `(name, release_year)`; a missing year is its own
/// value, never a wildcard. The ledger is append-only.
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::LedgerError;
use crate::models::LedgerEntry;

const LEGACY_TABLE: &str = "legacy_files";

/// Open (creating if needed) the ledger file and bring its schema up to date.
pub async fn open_ledger(path: &Path) -> Result<SqlitePool, LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LedgerError::Open {
            path: path.display().to_string(),
            source: sqlx::Error::Io(e),
        })?;
    }

    let pool = create_pool(path).await?;
    set_aside_legacy_table(&pool).await?;
    run_migrations(&pool).await?;
    import_legacy_rows(&pool).await?;
    Ok(pool)
}

/// Create a single-connection SQLite pool with WAL mode and busy timeout.
pub async fn create_pool(path: &Path) -> Result<SqlitePool, LedgerError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(10))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| LedgerError::Open {
            path: path.display().to_string(),
            source,
        })?;

    info!("Opened ledger: {}", path.display());
    Ok(pool)
}

/// Run migrations from the migrations directory.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), LedgerError> {
    sqlx::migrate!("../migrations").run(pool).await?;

    debug!("Ledger schema is up to date");
    Ok(())
}

/// Ledgers written by earlier releases keep the year in a `releaseYear`
/// column. Such a table is renamed out of the way so the
/// migrations can create the current schema.
async fn set_aside_legacy_table(pool: &SqlitePool) -> Result<(), LedgerError> {
    let legacy: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT 1 FROM pragma_table_info('files') WHERE name = 'releaseYear'
        "#,
    )
    .fetch_optional(pool)
    .await
    .map_err(LedgerError::Query)?;

    if legacy.is_some() {
        info!("Upgrading ledger written by the previous version");
        sqlx::query(&format!("ALTER TABLE files RENAME TO {}", LEGACY_TABLE))
            .execute(pool)
            .await
            .map_err(LedgerError::Query)?;
    }

    Ok(())
}

/// Copy rows from a set-aside legacy table into `files`, then drop it.
async fn import_legacy_rows(pool: &SqlitePool) -> Result<(), LedgerError> {
    let present: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(LEGACY_TABLE)
            .fetch_optional(pool)
            .await
            .map_err(LedgerError::Query)?;
    if present.is_none() {
        return Ok(());
    }

    let mut tx = pool.begin().await.map_err(LedgerError::Query)?;
    // The old columns had numeric affinity; the TEXT columns convert values back.
    let imported = sqlx::query(&format!(
        "INSERT OR IGNORE INTO files (name, release_year) \
         SELECT name, releaseYear FROM {} WHERE name IS NOT NULL ORDER BY rowid",
        LEGACY_TABLE
    ))
    .execute(&mut *tx)
    .await
    .map_err(LedgerError::Query)?
    .rows_affected();
    sqlx::query(&format!("DROP TABLE {}", LEGACY_TABLE))
        .execute(&mut *tx)
        .await
        .map_err(LedgerError::Query)?;
    tx.commit().await.map_err(LedgerError::Query)?;

    info!("Imported {} entries from the previous ledger format", imported);
    Ok(())
}

/// Whether a recording with exactly this identity has been downloaded.
pub async fn has_file(
    pool: &SqlitePool,
    name: &str,
    release_year: Option<&str>,
) -> Result<bool, LedgerError> {
    // `IS` compares NULL to NULL as equal and NULL to a value as unequal.
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT 1 FROM files WHERE name = ? AND release_year IS ? LIMIT 1
        "#,
    )
    .bind(name)
    .bind(release_year)
    .fetch_optional(pool)
    .await
    .map_err(LedgerError::Query)?;

    Ok(row.is_some())
}

/// Record a downloaded recording. Fails if the identity is already present.
pub async fn add_file(
    pool: &SqlitePool,
    name: &str,
    release_year: Option<&str>,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO files (name, release_year) VALUES (?, ?)
        "#,
    )
    .bind(name)
    .bind(release_year)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            debug!("Recorded \"{}\" ({:?}) in ledger", name, release_year);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(LedgerError::DuplicateEntry {
                name: name.to_string(),
                release_year: release_year.map(String::from),
            })
        }
        Err(source) => Err(LedgerError::Write {
            name: name.to_string(),
            release_year: release_year.map(String::from),
            source,
        }),
    }
}

/// All ledger entries, oldest first.
pub async fn list_files(pool: &SqlitePool) -> Result<Vec<LedgerEntry>, LedgerError> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT name, release_year, downloaded_at FROM files ORDER BY rowid ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(LedgerError::Query)?;

    Ok(entries)
}

/// Number of recorded entries.
pub async fn count_files(pool: &SqlitePool) -> Result<i64, LedgerError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await
        .map_err(LedgerError::Query)?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.sqlite");

        let pool = open_ledger(&path).await.unwrap();
        add_file(&pool, "Show A", Some("2020")).await.unwrap();
        pool.close().await;

        let pool = open_ledger(&path).await.unwrap();
        assert!(has_file(&pool, "Show A", Some("2020")).await.unwrap());
        assert_eq!(count_files(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_opens_ledger_from_previous_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playondb.sqlite");

        let pool = create_pool(&path).await.unwrap();
        for statement in [
            r#"CREATE TABLE IF NOT EXISTS "files" ("name" STRING, "releaseYear" STRING)"#,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "file_index" ON files("name", "releaseYear")"#,
            r#"INSERT INTO "files" VALUES ('Show A', '2020')"#,
            r#"INSERT INTO "files" VALUES ('Show B', NULL)"#,
        ] {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;

        let pool = open_ledger(&path).await.unwrap();
        assert!(has_file(&pool, "Show A", Some("2020")).await.unwrap());
        assert!(has_file(&pool, "Show B", None).await.unwrap());
        assert!(!has_file(&pool, "Show B", Some("2020")).await.unwrap());
        assert_eq!(count_files(&pool).await.unwrap(), 2);

        let err = add_file(&pool, "Show A", Some("2020")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEntry { .. }));
        pool.close().await;

        // Second open finds the upgraded schema and changes nothing.
        let pool = open_ledger(&path).await.unwrap();
        assert_eq!(count_files(&pool).await.unwrap(), 2);
        add_file(&pool, "Show C", None).await.unwrap();
        assert_eq!(count_files(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_absent_year_is_not_a_wildcard() {
        let dir = tempdir().unwrap();
        let pool = open_ledger(&dir.path().join("ledger.sqlite")).await.unwrap();

        add_file(&pool, "Show A", Some("2020")).await.unwrap();
        assert!(!has_file(&pool, "Show A", None).await.unwrap());
        assert!(!has_file(&pool, "Show A", Some("2021")).await.unwrap());

        add_file(&pool, "Show B", None).await.unwrap();
        assert!(has_file(&pool, "Show B", None).await.unwrap());
        assert!(!has_file(&pool, "Show B", Some("2020")).await.unwrap());
        assert!(!has_file(&pool, "Show B", Some("")).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let dir = tempdir().unwrap();
        let pool = open_ledger(&dir.path().join("ledger.sqlite")).await.unwrap();

        add_file(&pool, "Show A", Some("2020")).await.unwrap();
        let err = add_file(&pool, "Show A", Some("2020")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEntry { .. }));

        add_file(&pool, "Show B", None).await.unwrap();
        let err = add_file(&pool, "Show B", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEntry { release_year: None, .. }));

        assert_eq!(count_files(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_name_different_years() {
        let dir = tempdir().unwrap();
        let pool = open_ledger(&dir.path().join("ledger.sqlite")).await.unwrap();

        add_file(&pool, "Remake", Some("1984")).await.unwrap();
        add_file(&pool, "Remake", Some("2016")).await.unwrap();
        add_file(&pool, "Remake", None).await.unwrap();
        add_file(&pool, "Remake", Some("")).await.unwrap();

        let entries = list_files(&pool).await.unwrap();
        let years: Vec<_> = entries.iter().map(|e| e.release_year.clone()).collect();
        assert_eq!(
            years,
            vec![Some("1984".into()), Some("2016".into()), None, Some(String::new())]
        );
    }
}
