//! Database setup for the reconstruction store.
//!
//! Every stored table is derived from the record and price files, so there
//! are no data migrations: when `SCHEMA_VERSION` moves, the tables are
//! dropped and the next compile pass rebuilds them.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Bump whenever `schema.sql` or the encoding of stored rows changes.
pub const SCHEMA_VERSION: i64 = 1;

const DERIVED_TABLES: [&str; 3] = ["cashflow_rows", "lot_rows", "compile_state"];

/// Open the database at `db_path`, creating it and its directory if needed,
/// and bring the schema to [`SCHEMA_VERSION`].
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let mut conn = pool.acquire().await?;
    apply_schema(&mut conn).await?;

    info!(path = db_path, version = SCHEMA_VERSION, "Reconstruction store ready");
    Ok(pool)
}

async fn apply_schema(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let stored: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;

    if stored == SCHEMA_VERSION {
        return Ok(());
    }
    if stored != 0 {
        warn!(
            stored,
            current = SCHEMA_VERSION,
            "Schema version changed, discarding stored reconstruction rows"
        );
        for table in DERIVED_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *conn)
                .await?;
        }
    }

    for statement in include_str!("schema.sql").split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&mut *conn).await?;
        }
    }
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(temp_dir: &TempDir) -> String {
        temp_dir
            .path()
            .join("nested")
            .join("ledger.db")
            .to_string_lossy()
            .to_string()
    }

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("query failed")
    }

    #[tokio::test]
    async fn test_init_db_creates_directory_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);

        let pool = init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());
        assert_eq!(
            table_names(&pool).await,
            vec!["cashflow_rows", "compile_state", "lot_rows"]
        );

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);

        let pool = init_db(&path).await.unwrap();
        sqlx::query("INSERT INTO compile_state (code, row_count) VALUES ('000001', 4)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = init_db(&path).await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT row_count FROM compile_state")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 4);
    }

    #[tokio::test]
    async fn test_version_change_discards_derived_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);

        let pool = init_db(&path).await.unwrap();
        sqlx::query("INSERT INTO compile_state (code, row_count) VALUES ('000001', 4)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = init_db(&path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM compile_state")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(table_names(&pool).await.len(), 3);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.unwrap();

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
