//! Persistent store for reconstructed funds.
//!
//! Each fund owns its compile watermark here; its table rows live in
//! `trades.rs`. Dates are stored as `YYYY-MM-DD` text and decimals in their
//! canonical string form so rows compare exactly after a round trip.

mod trades;

use crate::compile::CompileState;
use crate::domain::{parse_date, InstrumentCode};
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Handle to the reconstruction store.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Compile state operations
    // =========================================================================

    /// Store compile state for a fund.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn store_compile_state(&self, state: &CompileState) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        upsert_compile_state(&mut conn, state).await
    }

    /// Get compile state for a fund.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored date is malformed.
    pub async fn get_compile_state(
        &self,
        code: &InstrumentCode,
    ) -> Result<Option<CompileState>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT last_date, processed_through, prefix_digest, row_count FROM compile_state WHERE code = ?",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let last_date: Option<String> = row.get("last_date");
        let processed_through: Option<String> = row.get("processed_through");
        Ok(Some(CompileState {
            code: code.clone(),
            last_date: last_date.as_deref().map(decode_date).transpose()?,
            processed_through: processed_through.as_deref().map(decode_date).transpose()?,
            prefix_digest: row.get("prefix_digest"),
            row_count: row.get("row_count"),
        }))
    }

    /// Delete every stored row and the watermark of a fund.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn clear_instrument(&self, code: &InstrumentCode) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for table in ["cashflow_rows", "lot_rows", "compile_state"] {
            sqlx::query(&format!("DELETE FROM {} WHERE code = ?", table))
                .bind(code.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_compile_state(
    conn: &mut sqlx::SqliteConnection,
    state: &CompileState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO compile_state (code, last_date, processed_through, prefix_digest, row_count, compile_version)
        VALUES (?, ?, ?, ?, ?, 1)
        ON CONFLICT(code) DO UPDATE SET
            last_date = excluded.last_date,
            processed_through = excluded.processed_through,
            prefix_digest = excluded.prefix_digest,
            row_count = excluded.row_count,
            compile_version = compile_version + 1
        "#,
    )
    .bind(state.code.as_str())
    .bind(state.last_date.map(encode_date))
    .bind(state.processed_through.map(encode_date))
    .bind(state.prefix_digest.as_deref())
    .bind(state.row_count)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn decode_date(raw: &str) -> Result<NaiveDate, sqlx::Error> {
    parse_date(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
