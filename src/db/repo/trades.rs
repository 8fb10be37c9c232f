//! Cash-flow and lot table operations for the repository.

use crate::compile::CompileState;
use crate::domain::{
    CashFlowRow, CashFlowTable, Decimal, InstrumentCode, LotLedger, LotTable, LotTableRow,
};
use sqlx::Row;

use super::{decode_date, encode_date, upsert_compile_state, Repository};

impl Repository {
    /// Load the stored tables of a fund in engine order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value cannot be decoded.
    pub async fn load_trade_tables(
        &self,
        code: &InstrumentCode,
    ) -> Result<(CashFlowTable, LotTable), sqlx::Error> {
        let cash_rows = sqlx::query(
            r#"
            SELECT date, cash, share
            FROM cashflow_rows
            WHERE code = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut cashflow = Vec::with_capacity(cash_rows.len());
        for row in &cash_rows {
            cashflow.push(CashFlowRow::new(
                decode_date(row.get::<&str, _>("date"))?,
                decode_decimal(row.get::<&str, _>("cash"))?,
                decode_decimal(row.get::<&str, _>("share"))?,
            ));
        }

        let lot_rows = sqlx::query(
            r#"
            SELECT date, lots_json
            FROM lot_rows
            WHERE code = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut lots = Vec::with_capacity(lot_rows.len());
        for row in &lot_rows {
            let ledger: LotLedger = serde_json::from_str(row.get::<&str, _>("lots_json"))
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            lots.push(LotTableRow {
                date: decode_date(row.get::<&str, _>("date"))?,
                lots: ledger,
            });
        }

        let cashflow = CashFlowTable::from_rows(cashflow)
            .ok_or_else(|| decode_error(format!("{}: stored cash-flow rows out of order", code)))?;
        let lots = LotTable::from_rows(lots)
            .ok_or_else(|| decode_error(format!("{}: stored lot rows out of order", code)))?;
        Ok((cashflow, lots))
    }

    /// Append rows starting at `state.row_count - rows.len()` and store the
    /// new watermark, all in a single transaction.
    ///
    /// # Errors
    /// Returns an error if any database operation fails; nothing is written then.
    pub async fn append_trade_rows(
        &self,
        state: &CompileState,
        cashflow: &[CashFlowRow],
        lots: &[LotTableRow],
    ) -> Result<(), sqlx::Error> {
        let first_seq = state.row_count - cashflow.len() as i64;
        let mut tx = self.pool.begin().await?;

        for (offset, row) in cashflow.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO cashflow_rows (code, seq, date, cash, share)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(state.code.as_str())
            .bind(first_seq + offset as i64)
            .bind(encode_date(row.date))
            .bind(row.cash.to_canonical_string())
            .bind(row.share.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }

        for (offset, row) in lots.iter().enumerate() {
            let lots_json = serde_json::to_string(&row.lots)
                .map_err(|e| sqlx::Error::Protocol(format!("lot ledger encoding: {}", e)))?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO lot_rows (code, seq, date, lots_json)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(state.code.as_str())
            .bind(first_seq + offset as i64)
            .bind(encode_date(row.date))
            .bind(lots_json)
            .execute(&mut *tx)
            .await?;
        }

        upsert_compile_state(&mut tx, state).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn decode_decimal(raw: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str_canonical(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 4, n).unwrap()
    }

    #[tokio::test]
    async fn test_append_and_load_trade_tables() {
        let (repo, _temp) = setup_test_db().await;
        let code = InstrumentCode::new("000001");

        let first = LotLedger::new().buy(d("1000"), day(1));
        let second = first.buy(d("12.34"), day(6));
        let cashflow = vec![
            CashFlowRow::new(day(1), d("-1000"), d("1000")),
            CashFlowRow::new(day(6), d("-12.5"), d("12.34")),
        ];
        let lots = vec![
            LotTableRow {
                date: day(1),
                lots: first,
            },
            LotTableRow {
                date: day(6),
                lots: second.clone(),
            },
        ];

        let mut state = CompileState::new(code.clone());
        state.update_watermark(Some(day(6)), Some(day(6)), "d1".to_string(), 1);
        repo.append_trade_rows(&state, &cashflow[..1], &lots[..1])
            .await
            .unwrap();
        state.update_watermark(Some(day(6)), Some(day(6)), "d2".to_string(), 2);
        repo.append_trade_rows(&state, &cashflow[1..], &lots[1..])
            .await
            .unwrap();

        let (loaded_cashflow, loaded_lots) = repo.load_trade_tables(&code).await.unwrap();
        assert_eq!(loaded_cashflow.rows(), cashflow.as_slice());
        assert_eq!(loaded_lots.current(), second);

        let stored = repo.get_compile_state(&code).await.unwrap().unwrap();
        assert_eq!(stored.row_count, 2);
        assert_eq!(stored.prefix_digest.as_deref(), Some("d2"));
    }

    #[tokio::test]
    async fn test_clear_instrument_removes_rows_and_state() {
        let (repo, _temp) = setup_test_db().await;
        let code = InstrumentCode::new("000002");

        let mut state = CompileState::new(code.clone());
        state.update_watermark(Some(day(1)), Some(day(1)), "d".to_string(), 1);
        repo.append_trade_rows(
            &state,
            &[CashFlowRow::new(day(1), d("-10"), d("10"))],
            &[LotTableRow {
                date: day(1),
                lots: LotLedger::new().buy(d("10"), day(1)),
            }],
        )
        .await
        .unwrap();

        repo.clear_instrument(&code).await.unwrap();
        let (cashflow, lots) = repo.load_trade_tables(&code).await.unwrap();
        assert!(cashflow.is_empty());
        assert!(lots.is_empty());
        assert!(repo.get_compile_state(&code).await.unwrap().is_none());
    }
}
