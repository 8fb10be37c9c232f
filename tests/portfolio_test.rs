//! Multi-fund runs from files on disk, the way the binary drives them.

use chrono::NaiveDate;
use fundledger::datasource::PriceProvider;
use fundledger::domain::{Decimal, InstrumentCode};
use fundledger::orchestration::FundFailure;
use fundledger::{init_db, CsvPriceProvider, Orchestrator, Portfolio, RecordBook, Repository};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, n).unwrap()
}

fn write_prices(dir: &Path, code: &str, rows: &[(u32, &str, &str)]) {
    let mut csv = String::from("date,netvalue,comment\n");
    for (n, nav, comment) in rows {
        csv.push_str(&format!("2024-01-{:02},{},{}\n", n, nav, comment));
    }
    std::fs::write(dir.join(format!("{}.csv", code)), csv).unwrap();
}

/// Two healthy funds and one whose price feed carries an unparseable comment.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let flat: Vec<(u32, &str, &str)> = (2..=12).map(|n| (n, "1.00", "")).collect();
    write_prices(dir.path(), "000001", &flat);

    let rising: Vec<(u32, &str, &str)> = (2..=12)
        .map(|n| if n < 8 { (n, "2.00", "") } else { (n, "2.50", "") })
        .collect();
    write_prices(dir.path(), "000002", &rising);

    write_prices(
        dir.path(),
        "000003",
        &[(2, "1.00", ""), (5, "1.00", "see notice"), (12, "1.00", "")],
    );

    std::fs::write(
        dir.path().join("instruments.json"),
        r#"{"000002": {"name": "Growth", "redemption_fees": ["小于7天", "1.50%", "大于等于7天", "0.00%"]}}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("record.csv"),
        "date,1,2,3\n2024-01-02,600,400,100\n2024-01-09,,-100,\n",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn test_portfolio_from_directory() {
    let dir = fixture();
    let records = RecordBook::from_path(dir.path().join("record.csv"))
        .await
        .unwrap();
    let provider = CsvPriceProvider::new(dir.path()).with_horizon(day(12));

    let portfolio = Portfolio::build(&provider, &records, day(12)).await;
    assert!(matches!(
        portfolio.failures().get(&InstrumentCode::new("000003")),
        Some(FundFailure::Engine(_))
    ));

    let summary = portfolio.summary(day(12));
    // 600 shares at 1.00 and 100 shares at 2.50
    assert_eq!(summary.total_value, d("850"));
    assert_eq!(summary.holdings.len(), 2);
    assert_eq!(summary.holdings[0].report.code.as_str(), "000001");
    assert_eq!(summary.holdings[1].report.name, "Growth");

    // Day 9: 100 shares of 000002 at 2.50, held seven days, no fee.
    let combined = portfolio.combined_cashflow();
    assert_eq!(combined, vec![(day(2), d("-1000")), (day(9), d("250"))]);

    let rate = portfolio.xirr(day(12), 0.01).unwrap();
    assert!(rate > 0.0);
}

#[tokio::test]
async fn test_orchestrator_report_survives_restart() {
    let dir = fixture();
    let db_path = dir.path().join("ledger.db").to_string_lossy().to_string();
    let records = RecordBook::from_path(dir.path().join("record.csv"))
        .await
        .unwrap();
    let provider: Arc<dyn PriceProvider> =
        Arc::new(CsvPriceProvider::new(dir.path()).with_horizon(day(12)));

    let first = {
        let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
        Orchestrator::new(provider.clone(), repo)
            .compile_all(&records, day(12))
            .await
            .report(day(12), 0.01)
    };
    let second = {
        let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
        Orchestrator::new(provider, repo)
            .compile_all(&records, day(12))
            .await
            .report(day(12), 0.01)
    };

    assert_eq!(first.summary, second.summary);
    assert_eq!(first.funds.len(), 2);
    assert_eq!(second.failures.len(), 1);
    assert!(second.failures.contains_key("000003"));
    assert!((first.xirr - second.xirr).abs() < 1e-12);
}
