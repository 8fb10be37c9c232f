use anyhow::Context;
use fundledger::datasource::PriceProvider;
use fundledger::orchestration::PortfolioReport;
use fundledger::{config::Config, db::init_db, AppError, CsvPriceProvider, Orchestrator};
use fundledger::{RecordBook, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let report = run().await.context("reporting run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run() -> Result<PortfolioReport, AppError> {
    let config = Config::from_env()?;
    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let records = RecordBook::from_path(&config.record_path).await?;
    tracing::info!(
        funds = records.len(),
        horizon = %config.horizon,
        "Loaded trade records"
    );

    let provider: Arc<dyn PriceProvider> =
        Arc::new(CsvPriceProvider::new(&config.price_dir).with_horizon(config.horizon));
    let orchestrator = Orchestrator::new(provider, repo);

    let portfolio = orchestrator.compile_all(&records, config.horizon).await;
    Ok(portfolio.report(config.report_date, config.xirr_guess))
}
