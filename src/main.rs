#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use color_eyre::eyre::Result;
use funds_transfer_engine::{
    cli::CliArgs,
    config::StoreConfig,
    csv::{CsvCommandRecord, read_input},
    domain::error::TransferError,
    logging::init_logging,
    payments::Payments,
    query::account::print_accounts_csv,
    store::sqlite::SqliteLedger,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli_args = CliArgs::load()?;
    let config = StoreConfig::from_env()?;

    // Balances live in sqlite; the default in-memory database lasts for one run.
    let ledger = Arc::new(SqliteLedger::connect(&config).await?);
    info!("Ledger ready at {}", config.database_url);

    let payments = Payments::new(ledger.clone());

    let rows = read_input::<CsvCommandRecord>(&cli_args.input_file_path)?;

    for row_result in rows {
        match row_result {
            Ok(row) => {
                let _ = payments.handle(row).await.inspect_err(|e| {
                    match e.downcast_ref::<TransferError>() {
                        Some(err) if err.is_retryable() => warn!("Row not applied: {}", e),
                        _ => debug!("Error processing row: {}", e),
                    }
                });
            }
            Err(e) => debug!("Error parsing row: {}", e),
        }
    }

    print_accounts_csv(ledger.pool()).await?;

    Ok(())
}
