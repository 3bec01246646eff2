use std::io;

use color_eyre::eyre::{Result, eyre};
use csv::WriterBuilder;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::domain::props::Amount;

/// One line of the closing balance report.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub(crate) struct AccountView {
    #[serde(rename = "account")]
    pub account_id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    pub balance: Decimal,
}

pub async fn print_accounts_csv(sqlite_pool: &SqlitePool) -> Result<()> {
    write_accounts_csv(sqlite_pool, io::stdout()).await
}

pub async fn write_accounts_csv(sqlite_pool: &SqlitePool, out: impl io::Write) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().from_writer(out);

    let mut query =
        sqlx::query("SELECT account_id, user_id, balance FROM accounts ORDER BY account_id")
            .fetch(sqlite_pool);
    while let Some(row) = query.try_next().await.map_err(|e| eyre!(e))? {
        let view = AccountView {
            account_id: row.try_get("account_id")?,
            user_id: row.try_get("user_id")?,
            balance: *Amount::from_minor_units(row.try_get("balance")?),
        };
        csv_writer.serialize(view)?;
    }
    csv_writer.flush()?;

    Ok(())
}
