use std::sync::Arc;

use color_eyre::eyre::{OptionExt, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    access::Access,
    csv,
    domain::props::{Amount, TransferId, UserId},
    store::Ledger,
};

// Replays command rows through the access facade. Each row acts as the user
// named in its `user` column; rows are independent of each other.
pub struct Payments<L: Ledger> {
    access: Access<L>,
}

impl<L: Ledger> Payments<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Payments {
            access: Access::new(ledger),
        }
    }

    pub async fn handle(&self, r: csv::CsvCommandRecord) -> Result<()> {
        match r.command {
            csv::CommandType::Open => self.handle_open(r).await?,
            csv::CommandType::Send => self.handle_send(r).await?,
            csv::CommandType::Request => self.handle_request(r).await?,
            csv::CommandType::Approve => self.handle_approve(r).await?,
            csv::CommandType::Reject => self.handle_reject(r).await?,
        }

        Ok(())
    }

    pub async fn handle_open(&self, r: csv::CsvCommandRecord) -> Result<()> {
        let amount = require_amount(r.amount, r.user_id)?;

        self.access.register(UserId(r.user_id), Amount(amount)).await?;

        Ok(())
    }

    pub async fn handle_send(&self, r: csv::CsvCommandRecord) -> Result<()> {
        let amount = require_amount(r.amount, r.user_id)?;
        let recipient = require_counterparty(r.counterparty, r.user_id)?;

        let sent = self
            .access
            .session(UserId(r.user_id))
            .await?
            .send_to_user(UserId(recipient), Amount(amount))
            .await?;

        info!("User {} sent transfer {}", r.user_id, sent.transfer_id);

        Ok(())
    }

    pub async fn handle_request(&self, r: csv::CsvCommandRecord) -> Result<()> {
        let amount = require_amount(r.amount, r.user_id)?;
        let payer = require_counterparty(r.counterparty, r.user_id)?;

        let requested = self
            .access
            .session(UserId(r.user_id))
            .await?
            .request_from_user(UserId(payer), Amount(amount))
            .await?;

        info!(
            "User {} opened request {}",
            r.user_id, requested.transfer_id
        );

        Ok(())
    }

    pub async fn handle_approve(&self, r: csv::CsvCommandRecord) -> Result<()> {
        let transfer_id = require_transfer(r.transfer_id, r.user_id)?;

        self.access
            .session(UserId(r.user_id))
            .await?
            .approve(transfer_id)
            .await?;

        Ok(())
    }

    pub async fn handle_reject(&self, r: csv::CsvCommandRecord) -> Result<()> {
        let transfer_id = require_transfer(r.transfer_id, r.user_id)?;

        self.access
            .session(UserId(r.user_id))
            .await?
            .reject(transfer_id)
            .await?;

        Ok(())
    }
}

fn require_amount(amount_opt: Option<Decimal>, user_id: i64) -> Result<Decimal> {
    amount_opt.ok_or_eyre(format!("No amount found in row for user {}", user_id))
}

fn require_counterparty(counterparty_opt: Option<i64>, user_id: i64) -> Result<i64> {
    counterparty_opt.ok_or_eyre(format!("No counterparty found in row for user {}", user_id))
}

fn require_transfer(transfer_opt: Option<i64>, user_id: i64) -> Result<TransferId> {
    transfer_opt
        .map(TransferId)
        .ok_or_eyre(format!("No transfer found in row for user {}", user_id))
}
