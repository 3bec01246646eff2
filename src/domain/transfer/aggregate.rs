use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    error::TransferError,
    props::{AccountId, Amount, Decision, TransferStatus, TransferType},
    transfer::{
        command::{
            RequestFundsPayload, ResolveTransferPayload, SendFundsPayload, TransferCommand,
        },
        event::{
            FundsRequestedPayload, FundsSentPayload, RequestApprovedPayload,
            RequestRejectedPayload, TransferEvent,
        },
        record::TransferRecord,
    },
};

// Aggregate
#[derive(Serialize, Default, Deserialize, Debug, Clone, PartialEq)]
pub struct Transfer {
    recorded: bool,
    pub transfer_type: Option<TransferType>,
    pub status: Option<TransferStatus>,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
    pub amount: Amount,
}

// Interface to the outside world, not used in this case.
pub struct TransferServices {}

#[async_trait]
impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = TransferError;
    type Services = TransferServices;

    fn aggregate_type() -> String {
        "Transfer".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::SendFunds(p) => self.send(p).await,
            TransferCommand::RequestFunds(p) => self.request(p).await,
            TransferCommand::ResolveTransfer(p) => self.resolve(p).await,
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TransferEvent::FundsSent(p) => {
                self.recorded = true;
                self.transfer_type = Some(TransferType::Send);
                self.status = Some(TransferStatus::Approved);
                self.from = Some(p.from);
                self.to = Some(p.to);
                self.amount = p.amount;
            }
            TransferEvent::FundsRequested(p) => {
                self.recorded = true;
                self.transfer_type = Some(TransferType::Request);
                self.status = Some(TransferStatus::Pending);
                self.from = Some(p.from);
                self.to = Some(p.to);
                self.amount = p.amount;
            }
            TransferEvent::RequestApproved(_) => {
                self.status = Some(TransferStatus::Approved);
            }
            TransferEvent::RequestRejected(_) => {
                self.status = Some(TransferStatus::Rejected);
            }
        }
    }
}

impl From<&TransferRecord> for Transfer {
    fn from(record: &TransferRecord) -> Self {
        Transfer {
            recorded: true,
            transfer_type: Some(record.transfer_type),
            status: Some(record.status),
            from: Some(record.from),
            to: Some(record.to),
            amount: record.amount,
        }
    }
}

impl Transfer {
    async fn send(
        &self,
        p: SendFundsPayload,
    ) -> Result<Vec<<Transfer as Aggregate>::Event>, <Transfer as Aggregate>::Error> {
        debug!("Sending {} from {} to {}", p.amount, p.from, p.to);

        require_new(self)?;
        require_legal_amount(&p.amount)?;
        require_distinct_accounts(&p.from, &p.to)?;

        Ok(vec![TransferEvent::FundsSent(FundsSentPayload {
            from: p.from,
            to: p.to,
            amount: p.amount,
        })])
    }

    async fn request(
        &self,
        p: RequestFundsPayload,
    ) -> Result<Vec<<Transfer as Aggregate>::Event>, <Transfer as Aggregate>::Error> {
        debug!("Requesting {} from {} to {}", p.amount, p.from, p.to);

        require_new(self)?;
        require_legal_amount(&p.amount)?;
        require_distinct_accounts(&p.from, &p.to)?;

        Ok(vec![TransferEvent::FundsRequested(FundsRequestedPayload {
            from: p.from,
            to: p.to,
            amount: p.amount,
        })])
    }

    async fn resolve(
        &self,
        p: ResolveTransferPayload,
    ) -> Result<Vec<<Transfer as Aggregate>::Event>, <Transfer as Aggregate>::Error> {
        debug!("Resolving transfer with {} by {}", p.decision, p.caller);

        let (from, to) = require_recorded(self)?;
        require_payer(&from, &p.caller)?;
        require_pending(self)?;

        let event = match p.decision {
            Decision::Approve => TransferEvent::RequestApproved(RequestApprovedPayload {
                from,
                to,
                amount: self.amount,
            }),
            Decision::Reject => TransferEvent::RequestRejected(RequestRejectedPayload { from, to }),
        };

        Ok(vec![event])
    }
}

fn require_new(transfer: &Transfer) -> Result<(), <Transfer as Aggregate>::Error> {
    if transfer.recorded {
        return Err(TransferError::InvalidStateTransition(
            "transfer already recorded".to_owned(),
        ));
    }

    Ok(())
}

fn require_legal_amount(amount: &Amount) -> Result<(), <Transfer as Aggregate>::Error> {
    if !amount.is_positive() {
        return Err(TransferError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    amount.to_minor_units().map(|_| ())
}

fn require_distinct_accounts(
    from: &AccountId,
    to: &AccountId,
) -> Result<(), <Transfer as Aggregate>::Error> {
    if from == to {
        return Err(TransferError::Validation(format!(
            "account {} cannot transfer to itself",
            from
        )));
    }

    Ok(())
}

fn require_recorded(
    transfer: &Transfer,
) -> Result<(AccountId, AccountId), <Transfer as Aggregate>::Error> {
    match (transfer.recorded, transfer.from, transfer.to) {
        (true, Some(from), Some(to)) => Ok((from, to)),
        _ => Err(TransferError::NotFound("transfer".to_owned())),
    }
}

// Only the account whose funds would move may answer a request.
fn require_payer(
    payer: &AccountId,
    caller: &AccountId,
) -> Result<(), <Transfer as Aggregate>::Error> {
    if payer != caller {
        return Err(TransferError::Unauthorized);
    }

    Ok(())
}

fn require_pending(transfer: &Transfer) -> Result<(), <Transfer as Aggregate>::Error> {
    match transfer.status {
        Some(TransferStatus::Pending) => Ok(()),
        Some(status) => Err(TransferError::InvalidStateTransition(format!(
            "transfer is already {}",
            status
        ))),
        None => Err(TransferError::NotFound("transfer".to_owned())),
    }
}
