use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    error::TransferError,
    props::{AccountId, Amount, TransferId, TransferStatus, TransferType},
};

/// A transfer as persisted by the transfer store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from == account_id || self.to == account_id
    }
}

/// A transfer not yet assigned an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransfer {
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

impl NewTransfer {
    /// A send is settled the moment it is recorded.
    pub fn send(from: AccountId, to: AccountId, amount: Amount) -> Self {
        NewTransfer {
            transfer_type: TransferType::Send,
            status: TransferStatus::Approved,
            from,
            to,
            amount,
        }
    }

    pub fn request(from: AccountId, to: AccountId, amount: Amount) -> Self {
        NewTransfer {
            transfer_type: TransferType::Request,
            status: TransferStatus::Pending,
            from,
            to,
            amount,
        }
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if !self.amount.is_positive() {
            return Err(TransferError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if self.from == self.to {
            return Err(TransferError::Validation(format!(
                "account {} cannot transfer to itself",
                self.from
            )));
        }

        if self.status == TransferStatus::Rejected {
            return Err(TransferError::Validation(
                "a transfer cannot be created rejected".to_owned(),
            ));
        }

        self.amount.to_minor_units().map(|_| ())
    }
}
