use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;

use crate::domain::error::TransferError;

/// Fractional digits carried by every stored amount.
pub const AMOUNT_SCALE: u32 = 2;

#[derive(
    Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, Hash,
)]
pub struct AccountId(pub i64);

#[derive(
    Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, Hash,
)]
pub struct UserId(pub i64);

#[derive(
    Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, Hash,
)]
pub struct TransferId(pub i64);

/// Fixed-point money value. Persisted as an integer count of minor units.
#[derive(
    Shrinkwrap, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, Hash,
)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn from_minor_units(units: i64) -> Self {
        Amount(Decimal::new(units, AMOUNT_SCALE))
    }

    /// Exact conversion to minor units; fails for sub-cent precision or values
    /// outside the storable range.
    pub fn to_minor_units(&self) -> Result<i64, TransferError> {
        if self.0.normalize().scale() > AMOUNT_SCALE {
            return Err(TransferError::Validation(format!(
                "amount {} has more than {} fractional digits",
                self.0, AMOUNT_SCALE
            )));
        }

        let mut scaled = self.0;
        scaled.rescale(AMOUNT_SCALE);

        i64::try_from(scaled.mantissa())
            .map_err(|_| TransferError::Validation(format!("amount {} is out of range", self.0)))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, Hash)]
pub enum TransferType {
    Request,
    Send,
}

impl TransferType {
    pub fn id(&self) -> i64 {
        match self {
            TransferType::Request => 1,
            TransferType::Send => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(TransferType::Request),
            2 => Some(TransferType::Send),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, Hash)]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransferStatus {
    pub fn id(&self) -> i64 {
        match self {
            TransferStatus::Pending => 1,
            TransferStatus::Approved => 2,
            TransferStatus::Rejected => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(TransferStatus::Pending),
            2 => Some(TransferStatus::Approved),
            3 => Some(TransferStatus::Rejected),
            _ => None,
        }
    }

    /// Approved and Rejected never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

/// The payer's answer to a pending request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(&self) -> TransferStatus {
        match self {
            Decision::Approve => TransferStatus::Approved,
            Decision::Reject => TransferStatus::Rejected,
        }
    }
}

/// Which side of a pending transfer an account is looked up on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum PendingRole {
    Payer,
    Payee,
}
