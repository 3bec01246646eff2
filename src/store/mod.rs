//! Persistence contracts for accounts and transfers.
//!
//! The engine depends only on these traits. Each method is its own atomic
//! unit; [`Ledger`] adds the units that must span both stores.

use async_trait::async_trait;

use crate::domain::{
    account::Account,
    error::TransferError,
    props::{AccountId, Amount, PendingRole, TransferId, TransferStatus, UserId},
    transfer::record::{NewTransfer, TransferRecord},
};

pub mod sqlite;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates the single account owned by `user_id`.
    async fn open_account(
        &self,
        user_id: UserId,
        opening_balance: Amount,
    ) -> Result<Account, TransferError>;

    async fn get_account(&self, account_id: AccountId) -> Result<Account, TransferError>;

    async fn get_balance(&self, account_id: AccountId) -> Result<Amount, TransferError>;

    async fn get_account_by_user_id(&self, user_id: UserId) -> Result<Account, TransferError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, TransferError>;

    /// Debits `from` and credits `to` by `amount`, or changes nothing.
    async fn apply_atomic_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn create(&self, transfer: NewTransfer) -> Result<TransferId, TransferError>;

    async fn get_by_id(&self, transfer_id: TransferId) -> Result<TransferRecord, TransferError>;

    /// Most recent first.
    async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, TransferError>;

    async fn list_pending(
        &self,
        account_id: AccountId,
        role: PendingRole,
    ) -> Result<Vec<TransferRecord>, TransferError>;

    /// Moves a Pending transfer to `status`. Terminal transfers are left
    /// untouched and reported as `InvalidStateTransition`.
    async fn set_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
    ) -> Result<(), TransferError>;
}

#[async_trait]
pub trait Ledger: AccountStore + TransferStore {
    /// Moves the funds and records the settled send in one unit.
    async fn record_send(&self, transfer: NewTransfer) -> Result<TransferRecord, TransferError>;

    /// Flips a Pending request to Approved and moves its funds in one unit.
    /// On any failure the request stays Pending.
    async fn approve_pending(
        &self,
        transfer_id: TransferId,
    ) -> Result<TransferRecord, TransferError>;
}
