//! Turns an authenticated user into the account the engine acts for.
//!
//! Authentication happens elsewhere; by the time a [`UserId`] reaches this
//! module it is trusted.

use std::sync::Arc;

use crate::{
    domain::{
        account::Account,
        error::TransferError,
        props::{AccountId, Amount, Decision, PendingRole, TransferId, UserId},
        transfer::record::TransferRecord,
    },
    engine::TransferEngine,
    store::Ledger,
};

pub struct Access<L: Ledger> {
    ledger: Arc<L>,
    engine: TransferEngine<L>,
}

impl<L: Ledger> Access<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        let engine = TransferEngine::new(ledger.clone());

        Access { ledger, engine }
    }

    /// Registration hook: every user gets exactly one account.
    pub async fn register(
        &self,
        user_id: UserId,
        opening_balance: Amount,
    ) -> Result<Account, TransferError> {
        self.ledger.open_account(user_id, opening_balance).await
    }

    /// Everyone a user could send to or request from.
    pub async fn directory(&self) -> Result<Vec<Account>, TransferError> {
        self.ledger.list_accounts().await
    }

    pub async fn session(&self, user_id: UserId) -> Result<Session<'_, L>, TransferError> {
        let account = self.ledger.get_account_by_user_id(user_id).await?;

        Ok(Session {
            access: self,
            account_id: account.account_id,
            user_id: account.user_id,
        })
    }
}

/// The engine's operations on behalf of one signed-in user.
///
/// A session carries only the caller's identity; balances and transfers are
/// read from the ledger on every call.
pub struct Session<'a, L: Ledger> {
    access: &'a Access<L>,
    account_id: AccountId,
    user_id: UserId,
}

impl<L: Ledger> Session<'_, L> {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn balance(&self) -> Result<Amount, TransferError> {
        self.access.ledger.get_balance(self.account_id).await
    }

    pub async fn send_to_user(
        &self,
        recipient: UserId,
        amount: Amount,
    ) -> Result<TransferRecord, TransferError> {
        let to = self.access.ledger.get_account_by_user_id(recipient).await?;

        self.access
            .engine
            .send_funds(self.account_id, to.account_id, amount)
            .await
    }

    pub async fn request_from_user(
        &self,
        payer: UserId,
        amount: Amount,
    ) -> Result<TransferRecord, TransferError> {
        let from = self.access.ledger.get_account_by_user_id(payer).await?;

        self.access
            .engine
            .request_funds(self.account_id, from.account_id, amount)
            .await
    }

    pub async fn approve(&self, transfer_id: TransferId) -> Result<TransferRecord, TransferError> {
        self.resolve(transfer_id, Decision::Approve).await
    }

    pub async fn reject(&self, transfer_id: TransferId) -> Result<TransferRecord, TransferError> {
        self.resolve(transfer_id, Decision::Reject).await
    }

    pub async fn history(&self) -> Result<Vec<TransferRecord>, TransferError> {
        self.access
            .engine
            .list_history(self.account_id)
            .await
    }

    pub async fn pending(&self, role: PendingRole) -> Result<Vec<TransferRecord>, TransferError> {
        self.access
            .engine
            .list_pending_for_account(self.account_id, role)
            .await
    }

    pub async fn transfer(&self, transfer_id: TransferId) -> Result<TransferRecord, TransferError> {
        self.access
            .engine
            .transfer_details(self.account_id, transfer_id)
            .await
    }

    async fn resolve(
        &self,
        transfer_id: TransferId,
        decision: Decision,
    ) -> Result<TransferRecord, TransferError> {
        self.access
            .engine
            .resolve_pending_transfer(self.account_id, transfer_id, decision)
            .await
    }
}
