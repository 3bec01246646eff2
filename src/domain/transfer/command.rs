use serde::Deserialize;

use crate::domain::props::{AccountId, Amount, Decision};

#[derive(Debug, Clone, Deserialize)]
pub enum TransferCommand {
    SendFunds(SendFundsPayload),
    RequestFunds(RequestFundsPayload),
    ResolveTransfer(ResolveTransferPayload),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendFundsPayload {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

/// `from` is the payer who must later approve, `to` is the requester.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFundsPayload {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveTransferPayload {
    pub caller: AccountId,
    pub decision: Decision,
}
