use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::domain::props::{AccountId, Amount};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TransferEvent {
    FundsSent(FundsSentPayload),
    FundsRequested(FundsRequestedPayload),
    RequestApproved(RequestApprovedPayload),
    RequestRejected(RequestRejectedPayload),
}

impl DomainEvent for TransferEvent {
    fn event_type(&self) -> String {
        let event_type: &str = match self {
            TransferEvent::FundsSent(_) => "FundsSent",
            TransferEvent::FundsRequested(_) => "FundsRequested",
            TransferEvent::RequestApproved(_) => "RequestApproved",
            TransferEvent::RequestRejected(_) => "RequestRejected",
        };
        event_type.to_string()
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundsSentPayload {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundsRequestedPayload {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestApprovedPayload {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRejectedPayload {
    pub from: AccountId,
    pub to: AccountId,
}
