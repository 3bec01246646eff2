use std::sync::Arc;

use cqrs_es::{Aggregate, DomainEvent};
use tracing::debug;

use crate::{
    domain::{
        error::TransferError,
        props::{AccountId, Amount, Decision, PendingRole, TransferId, TransferStatus},
        transfer::{
            aggregate::{Transfer, TransferServices},
            command::{
                RequestFundsPayload, ResolveTransferPayload, SendFundsPayload, TransferCommand,
            },
            event::TransferEvent,
            record::{NewTransfer, TransferRecord},
        },
    },
    store::Ledger,
};

// The transfer aggregate decides, the ledger persists. Every event the
// aggregate emits maps to exactly one atomic ledger unit.
pub struct TransferEngine<L: Ledger> {
    ledger: Arc<L>,
    services: TransferServices,
}

impl<L: Ledger> TransferEngine<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        TransferEngine {
            ledger,
            services: TransferServices {},
        }
    }

    /// Moves `amount` from the caller to `to` immediately.
    pub async fn send_funds(
        &self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferRecord, TransferError> {
        debug!("Send of {} from {} to {}", amount, caller, to);

        let events = Transfer::default()
            .handle(
                TransferCommand::SendFunds(SendFundsPayload {
                    from: caller,
                    to,
                    amount,
                }),
                &self.services,
            )
            .await?;

        self.ledger.get_account(to).await?;

        self.commit(None, events).await
    }

    /// Records a pending request for `from` to pay the caller. Nothing moves
    /// until `from` approves it.
    pub async fn request_funds(
        &self,
        caller: AccountId,
        from: AccountId,
        amount: Amount,
    ) -> Result<TransferRecord, TransferError> {
        debug!("Request of {} from {} by {}", amount, from, caller);

        let events = Transfer::default()
            .handle(
                TransferCommand::RequestFunds(RequestFundsPayload {
                    from,
                    to: caller,
                    amount,
                }),
                &self.services,
            )
            .await?;

        self.ledger.get_account(from).await?;

        self.commit(None, events).await
    }

    /// Approves or rejects a pending request. Only the payer may do so.
    ///
    /// An approval the payer cannot cover fails with `InsufficientFunds` and
    /// leaves the request pending, so it can be retried after a top-up or
    /// rejected.
    pub async fn resolve_pending_transfer(
        &self,
        caller: AccountId,
        transfer_id: TransferId,
        decision: Decision,
    ) -> Result<TransferRecord, TransferError> {
        debug!("{} of transfer {} by {}", decision, transfer_id, caller);

        let record = self.ledger.get_by_id(transfer_id).await?;

        let events = Transfer::from(&record)
            .handle(
                TransferCommand::ResolveTransfer(ResolveTransferPayload { caller, decision }),
                &self.services,
            )
            .await?;

        self.commit(Some(transfer_id), events)
            .await
            .inspect_err(|e| {
                if *e == TransferError::InsufficientFunds {
                    debug!("Transfer {} left pending, payer cannot cover it", transfer_id);
                }
            })
    }

    pub async fn list_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ledger.list_by_account(account_id).await
    }

    pub async fn list_pending_for_account(
        &self,
        account_id: AccountId,
        role: PendingRole,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ledger.list_pending(account_id, role).await
    }

    /// A single transfer, visible only to its payer and payee.
    pub async fn transfer_details(
        &self,
        caller: AccountId,
        transfer_id: TransferId,
    ) -> Result<TransferRecord, TransferError> {
        let record = self.ledger.get_by_id(transfer_id).await?;

        if !record.involves(caller) {
            return Err(TransferError::Unauthorized);
        }

        Ok(record)
    }

    async fn commit(
        &self,
        transfer_id: Option<TransferId>,
        events: Vec<TransferEvent>,
    ) -> Result<TransferRecord, TransferError> {
        let mut committed = None;

        for event in events {
            committed = Some(self.commit_event(transfer_id, event).await?);
        }

        committed.ok_or_else(|| {
            TransferError::InvalidStateTransition("command produced no change".to_owned())
        })
    }

    async fn commit_event(
        &self,
        transfer_id: Option<TransferId>,
        event: TransferEvent,
    ) -> Result<TransferRecord, TransferError> {
        match (event, transfer_id) {
            (TransferEvent::FundsSent(p), None) => {
                self.ledger
                    .record_send(NewTransfer::send(p.from, p.to, p.amount))
                    .await
            }
            (TransferEvent::FundsRequested(p), None) => {
                let id = self
                    .ledger
                    .create(NewTransfer::request(p.from, p.to, p.amount))
                    .await?;
                self.ledger.get_by_id(id).await
            }
            (TransferEvent::RequestApproved(_), Some(id)) => self.ledger.approve_pending(id).await,
            (TransferEvent::RequestRejected(_), Some(id)) => {
                self.ledger.set_status(id, TransferStatus::Rejected).await?;
                self.ledger.get_by_id(id).await
            }
            (event, _) => Err(TransferError::InvalidStateTransition(format!(
                "{} cannot be applied here",
                event.event_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use rust_decimal::{Decimal, dec};

    use super::TransferEngine;
    use crate::{
        domain::{
            error::TransferError,
            props::{AccountId, Amount, Decision, PendingRole, TransferId, TransferStatus, TransferType},
        },
        store::{
            AccountStore, TransferStore,
            sqlite::{
                SqliteLedger,
                test_support::{TempLedger, open, temp_ledger},
            },
        },
    };

    async fn setup(
        balances: &[Decimal],
    ) -> (TempLedger, TransferEngine<SqliteLedger>, Vec<AccountId>) {
        let ledger = temp_ledger().await;
        let mut accounts = vec![];
        for (i, balance) in balances.iter().enumerate() {
            accounts.push(open(&ledger, 1001 + i as i64, *balance).await.account_id);
        }
        let engine = TransferEngine::new(ledger.shared());

        (ledger, engine, accounts)
    }

    async fn balance(ledger: &SqliteLedger, account: AccountId) -> Decimal {
        ledger.get_balance(account).await.unwrap().0
    }

    #[tokio::test]
    async fn send_moves_funds_immediately() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;

        let sent = engine
            .send_funds(acc[0], acc[1], Amount(dec!(40.00)))
            .await
            .unwrap();

        assert_eq!(sent.transfer_type, TransferType::Send);
        assert_eq!(sent.status, TransferStatus::Approved);
        assert_eq!(sent.amount, Amount(dec!(40.00)));
        assert_eq!(balance(&ledger, acc[0]).await, dec!(60.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(40.00));
    }

    #[tokio::test]
    async fn send_without_funds_changes_nothing() {
        let (ledger, engine, acc) = setup(&[dec!(10.00), dec!(0.00)]).await;

        let sent = engine
            .send_funds(acc[0], acc[1], Amount(dec!(50.00)))
            .await;

        assert_eq!(sent, Err(TransferError::InsufficientFunds));
        assert_eq!(balance(&ledger, acc[0]).await, dec!(10.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(0.00));
        assert!(engine.list_history(acc[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_to_self_is_invalid() {
        let (ledger, engine, acc) = setup(&[dec!(100.00)]).await;

        let sent = engine
            .send_funds(acc[0], acc[0], Amount(dec!(10.00)))
            .await;

        assert!(matches!(sent, Err(TransferError::Validation(_))));
        assert_eq!(balance(&ledger, acc[0]).await, dec!(100.00));
        assert!(engine.list_history(acc[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_account_is_not_found() {
        let (ledger, engine, acc) = setup(&[dec!(100.00)]).await;

        let sent = engine
            .send_funds(acc[0], AccountId(404), Amount(dec!(1.00)))
            .await;

        assert_eq!(sent, Err(TransferError::NotFound("account 404".to_owned())));
        assert_eq!(balance(&ledger, acc[0]).await, dec!(100.00));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let (_ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;

        for amount in [dec!(0), dec!(-5.00)] {
            assert!(matches!(
                engine.send_funds(acc[0], acc[1], Amount(amount)).await,
                Err(TransferError::Validation(_))
            ));
            assert!(matches!(
                engine.request_funds(acc[1], acc[0], Amount(amount)).await,
                Err(TransferError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn request_waits_for_payer() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;

        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(25.00)))
            .await
            .unwrap();

        assert_eq!(requested.transfer_type, TransferType::Request);
        assert_eq!(requested.status, TransferStatus::Pending);
        assert_eq!((requested.from, requested.to), (acc[0], acc[1]));
        assert_eq!(balance(&ledger, acc[0]).await, dec!(100.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(0.00));
        assert_eq!(
            engine
                .list_pending_for_account(acc[0], PendingRole::Payer)
                .await
                .unwrap(),
            vec![requested.clone()]
        );
        assert_eq!(
            engine
                .list_pending_for_account(acc[1], PendingRole::Payee)
                .await
                .unwrap(),
            vec![requested]
        );
    }

    #[tokio::test]
    async fn request_from_unknown_account_is_not_found() {
        let (_ledger, engine, acc) = setup(&[dec!(0.00)]).await;

        let requested = engine
            .request_funds(acc[0], AccountId(404), Amount(dec!(1.00)))
            .await;

        assert_eq!(
            requested,
            Err(TransferError::NotFound("account 404".to_owned()))
        );
    }

    #[tokio::test]
    async fn payer_approval_moves_funds() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;
        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(25.00)))
            .await
            .unwrap();

        let approved = engine
            .resolve_pending_transfer(acc[0], requested.transfer_id, Decision::Approve)
            .await
            .unwrap();

        assert_eq!(approved.status, TransferStatus::Approved);
        assert_eq!(balance(&ledger, acc[0]).await, dec!(75.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(25.00));
        assert!(
            engine
                .list_pending_for_account(acc[0], PendingRole::Payer)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn requester_cannot_approve() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;
        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(25.00)))
            .await
            .unwrap();

        let approved = engine
            .resolve_pending_transfer(acc[1], requested.transfer_id, Decision::Approve)
            .await;

        assert_eq!(approved, Err(TransferError::Unauthorized));
        assert_eq!(
            ledger
                .get_by_id(requested.transfer_id)
                .await
                .unwrap()
                .status,
            TransferStatus::Pending
        );
        assert_eq!(balance(&ledger, acc[0]).await, dec!(100.00));
    }

    #[tokio::test]
    async fn reject_has_no_balance_effect() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;
        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(25.00)))
            .await
            .unwrap();

        let rejected = engine
            .resolve_pending_transfer(acc[0], requested.transfer_id, Decision::Reject)
            .await
            .unwrap();

        assert_eq!(rejected.status, TransferStatus::Rejected);
        assert_eq!(balance(&ledger, acc[0]).await, dec!(100.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(0.00));

        let again = engine
            .resolve_pending_transfer(acc[0], requested.transfer_id, Decision::Approve)
            .await;
        assert!(matches!(again, Err(TransferError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn sends_cannot_be_resolved() {
        let (_ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;
        let sent = engine
            .send_funds(acc[0], acc[1], Amount(dec!(1.00)))
            .await
            .unwrap();

        let resolved = engine
            .resolve_pending_transfer(acc[0], sent.transfer_id, Decision::Reject)
            .await;

        assert!(matches!(
            resolved,
            Err(TransferError::InvalidStateTransition(_))
        ));
    }

    #[tokio::test]
    async fn uncovered_approval_stays_pending_until_topped_up() {
        let (ledger, engine, acc) = setup(&[dec!(10.00), dec!(0.00), dec!(50.00)]).await;
        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(25.00)))
            .await
            .unwrap();

        let first = engine
            .resolve_pending_transfer(acc[0], requested.transfer_id, Decision::Approve)
            .await;

        assert_eq!(first, Err(TransferError::InsufficientFunds));
        assert_eq!(
            ledger
                .get_by_id(requested.transfer_id)
                .await
                .unwrap()
                .status,
            TransferStatus::Pending
        );

        engine
            .send_funds(acc[2], acc[0], Amount(dec!(15.00)))
            .await
            .unwrap();
        engine
            .resolve_pending_transfer(acc[0], requested.transfer_id, Decision::Approve)
            .await
            .unwrap();

        assert_eq!(balance(&ledger, acc[0]).await, dec!(0.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(25.00));
    }

    #[tokio::test]
    async fn unknown_transfer_is_not_found() {
        let (_ledger, engine, acc) = setup(&[dec!(1.00)]).await;

        let resolved = engine
            .resolve_pending_transfer(acc[0], TransferId(9), Decision::Approve)
            .await;

        assert_eq!(
            resolved,
            Err(TransferError::NotFound("transfer 9".to_owned()))
        );
    }

    #[tokio::test]
    async fn details_are_private_to_the_parties() {
        let (_ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00), dec!(0.00)]).await;
        let sent = engine
            .send_funds(acc[0], acc[1], Amount(dec!(1.00)))
            .await
            .unwrap();

        assert_eq!(
            engine
                .transfer_details(acc[1], sent.transfer_id)
                .await
                .unwrap(),
            sent
        );
        assert_eq!(
            engine.transfer_details(acc[2], sent.transfer_id).await,
            Err(TransferError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn history_covers_both_directions() {
        let (_ledger, engine, acc) = setup(&[dec!(100.00), dec!(100.00)]).await;
        let out = engine
            .send_funds(acc[0], acc[1], Amount(dec!(1.00)))
            .await
            .unwrap();
        let inbound = engine
            .send_funds(acc[1], acc[0], Amount(dec!(2.00)))
            .await
            .unwrap();

        assert_eq!(
            engine.list_history(acc[0]).await.unwrap(),
            vec![inbound, out]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_apply_once() {
        let (ledger, engine, acc) = setup(&[dec!(100.00), dec!(0.00)]).await;
        let engine = Arc::new(engine);
        let requested = engine
            .request_funds(acc[1], acc[0], Amount(dec!(30.00)))
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let engine = engine.clone();
            let id = requested.transfer_id;
            let payer = acc[0];
            tokio::spawn(async move {
                engine
                    .resolve_pending_transfer(payer, id, Decision::Approve)
                    .await
            })
        });
        let outcomes: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let approved = outcomes.iter().filter(|o| o.is_ok()).count();
        let refused = outcomes
            .iter()
            .filter(|o| matches!(o, Err(TransferError::InvalidStateTransition(_))))
            .count();

        assert_eq!(approved, 1);
        assert_eq!(refused, 7);
        assert_eq!(balance(&ledger, acc[0]).await, dec!(70.00));
        assert_eq!(balance(&ledger, acc[1]).await, dec!(30.00));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_opposite_sends_conserve_money() {
        let (ledger, engine, acc) = setup(&[dec!(50.00), dec!(20.00)]).await;
        let engine = Arc::new(engine);

        let sends = (0..24).map(|i| {
            let engine = engine.clone();
            let (from, to, amount) = if i % 2 == 0 {
                (acc[0], acc[1], dec!(7.00))
            } else {
                (acc[1], acc[0], dec!(3.00))
            };
            tokio::spawn(async move {
                engine
                    .send_funds(from, to, Amount(amount))
                    .await
                    .map(|t| (t.from, t.amount.0))
            })
        });
        let outcomes: Vec<_> = join_all(sends)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let mut expected_first = dec!(50.00);
        for outcome in &outcomes {
            match outcome {
                Ok((from, amount)) if *from == acc[0] => expected_first -= *amount,
                Ok((_, amount)) => expected_first += *amount,
                Err(e) => assert_eq!(*e, TransferError::InsufficientFunds),
            }
        }

        let first = balance(&ledger, acc[0]).await;
        let second = balance(&ledger, acc[1]).await;

        assert_eq!(first, expected_first);
        assert_eq!(first + second, dec!(70.00));
        assert!(first >= Decimal::ZERO);
        assert!(second >= Decimal::ZERO);
    }
}
