//! SQLite backed [`Ledger`].
//!
//! Money is kept as integer minor units. Every mutating unit runs in one
//! transaction whose first statement is a write, so concurrent units queue on
//! the database write lock (bounded by the busy timeout) rather than racing
//! on stale reads. A transaction dropped before commit is rolled back.

use std::{future::Future, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row, Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
    },
};
use tracing::{debug, info};

use crate::{
    config::StoreConfig,
    domain::{
        account::Account,
        error::TransferError,
        props::{
            AccountId, Amount, PendingRole, TransferId, TransferStatus, TransferType, UserId,
        },
        transfer::record::{NewTransfer, TransferRecord},
    },
    store::{AccountStore, Ledger, TransferStore},
};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS accounts
        (
            account_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id    INTEGER NOT NULL UNIQUE,
            balance    INTEGER NOT NULL CHECK (balance >= 0)
        );",
    "CREATE TABLE IF NOT EXISTS transfers
        (
            transfer_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            transfer_type   INTEGER NOT NULL,
            transfer_status INTEGER NOT NULL,
            account_from    INTEGER NOT NULL REFERENCES accounts (account_id),
            account_to      INTEGER NOT NULL REFERENCES accounts (account_id),
            amount          INTEGER NOT NULL CHECK (amount > 0),
            created_at      TEXT    NOT NULL,
            CHECK (account_from <> account_to)
        );",
    "CREATE INDEX IF NOT EXISTS transfers_from_status ON transfers (account_from, transfer_status);",
    "CREATE INDEX IF NOT EXISTS transfers_to_status ON transfers (account_to, transfer_status);",
];

const TRANSFER_COLUMNS: &str = "transfer_id, transfer_type, transfer_status, account_from, \
                                account_to, amount, created_at";

pub async fn init_tables(pool: &SqlitePool) -> Result<(), TransferError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

pub struct SqliteLedger {
    pool: SqlitePool,
    operation_timeout: Duration,
}

impl SqliteLedger {
    pub async fn connect(config: &StoreConfig) -> Result<Self, TransferError> {
        let opts = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        // An in-memory database lives only as long as one of its connections.
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.operation_timeout)
            .connect_with(opts)
            .await?;

        init_tables(&pool).await?;

        Ok(SqliteLedger::new(pool, config.operation_timeout))
    }

    pub fn new(pool: SqlitePool, operation_timeout: Duration) -> Self {
        SqliteLedger {
            pool,
            operation_timeout,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<T, TransferError>> + Send,
    ) -> Result<T, TransferError> {
        tokio::time::timeout(self.operation_timeout, work)
            .await
            .map_err(|_| {
                TransferError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.operation_timeout
                ))
            })?
    }

    /// Runs the statements of a unit under the operation timeout, then
    /// commits. COMMIT is awaited outside the timeout: once it has been handed
    /// to the connection it completes even if the caller stops waiting, so an
    /// `Unavailable` from here always means nothing was written.
    async fn settle<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<(Transaction<'static, Sqlite>, T), TransferError>> + Send,
    ) -> Result<T, TransferError> {
        let (tx, value) = self.bounded(operation, work).await?;
        tx.commit().await?;

        Ok(value)
    }
}

#[async_trait]
impl AccountStore for SqliteLedger {
    async fn open_account(
        &self,
        user_id: UserId,
        opening_balance: Amount,
    ) -> Result<Account, TransferError> {
        self.bounded("open_account", async {
            let units = opening_balance.to_minor_units()?;
            if units < 0 {
                return Err(TransferError::Validation(format!(
                    "opening balance cannot be negative, got {}",
                    opening_balance
                )));
            }

            let inserted = sqlx::query("INSERT INTO accounts (user_id, balance) VALUES (?, ?)")
                .bind(*user_id)
                .bind(units)
                .execute(&self.pool)
                .await;

            let account_id = match inserted {
                Ok(done) => AccountId(done.last_insert_rowid()),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(TransferError::Validation(format!(
                        "user {} already has an account",
                        user_id
                    )));
                }
                Err(e) => return Err(e.into()),
            };

            info!("Opened account {} for user {}", account_id, user_id);

            Ok(Account {
                account_id,
                user_id,
                balance: Amount::from_minor_units(units),
            })
        })
        .await
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account, TransferError> {
        self.bounded("get_account", async {
            let mut conn = self.pool.acquire().await?;
            fetch_account(&mut conn, account_id).await
        })
        .await
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Amount, TransferError> {
        self.get_account(account_id)
            .await
            .map(|account| account.balance)
    }

    async fn get_account_by_user_id(&self, user_id: UserId) -> Result<Account, TransferError> {
        self.bounded("get_account_by_user_id", async {
            sqlx::query("SELECT account_id, user_id, balance FROM accounts WHERE user_id = ?")
                .bind(*user_id)
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row_to_account(&row))
                .transpose()?
                .ok_or_else(|| TransferError::NotFound(format!("account of user {}", user_id)))
        })
        .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, TransferError> {
        self.bounded("list_accounts", async {
            sqlx::query("SELECT account_id, user_id, balance FROM accounts ORDER BY account_id")
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(row_to_account)
                .collect()
        })
        .await
    }

    async fn apply_atomic_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.settle("apply_atomic_transfer", async {
            if from == to {
                return Err(TransferError::Validation(format!(
                    "account {} cannot transfer to itself",
                    from
                )));
            }

            let mut tx = self.pool.begin().await?;
            move_funds(&mut tx, from, to, amount).await?;

            Ok((tx, ()))
        })
        .await
    }
}

#[async_trait]
impl TransferStore for SqliteLedger {
    async fn create(&self, transfer: NewTransfer) -> Result<TransferId, TransferError> {
        self.bounded("create_transfer", async {
            let mut conn = self.pool.acquire().await?;
            let record = insert_transfer(&mut conn, &transfer).await?;

            Ok(record.transfer_id)
        })
        .await
    }

    async fn get_by_id(&self, transfer_id: TransferId) -> Result<TransferRecord, TransferError> {
        self.bounded("get_transfer", async {
            let mut conn = self.pool.acquire().await?;
            fetch_transfer(&mut conn, transfer_id).await
        })
        .await
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.bounded("list_transfers", async {
            sqlx::query(&format!(
                "SELECT {} FROM transfers WHERE account_from = ? OR account_to = ? \
                 ORDER BY transfer_id DESC",
                TRANSFER_COLUMNS
            ))
            .bind(*account_id)
            .bind(*account_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_transfer)
            .collect()
        })
        .await
    }

    async fn list_pending(
        &self,
        account_id: AccountId,
        role: PendingRole,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let column = match role {
            PendingRole::Payer => "account_from",
            PendingRole::Payee => "account_to",
        };

        self.bounded("list_pending", async {
            sqlx::query(&format!(
                "SELECT {} FROM transfers WHERE {} = ? AND transfer_status = ? \
                 ORDER BY transfer_id DESC",
                TRANSFER_COLUMNS, column
            ))
            .bind(*account_id)
            .bind(TransferStatus::Pending.id())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_transfer)
            .collect()
        })
        .await
    }

    async fn set_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
    ) -> Result<(), TransferError> {
        self.settle("set_status", async {
            let mut tx = self.pool.begin().await?;
            transition_status(&mut tx, transfer_id, status).await?;

            Ok((tx, ()))
        })
        .await?;

        info!("Transfer {} is now {}", transfer_id, status);

        Ok(())
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn record_send(&self, transfer: NewTransfer) -> Result<TransferRecord, TransferError> {
        let record = self.settle("record_send", async {
            transfer.validate()?;
            if transfer.transfer_type != TransferType::Send {
                return Err(TransferError::Validation(format!(
                    "expected a send, got a {}",
                    transfer.transfer_type
                )));
            }

            let mut tx = self.pool.begin().await?;
            move_funds(&mut tx, transfer.from, transfer.to, transfer.amount).await?;
            let record = insert_transfer(&mut tx, &transfer).await?;

            Ok((tx, record))
        })
        .await?;

        info!(
            "Transfer {} sent {} from {} to {}",
            record.transfer_id, record.amount, record.from, record.to
        );

        Ok(record)
    }

    async fn approve_pending(
        &self,
        transfer_id: TransferId,
    ) -> Result<TransferRecord, TransferError> {
        let record = self
            .settle("approve_pending", async {
                let mut tx = self.pool.begin().await?;

                // Claiming the status first makes this unit the only one that
                // can move the funds of this request.
                transition_status(&mut tx, transfer_id, TransferStatus::Approved).await?;
                let record = fetch_transfer(&mut tx, transfer_id).await?;
                move_funds(&mut tx, record.from, record.to, record.amount).await?;

                Ok((tx, record))
            })
            .await?;

        info!(
            "Transfer {} approved, moved {} from {} to {}",
            record.transfer_id, record.amount, record.from, record.to
        );

        Ok(record)
    }
}

async fn move_funds(
    conn: &mut SqliteConnection,
    from: AccountId,
    to: AccountId,
    amount: Amount,
) -> Result<(), TransferError> {
    if !amount.is_positive() {
        return Err(TransferError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    let units = amount.to_minor_units()?;

    let debited = sqlx::query(
        "UPDATE accounts SET balance = balance - ? WHERE account_id = ? AND balance >= ?",
    )
    .bind(units)
    .bind(*from)
    .bind(units)
    .execute(&mut *conn)
    .await?;

    if debited.rows_affected() == 0 {
        let payer = fetch_account(conn, from).await?;
        debug!(
            "Account {} holds {}, cannot cover {}",
            from, payer.balance, amount
        );
        return Err(TransferError::InsufficientFunds);
    }

    let credited = sqlx::query(
        "UPDATE accounts SET balance = balance + ? WHERE account_id = ? AND balance <= ? - ?",
    )
    .bind(units)
    .bind(*to)
    .bind(i64::MAX)
    .bind(units)
    .execute(&mut *conn)
    .await?;

    if credited.rows_affected() == 0 {
        fetch_account(conn, to).await?;
        return Err(TransferError::Validation(format!(
            "crediting {} would overflow the balance of account {}",
            amount, to
        )));
    }

    Ok(())
}

async fn transition_status(
    conn: &mut SqliteConnection,
    transfer_id: TransferId,
    status: TransferStatus,
) -> Result<(), TransferError> {
    if !status.is_terminal() {
        return Err(TransferError::InvalidStateTransition(format!(
            "transfer {} cannot be moved to {}",
            transfer_id, status
        )));
    }

    let updated = sqlx::query(
        "UPDATE transfers SET transfer_status = ? WHERE transfer_id = ? AND transfer_status = ?",
    )
    .bind(status.id())
    .bind(*transfer_id)
    .bind(TransferStatus::Pending.id())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        let current = fetch_transfer(conn, transfer_id).await?;
        return Err(TransferError::InvalidStateTransition(format!(
            "transfer {} is already {}",
            transfer_id, current.status
        )));
    }

    Ok(())
}

async fn insert_transfer(
    conn: &mut SqliteConnection,
    transfer: &NewTransfer,
) -> Result<TransferRecord, TransferError> {
    transfer.validate()?;

    let units = transfer.amount.to_minor_units()?;
    let created_at = Utc::now();

    let inserted = sqlx::query(
        "INSERT INTO transfers
            (transfer_type, transfer_status, account_from, account_to, amount, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(transfer.transfer_type.id())
    .bind(transfer.status.id())
    .bind(*transfer.from)
    .bind(*transfer.to)
    .bind(units)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(TransferRecord {
        transfer_id: TransferId(inserted.last_insert_rowid()),
        transfer_type: transfer.transfer_type,
        status: transfer.status,
        from: transfer.from,
        to: transfer.to,
        amount: Amount::from_minor_units(units),
        created_at,
    })
}

async fn fetch_account(
    conn: &mut SqliteConnection,
    account_id: AccountId,
) -> Result<Account, TransferError> {
    sqlx::query("SELECT account_id, user_id, balance FROM accounts WHERE account_id = ?")
        .bind(*account_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| row_to_account(&row))
        .transpose()?
        .ok_or_else(|| TransferError::NotFound(format!("account {}", account_id)))
}

async fn fetch_transfer(
    conn: &mut SqliteConnection,
    transfer_id: TransferId,
) -> Result<TransferRecord, TransferError> {
    sqlx::query(&format!(
        "SELECT {} FROM transfers WHERE transfer_id = ?",
        TRANSFER_COLUMNS
    ))
    .bind(*transfer_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| row_to_transfer(&row))
    .transpose()?
    .ok_or_else(|| TransferError::NotFound(format!("transfer {}", transfer_id)))
}

fn row_to_account(row: &SqliteRow) -> Result<Account, TransferError> {
    Ok(Account {
        account_id: AccountId(row.try_get("account_id")?),
        user_id: UserId(row.try_get("user_id")?),
        balance: Amount::from_minor_units(row.try_get("balance")?),
    })
}

fn row_to_transfer(row: &SqliteRow) -> Result<TransferRecord, TransferError> {
    let type_id: i64 = row.try_get("transfer_type")?;
    let status_id: i64 = row.try_get("transfer_status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(TransferRecord {
        transfer_id: TransferId(row.try_get("transfer_id")?),
        transfer_type: TransferType::from_id(type_id).ok_or_else(|| {
            TransferError::Unavailable(format!("unknown transfer type id {}", type_id))
        })?,
        status: TransferStatus::from_id(status_id).ok_or_else(|| {
            TransferError::Unavailable(format!("unknown transfer status id {}", status_id))
        })?,
        from: AccountId(row.try_get("account_from")?),
        to: AccountId(row.try_get("account_to")?),
        amount: Amount::from_minor_units(row.try_get("amount")?),
        created_at,
    })
}
