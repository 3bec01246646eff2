use serde::{Deserialize, Serialize};

use crate::domain::props::{AccountId, Amount, UserId};

/// A user's single balance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub balance: Amount,
}
