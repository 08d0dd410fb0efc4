//! # 余额与交易查询

use entity::credit_transactions;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use super::store;
use super::{CreditLedger, Transaction};
use crate::error::Result;
use crate::types::{Credits, UserId};

impl CreditLedger {
    pub async fn balance(&self, user_id: UserId) -> Result<Credits> {
        Ok(store::load_user(self.db(), user_id).await?.credit_balance)
    }

    pub async fn transaction(&self, transaction_id: &str) -> Result<Transaction> {
        store::load_transaction(self.db(), transaction_id).await
    }

    /// 用户的交易历史，最新的在前
    pub async fn list_transactions(&self, user_id: UserId, limit: u64) -> Result<Vec<Transaction>> {
        store::load_user(self.db(), user_id).await?;

        let transactions = credit_transactions::Entity::find()
            .filter(credit_transactions::Column::UserId.eq(user_id))
            .order_by_desc(credit_transactions::Column::CreatedAt)
            .order_by_desc(credit_transactions::Column::Id)
            .limit(limit)
            .all(self.db())
            .await?;

        Ok(transactions)
    }
}
