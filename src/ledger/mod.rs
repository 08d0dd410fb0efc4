//! # 积分账本
//!
//! 预扣、结算、退款与管理员调整。余额只存在于 `users` 行中，所有变更都在一个数据库事务内
//! 同时写入余额与交易记录，事务的第一条语句总是写操作（条件扣减或状态 CAS）。

mod admin;
mod precharge;
mod query;
mod reconcile;
mod refund;
mod settlement;
mod status;
mod store;

pub use admin::ADMIN_ADJUSTMENT_REASON;
pub use reconcile::{RECONCILE_REFUND_REASON, ReconciliationReport};
pub use status::{TransactionStatus, UnknownStatus};

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Credits;

/// 持久化的交易记录
pub type Transaction = entity::credit_transactions::Model;

/// 交易的提供商/模型归属
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub provider_slug: Option<String>,
    pub model_slug: Option<String>,
}

impl Attribution {
    pub fn new(provider_slug: impl Into<String>, model_slug: impl Into<String>) -> Self {
        Self {
            provider_slug: Some(provider_slug.into()),
            model_slug: Some(model_slug.into()),
        }
    }
}

/// 预扣成功后返回的句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionHandle {
    pub transaction_id: String,
    pub amount: Credits,
    pub balance_after: Credits,
}

/// 积分账本
#[derive(Debug, Clone)]
pub struct CreditLedger {
    db: Arc<DatabaseConnection>,
}

impl CreditLedger {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
