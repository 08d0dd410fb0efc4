//! # 管理员调整

use entity::credit_transactions;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde_json::json;
use uuid::Uuid;

use super::store;
use super::{CreditLedger, Transaction, TransactionStatus};
use crate::ensure_amount;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::types::{AdminId, Credits, UserId};
use crate::{linfo, lwarn};

/// 管理员调整交易的 `reason`
pub const ADMIN_ADJUSTMENT_REASON: &str = "admin.adjustment";

impl CreditLedger {
    /// 直接增减用户余额，同时写入一条 `success` 交易
    ///
    /// 扣减时与预扣一样做余额下限检查，余额不足时不产生任何写入。
    /// 入账使余额超出 `i64` 范围时返回 `InvalidAmount`，同样不产生写入。
    pub async fn admin_adjust(
        &self,
        admin_id: AdminId,
        user_id: UserId,
        amount: Credits,
        reason: &str,
    ) -> Result<Transaction> {
        ensure_amount!(amount != 0, amount, "调整金额不能为零");

        let txn = self.db().begin().await?;

        let applied = if amount < 0 {
            // i64::MIN 没有对应的正数，任何余额都不够扣
            match amount.checked_neg() {
                Some(debit) => store::debit_if_sufficient(&txn, user_id, debit).await?,
                None => false,
            }
        } else {
            store::credit_within_limit(&txn, user_id, amount).await?
        };

        if !applied {
            let rejection = if amount < 0 {
                let required = amount.checked_neg().unwrap_or(Credits::MAX);
                store::debit_rejection(&txn, user_id, required).await
            } else {
                store::credit_rejection(&txn, user_id, amount).await
            };
            txn.rollback().await?;
            lwarn!(
                "system",
                LogStage::Adjustment,
                LogComponent::Ledger,
                "admin_adjust_rejected",
                &rejection,
                admin_id = admin_id,
                user_id = user_id,
                amount = amount
            );
            return Err(rejection);
        }

        let balance_after = store::load_user(&txn, user_id).await?.credit_balance;
        let now = store::now();

        let transaction = credit_transactions::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(Some(user_id)),
            delta: Set(amount),
            status: Set(TransactionStatus::Success.as_str().to_string()),
            reason: Set(ADMIN_ADJUSTMENT_REASON.to_string()),
            provider_slug: Set(None),
            model_slug: Set(None),
            metadata: Set(Some(json!({
                "admin_id": admin_id,
                "adjustment_reason": reason,
            }))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        linfo!(
            &transaction.id,
            LogStage::Adjustment,
            LogComponent::Ledger,
            "admin_adjust",
            "管理员调整余额",
            admin_id = admin_id,
            user_id = user_id,
            amount = amount,
            balance_after = balance_after
        );

        Ok(transaction)
    }
}
