//! # 预扣

use entity::credit_transactions;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde_json::Value;
use uuid::Uuid;

use super::store;
use super::{Attribution, CreditLedger, TransactionHandle, TransactionStatus};
use crate::ensure_amount;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::types::{Credits, UserId};
use crate::{ldebug, linfo};

impl CreditLedger {
    /// 预扣积分并创建一条 `pending` 交易
    ///
    /// 条件扣减是并发预扣的串行化点：余额不足时不会产生任何写入。
    pub async fn precharge(
        &self,
        user_id: UserId,
        amount: Credits,
        reason: &str,
        attribution: Option<Attribution>,
    ) -> Result<TransactionHandle> {
        self.precharge_with_metadata(user_id, amount, reason, attribution, None)
            .await
    }

    /// 预扣并附带初始元数据（如 `request_id`、估算依据）
    pub async fn precharge_with_metadata(
        &self,
        user_id: UserId,
        amount: Credits,
        reason: &str,
        attribution: Option<Attribution>,
        metadata: Option<Value>,
    ) -> Result<TransactionHandle> {
        ensure_amount!(amount > 0, amount, "预扣金额必须为正数");

        let txn = self.db().begin().await?;

        if !store::debit_if_sufficient(&txn, user_id, amount).await? {
            let rejection = store::debit_rejection(&txn, user_id, amount).await;
            txn.rollback().await?;
            ldebug!(
                "system",
                LogStage::Precharge,
                LogComponent::Ledger,
                "precharge_rejected",
                &rejection,
                user_id = user_id,
                amount = amount
            );
            return Err(rejection);
        }

        let balance_after = store::load_user(&txn, user_id).await?.credit_balance;
        let transaction_id = Uuid::new_v4().to_string();
        let now = store::now();
        let attribution = attribution.unwrap_or_default();

        credit_transactions::ActiveModel {
            id: Set(transaction_id.clone()),
            user_id: Set(Some(user_id)),
            delta: Set(-amount),
            status: Set(TransactionStatus::Pending.as_str().to_string()),
            reason: Set(reason.to_string()),
            provider_slug: Set(attribution.provider_slug),
            model_slug: Set(attribution.model_slug),
            metadata: Set(metadata),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        linfo!(
            &transaction_id,
            LogStage::Precharge,
            LogComponent::Ledger,
            "precharge",
            "积分预扣成功",
            user_id = user_id,
            amount = amount,
            balance_after = balance_after,
            reason = reason
        );

        Ok(TransactionHandle {
            transaction_id,
            amount,
            balance_after,
        })
    }
}
