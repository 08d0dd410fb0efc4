//! # 结算
//!
//! 把 `pending` 交易迁移到 `success` 或 `failed`，并按实际费用调整余额。

use entity::credit_transactions;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde_json::{Map, Value, json};

use super::store::{self, StatusGuard};
use super::{CreditLedger, Transaction, TransactionStatus};
use crate::ensure_amount;
use crate::error::{LedgerError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::types::Credits;
use crate::{ldebug, linfo, lwarn};

impl CreditLedger {
    /// 结算一笔预扣交易
    ///
    /// 只有第一次结算生效，重复调用返回已有记录且不再改动余额。
    /// `actual_cost` 为空时只更新状态，预扣金额保持不变。
    pub async fn settle(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        actual_cost: Option<Credits>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Transaction> {
        if !status.is_settlement_outcome() {
            return Err(LedgerError::InvalidTransition {
                transaction_id: transaction_id.to_string(),
                from: TransactionStatus::Pending,
                to: status,
            });
        }
        if let Some(cost) = actual_cost {
            ensure_amount!(cost >= 0, cost, "实际费用不能为负数");
        }

        let txn = self.db().begin().await?;

        let claimed = store::claim_status(
            &txn,
            transaction_id,
            StatusGuard::TransitionAllowed,
            status,
        )
        .await?;

        if !claimed {
            let existing = store::load_transaction(&txn, transaction_id).await;
            txn.rollback().await?;
            let existing = existing?;
            let current = store::current_status(&existing)?;
            ldebug!(
                transaction_id,
                LogStage::Settlement,
                LogComponent::Ledger,
                "settle_noop",
                "交易已结算，忽略重复结算",
                current_status = %current,
                requested_status = %status
            );
            return Ok(existing);
        }

        let claimed_tx = store::load_transaction(&txn, transaction_id).await?;
        let precharged = claimed_tx.charged_amount();
        let mut patch = metadata.unwrap_or_default();
        let mut delta = claimed_tx.delta;
        let mut balance_after = None;

        if let (Some(cost), Some(user_id)) = (actual_cost, claimed_tx.user_id) {
            let adjustment = precharged - cost;
            if adjustment != 0 {
                store::apply_delta(&txn, user_id, adjustment).await?;
            }
            let balance = store::load_user(&txn, user_id).await?.credit_balance;
            if balance < 0 {
                patch.insert("overdraft".to_string(), json!(true));
                lwarn!(
                    transaction_id,
                    LogStage::Settlement,
                    LogComponent::Ledger,
                    "settle_overdraft",
                    "结算后余额为负",
                    user_id = user_id,
                    precharged = precharged,
                    actual_cost = cost,
                    balance_after = balance
                );
            }
            delta = -cost;
            balance_after = Some(balance);
        }

        let mut active: credit_transactions::ActiveModel = claimed_tx.clone().into();
        active.delta = Set(delta);
        active.metadata = Set(store::merge_metadata(claimed_tx.metadata, patch));
        let settled = active.update(&txn).await?;

        txn.commit().await?;

        linfo!(
            transaction_id,
            LogStage::Settlement,
            LogComponent::Ledger,
            "settle",
            "交易结算完成",
            status = %status,
            precharged = precharged,
            actual_cost = ?actual_cost,
            balance_after = ?balance_after
        );

        Ok(settled)
    }
}
