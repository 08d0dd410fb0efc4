//! # 退款

use entity::credit_transactions;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde_json::{Map, json};

use super::store::{self, StatusGuard};
use super::{CreditLedger, Transaction, TransactionStatus};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

impl CreditLedger {
    /// 按交易当前的 `delta` 反向冲正余额
    ///
    /// 扣费交易退还扣掉的积分，管理员入账交易则收回入账的积分；收回时余额不足返回
    /// `InsufficientBalance`，交易保持原状态。已退款的交易再次退款不做任何改动。
    pub async fn refund(&self, transaction_id: &str, reason: Option<&str>) -> Result<Transaction> {
        let (transaction, _) = self
            .refund_guarded(
                transaction_id,
                reason,
                StatusGuard::TransitionAllowed,
            )
            .await?;
        Ok(transaction)
    }

    /// 仅当交易仍为 `pending` 时退款，返回记录以及是否真正退款
    pub(super) async fn refund_if_pending(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> Result<(Transaction, bool)> {
        self.refund_guarded(
            transaction_id,
            Some(reason),
            StatusGuard::Is(TransactionStatus::Pending),
        )
        .await
    }

    async fn refund_guarded(
        &self,
        transaction_id: &str,
        reason: Option<&str>,
        guard: StatusGuard,
    ) -> Result<(Transaction, bool)> {
        let txn = self.db().begin().await?;

        let claimed = store::claim_status(
            &txn,
            transaction_id,
            guard,
            TransactionStatus::Refunded,
        )
        .await?;

        if !claimed {
            let existing = store::load_transaction(&txn, transaction_id).await;
            txn.rollback().await?;
            let existing = existing?;
            let current = store::current_status(&existing)?;
            let message = if current.is_terminal() {
                "交易已退款，忽略重复退款"
            } else {
                "交易已离开 pending，跳过退款"
            };
            ldebug!(
                transaction_id,
                LogStage::Refund,
                LogComponent::Ledger,
                "refund_noop",
                message,
                current_status = %current
            );
            return Ok((existing, false));
        }

        let claimed_tx = store::load_transaction(&txn, transaction_id).await?;
        let refunded = -claimed_tx.delta;

        if let Some(user_id) = claimed_tx.user_id {
            if refunded > 0 {
                store::apply_delta(&txn, user_id, refunded).await?;
            } else if refunded < 0
                && !store::debit_if_sufficient(&txn, user_id, claimed_tx.delta).await?
            {
                let rejection = store::debit_rejection(&txn, user_id, claimed_tx.delta).await;
                txn.rollback().await?;
                lwarn!(
                    transaction_id,
                    LogStage::Refund,
                    LogComponent::Ledger,
                    "refund_rejected",
                    &rejection,
                    user_id = user_id,
                    refunded = refunded
                );
                return Err(rejection);
            }
        }

        let mut patch = Map::new();
        patch.insert("refunded_amount".to_string(), json!(refunded));
        if let Some(reason) = reason {
            patch.insert("refund_reason".to_string(), json!(reason));
        }

        let mut active: credit_transactions::ActiveModel = claimed_tx.clone().into();
        active.metadata = Set(store::merge_metadata(claimed_tx.metadata, patch));
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        linfo!(
            transaction_id,
            LogStage::Refund,
            LogComponent::Ledger,
            "refund",
            "交易退款完成",
            user_id = ?updated.user_id,
            refunded = refunded,
            reason = ?reason
        );

        Ok((updated, true))
    }
}
