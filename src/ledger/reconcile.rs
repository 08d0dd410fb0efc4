//! # 过期预扣对账
//!
//! 超过 TTL 仍处于 `pending` 的交易视为泄漏的预扣，通过幂等退款释放。

use chrono::Duration as ChronoDuration;
use entity::credit_transactions;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::time::Duration;

use super::store;
use super::{CreditLedger, Transaction, TransactionStatus};
use crate::error::{LedgerError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo};

/// 对账退款使用的原因
pub const RECONCILE_REFUND_REASON: &str = "reconcile.stale_pending";

/// 一次对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    pub released: usize,
    /// 扫描后已被结算或退款的交易
    pub skipped: usize,
    pub failed: usize,
}

impl CreditLedger {
    /// 查找早于 `ttl` 的 `pending` 交易，最旧的在前
    pub async fn find_stale_pending(&self, ttl: Duration) -> Result<Vec<Transaction>> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| LedgerError::config_with_source("对账 TTL 超出范围", e))?;
        let cutoff = store::now() - ttl;

        let stale = credit_transactions::Entity::find()
            .filter(credit_transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
            .filter(credit_transactions::Column::CreatedAt.lt(cutoff))
            .order_by_asc(credit_transactions::Column::CreatedAt)
            .all(self.db())
            .await?;

        Ok(stale)
    }

    /// 退还全部过期预扣，单笔失败只计数不中断
    pub async fn release_stale_pending(&self, ttl: Duration) -> Result<ReconciliationReport> {
        let stale = self.find_stale_pending(ttl).await?;
        let mut report = ReconciliationReport {
            scanned: stale.len(),
            ..ReconciliationReport::default()
        };

        for transaction in stale {
            match self
                .refund_if_pending(&transaction.id, RECONCILE_REFUND_REASON)
                .await
            {
                Ok((_, true)) => report.released += 1,
                Ok((_, false)) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    lerror!(
                        &transaction.id,
                        LogStage::Reconcile,
                        LogComponent::Ledger,
                        "release_failed",
                        "释放过期预扣失败",
                        user_id = ?transaction.user_id,
                        error = %err
                    );
                }
            }
        }

        linfo!(
            "system",
            LogStage::Reconcile,
            LogComponent::Ledger,
            "reconcile",
            "过期预扣对账完成",
            ttl_secs = ttl.as_secs(),
            scanned = report.scanned,
            released = report.released,
            skipped = report.skipped,
            failed = report.failed
        );

        Ok(report)
    }
}
