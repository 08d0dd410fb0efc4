//! # 计费调用编排
//!
//! 估价 → 预扣 → 外部调用（带超时，不在数据库事务内）→ 结算，前后由用量记录包裹。
//! 外部调用失败或超时时以 `failed` 结算且实际费用为 0，用户余额完全恢复。

use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::ledger::{Attribution, CreditLedger, Transaction, TransactionHandle, TransactionStatus};
use crate::logging::{LogComponent, LogStage};
use crate::pricing::{ModelCatalog, PricingConfig, UsageFacts};
use crate::types::{Credits, UserId, count_to_db, duration_ms_to_db};
use crate::usage::{
    DatabaseUsageRecorder, NoopUsageRecorder, UsagePatch, UsageRecorder, UsageStatus,
    record_completed, record_created,
};
use crate::{config_error, lerror, linfo, lwarn};

/// 一次计费调用的描述
#[derive(Debug, Clone)]
pub struct BilledRequest {
    pub request_id: String,
    pub user_id: UserId,
    /// 操作类型，如 `image.generate`，同时作为预扣原因的前缀
    pub kind: String,
    pub attribution: Attribution,
    /// 显式定价；为空时从模型目录按归属查找
    pub pricing: Option<PricingConfig>,
    /// 用于预扣估价的用量
    pub estimated_usage: UsageFacts,
    /// 覆盖默认的调用超时
    pub timeout: Option<Duration>,
}

impl BilledRequest {
    pub fn new(
        request_id: impl Into<String>,
        user_id: UserId,
        kind: impl Into<String>,
        attribution: Attribution,
        estimated_usage: UsageFacts,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id,
            kind: kind.into(),
            attribution,
            pricing: None,
            estimated_usage,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = Some(pricing);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn precharge_reason(&self) -> String {
        format!("{}.precharge", self.kind)
    }
}

/// 外部调用的成功结果，`usage` 为实际用量（未知时按预扣金额结算）
#[derive(Debug, Clone)]
pub struct OperationOutcome<T> {
    pub value: T,
    pub usage: Option<UsageFacts>,
}

impl<T> OperationOutcome<T> {
    pub const fn new(value: T) -> Self {
        Self { value, usage: None }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: UsageFacts) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// 计费调用成功的结果
#[derive(Debug, Clone)]
pub struct BilledOutcome<T> {
    pub value: T,
    pub transaction: Transaction,
    pub precharged: Credits,
    pub actual_cost: Credits,
}

/// 外部调用的失败原因
#[derive(Debug, Error)]
pub enum OperationFailure<E> {
    #[error(transparent)]
    Failed(E),
    #[error("外部调用超时: {0:?}")]
    Timeout(Duration),
}

/// 计费调用错误
#[derive(Debug, Error)]
pub enum BilledOperationError<E> {
    /// 估价、预扣或结算失败
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// 外部调用失败，预扣已按 `failed` 结算；结算本身失败时 `transaction` 为空
    #[error("{failure}")]
    Operation {
        #[source]
        failure: OperationFailure<E>,
        transaction: Option<Box<Transaction>>,
    },
}

impl<E> BilledOperationError<E> {
    /// 转换为HTTP状态码和错误代码
    pub fn to_http_response_parts(&self) -> (StatusCode, &str) {
        match self {
            Self::Ledger(err) => err.to_http_response_parts(),
            Self::Operation {
                failure: OperationFailure::Timeout(_),
                ..
            } => (StatusCode::GATEWAY_TIMEOUT, "OPERATION_TIMEOUT"),
            Self::Operation { .. } => (StatusCode::BAD_GATEWAY, "OPERATION_FAILED"),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Operation {
                failure: OperationFailure::Timeout(_),
                ..
            }
        )
    }

    #[must_use]
    pub fn settled_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Operation { transaction, .. } => transaction.as_deref(),
            Self::Ledger(_) => None,
        }
    }
}

/// 计费调用编排服务
#[derive(Clone)]
pub struct BillingService {
    ledger: CreditLedger,
    catalog: ModelCatalog,
    recorder: Arc<dyn UsageRecorder>,
    operation_timeout: Duration,
}

impl BillingService {
    pub fn new(
        ledger: CreditLedger,
        catalog: ModelCatalog,
        recorder: Arc<dyn UsageRecorder>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            catalog,
            recorder,
            operation_timeout,
        }
    }

    /// 按应用配置组装服务
    pub fn from_config(db: Arc<sea_orm::DatabaseConnection>, config: &AppConfig) -> Self {
        let recorder: Arc<dyn UsageRecorder> = if config.usage.enabled {
            Arc::new(DatabaseUsageRecorder::new(db.clone()))
        } else {
            Arc::new(NoopUsageRecorder)
        };
        Self::new(
            CreditLedger::new(db.clone()),
            ModelCatalog::new(db),
            recorder,
            config.ledger.operation_timeout(),
        )
    }

    #[must_use]
    pub const fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// 执行一次计费调用
    ///
    /// 预扣失败时 `operation` 不会被轮询。
    pub async fn run<T, E, F>(
        &self,
        request: BilledRequest,
        operation: F,
    ) -> Result<BilledOutcome<T>, BilledOperationError<E>>
    where
        F: Future<Output = Result<OperationOutcome<T>, E>>,
        E: std::fmt::Display,
    {
        let request_id = request.request_id.as_str();
        let pricing = self.resolve_pricing(&request).await?;
        let estimate = pricing.estimate(&request.estimated_usage)?;

        record_created(
            self.recorder.as_ref(),
            request_id,
            &request.kind,
            Some(request.user_id),
            Some(&request.attribution),
        )
        .await;

        let handle = match self
            .ledger
            .precharge_with_metadata(
                request.user_id,
                estimate,
                &request.precharge_reason(),
                Some(request.attribution.clone()),
                Some(json!({ "request_id": request_id, "estimate": estimate })),
            )
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                let mut patch = UsagePatch::new(UsageStatus::Failed);
                patch.error_message = Some(err.to_string());
                patch.cost = Some(0);
                record_completed(self.recorder.as_ref(), request_id, patch).await;
                return Err(err.into());
            }
        };

        let deadline = request.timeout.unwrap_or(self.operation_timeout);
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, operation).await;
        let duration_ms = duration_ms_to_db(started.elapsed());

        match result {
            Ok(Ok(outcome)) => {
                self.settle_success(&request, &pricing, &handle, outcome, duration_ms)
                    .await
            }
            Ok(Err(error)) => {
                self.settle_failure(
                    &request,
                    &handle,
                    OperationFailure::Failed(error),
                    duration_ms,
                )
                .await
            }
            Err(_) => {
                self.settle_failure(
                    &request,
                    &handle,
                    OperationFailure::Timeout(deadline),
                    duration_ms,
                )
                .await
            }
        }
    }

    async fn resolve_pricing(&self, request: &BilledRequest) -> crate::error::Result<PricingConfig> {
        if let Some(pricing) = &request.pricing {
            pricing.validate()?;
            return Ok(pricing.clone());
        }
        match (
            request.attribution.provider_slug.as_deref(),
            request.attribution.model_slug.as_deref(),
        ) {
            (Some(provider), Some(model)) => self.catalog.pricing_for(provider, model).await,
            _ => Err(config_error!("请求未指定定价，且缺少提供商/模型归属")),
        }
    }

    async fn settle_success<T, E>(
        &self,
        request: &BilledRequest,
        pricing: &PricingConfig,
        handle: &TransactionHandle,
        outcome: OperationOutcome<T>,
        duration_ms: i64,
    ) -> Result<BilledOutcome<T>, BilledOperationError<E>> {
        let request_id = request.request_id.as_str();
        let actual_cost = match &outcome.usage {
            Some(facts) => match pricing.estimate(facts) {
                Ok(cost) => cost,
                Err(err) => {
                    lwarn!(
                        request_id,
                        LogStage::Pricing,
                        LogComponent::Billing,
                        "actual_cost_fallback",
                        "实际用量无法计价，按预扣金额结算",
                        transaction_id = %handle.transaction_id,
                        error = %err
                    );
                    handle.amount
                }
            },
            None => handle.amount,
        };

        let mut metadata = Map::new();
        let (input_tokens, output_tokens) = outcome
            .usage
            .as_ref()
            .map_or((None, None), UsageFacts::token_counts);
        if let Some(facts) = &outcome.usage {
            metadata.insert("usage".to_string(), serde_json::to_value(facts).unwrap_or(Value::Null));
        }

        let mut patch = UsagePatch::new(UsageStatus::Success);
        patch.duration_ms = Some(duration_ms);
        patch.input_tokens = input_tokens.map(count_to_db);
        patch.output_tokens = output_tokens.map(count_to_db);

        let settled = self
            .ledger
            .settle(
                &handle.transaction_id,
                TransactionStatus::Success,
                Some(actual_cost),
                Some(metadata),
            )
            .await;

        match settled {
            Ok(transaction) => {
                patch.cost = Some(actual_cost);
                record_completed(self.recorder.as_ref(), request_id, patch).await;
                linfo!(
                    request_id,
                    LogStage::Settlement,
                    LogComponent::Billing,
                    "billed_success",
                    "计费调用完成",
                    transaction_id = %handle.transaction_id,
                    precharged = handle.amount,
                    actual_cost = actual_cost,
                    duration_ms = duration_ms
                );
                Ok(BilledOutcome {
                    value: outcome.value,
                    transaction,
                    precharged: handle.amount,
                    actual_cost,
                })
            }
            Err(err) => {
                lerror!(
                    request_id,
                    LogStage::Settlement,
                    LogComponent::Billing,
                    "settle_success_failed",
                    "外部调用成功但结算失败，交易保持 pending 等待对账",
                    transaction_id = %handle.transaction_id,
                    error = %err
                );
                patch.error_message = Some(err.to_string());
                record_completed(self.recorder.as_ref(), request_id, patch).await;
                Err(err.into())
            }
        }
    }

    async fn settle_failure<T, E>(
        &self,
        request: &BilledRequest,
        handle: &TransactionHandle,
        failure: OperationFailure<E>,
        duration_ms: i64,
    ) -> Result<BilledOutcome<T>, BilledOperationError<E>>
    where
        E: std::fmt::Display,
    {
        let request_id = request.request_id.as_str();
        let failure_message = failure.to_string();
        let timed_out = matches!(failure, OperationFailure::Timeout(_));

        lwarn!(
            request_id,
            LogStage::External,
            LogComponent::Billing,
            "operation_failed",
            "外部调用失败，释放预扣",
            transaction_id = %handle.transaction_id,
            timed_out = timed_out,
            error = %failure_message
        );

        let mut metadata = Map::new();
        metadata.insert("failure".to_string(), json!(failure_message));

        let transaction = match self
            .ledger
            .settle(
                &handle.transaction_id,
                TransactionStatus::Failed,
                Some(0),
                Some(metadata),
            )
            .await
        {
            Ok(transaction) => Some(Box::new(transaction)),
            Err(err) => {
                lerror!(
                    request_id,
                    LogStage::Settlement,
                    LogComponent::Billing,
                    "settle_failed_failed",
                    "失败结算未能写入，交易保持 pending 等待对账",
                    transaction_id = %handle.transaction_id,
                    error = %err
                );
                None
            }
        };

        let mut patch = UsagePatch::new(UsageStatus::Failed);
        patch.duration_ms = Some(duration_ms);
        patch.cost = Some(0);
        patch.error_message = Some(failure_message);
        record_completed(self.recorder.as_ref(), request_id, patch).await;

        Err(BilledOperationError::Operation {
            failure,
            transaction,
        })
    }
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("ledger", &self.ledger)
            .field("catalog", &self.catalog)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_http_mapping() {
        let timeout: BilledOperationError<std::io::Error> = BilledOperationError::Operation {
            failure: OperationFailure::Timeout(Duration::from_secs(5)),
            transaction: None,
        };
        assert_eq!(timeout.to_http_response_parts().0, StatusCode::GATEWAY_TIMEOUT);
        assert!(timeout.is_timeout());

        let failed: BilledOperationError<std::io::Error> = BilledOperationError::Operation {
            failure: OperationFailure::Failed(std::io::Error::other("upstream 500")),
            transaction: None,
        };
        assert_eq!(failed.to_http_response_parts().0, StatusCode::BAD_GATEWAY);
        assert_eq!(failed.to_string(), "upstream 500");

        let ledger: BilledOperationError<std::io::Error> =
            LedgerError::insufficient_balance(1, 60, 10).into();
        assert_eq!(ledger.to_http_response_parts().0, StatusCode::PAYMENT_REQUIRED);
        assert!(ledger.settled_transaction().is_none());
    }

    #[test]
    fn test_precharge_reason_uses_kind() {
        let request = BilledRequest::new(
            "req-1",
            1,
            "image.generate",
            Attribution::new("openai", "gpt-image-1"),
            UsageFacts::tokens(0, 0),
        );
        assert_eq!(request.precharge_reason(), "image.generate.precharge");
    }
}
