//! # 用量记录
//!
//! 外部调用的遥测记录：调用开始时立即写入 `pending` 记录，调用结束后按 `request_id` 更新。
//! 记录失败只写日志，不影响账本与调用结果。

use async_trait::async_trait;
use entity::usage_records;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{LedgerError, Result};
use crate::ledger::Attribution;
use crate::logging::{LogComponent, LogStage};
use crate::types::{Credits, UserId};
use crate::{ldebug, lwarn};

/// 用量记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Pending,
    Success,
    Failed,
}

impl UsageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用结束后写入的字段，`None` 表示保持原值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePatch {
    pub status: UsageStatus,
    pub duration_ms: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cost: Option<Credits>,
    pub error_message: Option<String>,
    pub attribution: Option<Attribution>,
}

impl UsagePatch {
    #[must_use]
    pub const fn new(status: UsageStatus) -> Self {
        Self {
            status,
            duration_ms: None,
            input_tokens: None,
            output_tokens: None,
            cost: None,
            error_message: None,
            attribution: None,
        }
    }
}

/// 用量记录器
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// 创建 `pending` 记录
    async fn create(
        &self,
        request_id: &str,
        kind: &str,
        user_id: Option<UserId>,
        attribution: Option<&Attribution>,
    ) -> Result<()>;

    /// 按 `request_id` 更新记录
    async fn update(&self, request_id: &str, patch: UsagePatch) -> Result<()>;
}

/// 基于 `usage_records` 表的记录器
#[derive(Debug, Clone)]
pub struct DatabaseUsageRecorder {
    db: Arc<DatabaseConnection>,
}

impl DatabaseUsageRecorder {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageRecorder for DatabaseUsageRecorder {
    async fn create(
        &self,
        request_id: &str,
        kind: &str,
        user_id: Option<UserId>,
        attribution: Option<&Attribution>,
    ) -> Result<()> {
        let now = chrono::Utc::now().naive_utc();
        let attribution = attribution.cloned().unwrap_or_default();

        let record = usage_records::ActiveModel {
            id: NotSet,
            request_id: Set(request_id.to_string()),
            kind: Set(kind.to_string()),
            status: Set(UsageStatus::Pending.as_str().to_string()),
            user_id: Set(user_id),
            provider_slug: Set(attribution.provider_slug),
            model_slug: Set(attribution.model_slug),
            duration_ms: Set(None),
            input_tokens: Set(None),
            output_tokens: Set(None),
            cost: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = usage_records::Entity::insert(record)
            .exec(self.db.as_ref())
            .await?;

        ldebug!(
            request_id,
            LogStage::External,
            LogComponent::Usage,
            "usage_created",
            "创建用量记录",
            record_id = inserted.last_insert_id,
            kind = kind
        );

        Ok(())
    }

    async fn update(&self, request_id: &str, patch: UsagePatch) -> Result<()> {
        let mut update_model = usage_records::ActiveModel {
            status: Set(patch.status.as_str().to_string()),
            updated_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        if let Some(duration_ms) = patch.duration_ms {
            update_model.duration_ms = Set(Some(duration_ms));
        }
        if let Some(input_tokens) = patch.input_tokens {
            update_model.input_tokens = Set(Some(input_tokens));
        }
        if let Some(output_tokens) = patch.output_tokens {
            update_model.output_tokens = Set(Some(output_tokens));
        }
        if let Some(cost) = patch.cost {
            update_model.cost = Set(Some(cost));
        }
        if let Some(error_message) = patch.error_message {
            update_model.error_message = Set(Some(error_message));
        }
        if let Some(attribution) = patch.attribution {
            if let Some(provider_slug) = attribution.provider_slug {
                update_model.provider_slug = Set(Some(provider_slug));
            }
            if let Some(model_slug) = attribution.model_slug {
                update_model.model_slug = Set(Some(model_slug));
            }
        }

        let result = usage_records::Entity::update_many()
            .filter(usage_records::Column::RequestId.eq(request_id))
            .set(update_model)
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(LedgerError::database(format!(
                "用量记录不存在: {request_id}"
            )));
        }

        ldebug!(
            request_id,
            LogStage::External,
            LogComponent::Usage,
            "usage_updated",
            "更新用量记录",
            status = %patch.status
        );

        Ok(())
    }
}

/// 不做任何记录的实现
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageRecorder;

#[async_trait]
impl UsageRecorder for NoopUsageRecorder {
    async fn create(
        &self,
        _request_id: &str,
        _kind: &str,
        _user_id: Option<UserId>,
        _attribution: Option<&Attribution>,
    ) -> Result<()> {
        Ok(())
    }

    async fn update(&self, _request_id: &str, _patch: UsagePatch) -> Result<()> {
        Ok(())
    }
}

/// 创建用量记录，失败时只记录警告
pub async fn record_created(
    recorder: &dyn UsageRecorder,
    request_id: &str,
    kind: &str,
    user_id: Option<UserId>,
    attribution: Option<&Attribution>,
) {
    if let Err(err) = recorder.create(request_id, kind, user_id, attribution).await {
        lwarn!(
            request_id,
            LogStage::External,
            LogComponent::Usage,
            "usage_create_failed",
            "创建用量记录失败，已忽略",
            error = %err
        );
    }
}

/// 更新用量记录，失败时只记录警告
pub async fn record_completed(recorder: &dyn UsageRecorder, request_id: &str, patch: UsagePatch) {
    if let Err(err) = recorder.update(request_id, patch).await {
        lwarn!(
            request_id,
            LogStage::External,
            LogComponent::Usage,
            "usage_update_failed",
            "更新用量记录失败，已忽略",
            error = %err
        );
    }
}
