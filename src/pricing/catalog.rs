//! # 模型定价目录
//!
//! 从 `ai_models` 表加载模型的定价配置

use chrono::Utc;
use entity::ai_models::{self, Entity as AiModels};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, Set,
};
use serde_json::Value;
use std::sync::Arc;

use super::PricingConfig;
use crate::error::{Context, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{config_error, ldebug, linfo};

/// 模型定价目录
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    db: Arc<DatabaseConnection>,
}

impl ModelCatalog {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 获取启用模型的定价配置
    pub async fn pricing_for(&self, provider_slug: &str, model_slug: &str) -> Result<PricingConfig> {
        let model = AiModels::find()
            .filter(ai_models::Column::ProviderSlug.eq(provider_slug))
            .filter(ai_models::Column::ModelSlug.eq(model_slug))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| config_error!("模型未配置定价: {}/{}", provider_slug, model_slug))?;

        if !model.is_active {
            return Err(config_error!("模型已停用: {}/{}", provider_slug, model_slug));
        }

        let pricing = PricingConfig::from_value(Some(&model.pricing))
            .with_context(|| format!("模型 {provider_slug}/{model_slug} 的定价配置无效"))?;

        ldebug!(
            "system",
            LogStage::Pricing,
            LogComponent::Pricing,
            "pricing_loaded",
            "加载模型定价",
            provider = provider_slug,
            model = model_slug,
            unit = pricing.unit()
        );

        Ok(pricing)
    }

    /// 注册或替换模型定价，写入前先校验配置
    pub async fn upsert_model(
        &self,
        provider_slug: &str,
        model_slug: &str,
        display_name: Option<String>,
        pricing: &Value,
    ) -> Result<ai_models::Model> {
        let parsed = PricingConfig::from_value(Some(pricing))?;
        let now = Utc::now().naive_utc();

        let existing = AiModels::find()
            .filter(ai_models::Column::ProviderSlug.eq(provider_slug))
            .filter(ai_models::Column::ModelSlug.eq(model_slug))
            .one(self.db.as_ref())
            .await?;

        let model = if let Some(existing) = existing {
            let mut active: ai_models::ActiveModel = existing.into();
            active.pricing = Set(pricing.clone());
            if display_name.is_some() {
                active.display_name = Set(display_name);
            }
            active.is_active = Set(true);
            active.updated_at = Set(now);
            active.update(self.db.as_ref()).await?
        } else {
            ai_models::ActiveModel {
                id: NotSet,
                provider_slug: Set(provider_slug.to_string()),
                model_slug: Set(model_slug.to_string()),
                display_name: Set(display_name),
                pricing: Set(pricing.clone()),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.db.as_ref())
            .await?
        };

        linfo!(
            "system",
            LogStage::Pricing,
            LogComponent::Pricing,
            "pricing_upserted",
            "模型定价已更新",
            provider = provider_slug,
            model = model_slug,
            unit = parsed.unit()
        );

        Ok(model)
    }
}
