//! # AI模型实体定义
//!
//! 每个提供商模型的定价配置。`pricing` 字段保存原始 JSON，由 `pricing` 模块在边界处解析。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// AI模型实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ai_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 提供商标识
    pub provider_slug: String,
    /// 模型标识
    pub model_slug: String,
    pub display_name: Option<String>,
    /// 定价配置（按 `unit` 区分 token / image）
    pub pricing: Json,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
