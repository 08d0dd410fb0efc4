//! # 积分交易实体定义
//!
//! 每一次影响余额的事件对应一条记录。记录在预扣时创建，结算或退款时最多再变更一次，永不删除。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 积分交易实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_transactions")]
pub struct Model {
    /// 预扣时生成的 UUID，同时作为结算/退款的幂等键
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: Option<i32>,
    /// 带符号的余额变动，负数表示扣费
    pub delta: i64,
    /// pending | success | failed | refunded
    pub status: String,
    pub reason: String,
    pub provider_slug: Option<String>,
    pub model_slug: Option<String>,
    pub metadata: Option<Json>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 交易当前扣费的绝对值
    pub fn charged_amount(&self) -> i64 {
        self.delta.abs()
    }
}
