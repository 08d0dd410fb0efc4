//! # 集成测试辅助函数
#![allow(dead_code)]

use chrono::Utc;
use credit_ledger::config::DatabaseConfig;
use credit_ledger::database;
use entity::{ai_models, credit_transactions, users};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, NotSet, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::sync::{Arc, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 创建已迁移的内存数据库
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    init_test_env();
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    let db = database::init_database(&config).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Arc::new(db)
}

/// 创建已迁移的临时文件数据库，支持多连接并发
pub async fn create_temp_db() -> (Arc<DatabaseConnection>, TempDir) {
    init_test_env();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("ledger.db").display()),
        max_connections: 8,
        ..Default::default()
    };
    let db = database::init_database(&config).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    (Arc::new(db), temp_dir)
}

/// 插入一个带初始余额的用户
pub async fn seed_user(db: &DatabaseConnection, username: &str, balance: i64) -> i32 {
    let now = Utc::now().naive_utc();
    users::ActiveModel {
        id: NotSet,
        username: Set(username.to_string()),
        is_active: Set(true),
        is_admin: Set(false),
        credit_balance: Set(balance),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

/// 注册模型定价
pub async fn seed_model(db: &DatabaseConnection, provider: &str, model: &str, pricing: Value) {
    let now = Utc::now().naive_utc();
    ai_models::ActiveModel {
        id: NotSet,
        provider_slug: Set(provider.to_string()),
        model_slug: Set(model.to_string()),
        display_name: Set(None),
        pricing: Set(pricing),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();
}

/// 直接读取用户余额
pub async fn balance_of(db: &DatabaseConnection, user_id: i32) -> i64 {
    users::Entity::find_by_id(user_id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .credit_balance
}

/// 用户的全部交易
pub async fn transactions_of(db: &DatabaseConnection, user_id: i32) -> Vec<credit_transactions::Model> {
    use sea_orm::{ColumnTrait, QueryFilter};
    credit_transactions::Entity::find()
        .filter(credit_transactions::Column::UserId.eq(user_id))
        .all(db)
        .await
        .unwrap()
}

/// 把交易的创建时间往前拨，模拟泄漏的预扣
pub async fn backdate_transaction(db: &DatabaseConnection, transaction_id: &str, seconds: i64) {
    let tx = credit_transactions::Entity::find_by_id(transaction_id.to_string())
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let created_at = tx.created_at - chrono::Duration::seconds(seconds);
    let mut active: credit_transactions::ActiveModel = tx.into();
    active.created_at = Set(created_at);
    active.update(db).await.unwrap();
}
