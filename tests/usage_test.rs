//! # 用量记录集成测试

mod common;

use common::*;
use credit_ledger::ledger::Attribution;
use credit_ledger::usage::{DatabaseUsageRecorder, UsagePatch, UsageRecorder, UsageStatus};
use entity::usage_records;
use pretty_assertions::assert_eq;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

#[tokio::test]
async fn test_create_then_update_by_request_id() {
    let db = create_test_db().await;
    let user_id = seed_user(&db, "ivan", 100).await;
    let recorder = DatabaseUsageRecorder::new(db.clone());
    let attribution = Attribution::new("openai", "gpt-4o");

    recorder
        .create("req-usage", "chat", Some(user_id), Some(&attribution))
        .await
        .unwrap();

    let mut patch = UsagePatch::new(UsageStatus::Success);
    patch.duration_ms = Some(1200);
    patch.input_tokens = Some(300);
    patch.output_tokens = Some(120);
    patch.cost = Some(7);
    recorder.update("req-usage", patch).await.unwrap();

    let record = usage_records::Entity::find()
        .filter(usage_records::Column::RequestId.eq("req-usage"))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.status, "success");
    assert_eq!(record.user_id, Some(user_id));
    assert_eq!(record.provider_slug.as_deref(), Some("openai"));
    assert_eq!(record.model_slug.as_deref(), Some("gpt-4o"));
    assert_eq!(record.duration_ms, Some(1200));
    assert_eq!(record.total_tokens(), 420);
    assert_eq!(record.cost, Some(7));
    assert_eq!(record.error_message, None);
}

#[tokio::test]
async fn test_update_unknown_request_is_error() {
    let db = create_test_db().await;
    let recorder = DatabaseUsageRecorder::new(db);

    let result = recorder
        .update("req-missing", UsagePatch::new(UsageStatus::Failed))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_duplicate_request_id_is_error() {
    let db = create_test_db().await;
    let recorder = DatabaseUsageRecorder::new(db);

    recorder.create("req-dup", "chat", None, None).await.unwrap();
    assert!(recorder.create("req-dup", "chat", None, None).await.is_err());
}
