//! # 计费调用编排测试
//!
//! 估价 → 预扣 → 外部调用 → 结算的端到端行为，以及用量记录的旁路写入

mod common;

use async_trait::async_trait;
use common::*;
use credit_ledger::billing::{
    BilledOperationError, BilledRequest, BillingService, OperationFailure, OperationOutcome,
};
use credit_ledger::ledger::{Attribution, CreditLedger};
use credit_ledger::pricing::{ImageMode, ModelCatalog, PricingConfig, UsageFacts};
use credit_ledger::usage::{DatabaseUsageRecorder, UsagePatch, UsageRecorder};
use credit_ledger::LedgerError;
use entity::usage_records;
use pretty_assertions::assert_eq;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PROVIDER: &str = "openai";
const MODEL: &str = "gpt-image-1";

async fn setup(balance: i64) -> (Arc<DatabaseConnection>, BillingService, i32) {
    let db = create_test_db().await;
    let user_id = seed_user(&db, "erin", balance).await;
    seed_model(&db, PROVIDER, MODEL, json!({ "unit": "image", "base": 60 })).await;
    let service = BillingService::new(
        CreditLedger::new(db.clone()),
        ModelCatalog::new(db.clone()),
        Arc::new(DatabaseUsageRecorder::new(db.clone())),
        Duration::from_secs(5),
    );
    (db, service, user_id)
}

fn image_request(request_id: &str, user_id: i32) -> BilledRequest {
    BilledRequest::new(
        request_id,
        user_id,
        "image.generate",
        Attribution::new(PROVIDER, MODEL),
        UsageFacts::images(1, "512x512", ImageMode::Generate),
    )
}

async fn usage_record(db: &DatabaseConnection, request_id: &str) -> usage_records::Model {
    usage_records::Entity::find()
        .filter(usage_records::Column::RequestId.eq(request_id))
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_successful_image_generation_settles_estimate() {
    let (db, service, user_id) = setup(500).await;

    let outcome = service
        .run(image_request("req-ok", user_id), async {
            Ok::<_, std::io::Error>(OperationOutcome::new("https://cdn/image.png"))
        })
        .await
        .unwrap();

    assert_eq!(outcome.value, "https://cdn/image.png");
    assert_eq!(outcome.precharged, 60);
    assert_eq!(outcome.actual_cost, 60);
    assert_eq!(outcome.transaction.delta, -60);
    assert_eq!(outcome.transaction.status, "success");
    assert_eq!(outcome.transaction.reason, "image.generate.precharge");
    assert_eq!(balance_of(&db, user_id).await, 440);

    let record = usage_record(&db, "req-ok").await;
    assert_eq!(record.status, "success");
    assert_eq!(record.cost, Some(60));
    assert_eq!(record.kind, "image.generate");
    assert!(record.duration_ms.is_some());
}

#[tokio::test]
async fn test_failed_image_generation_restores_balance() {
    let (db, service, user_id) = setup(500).await;

    let err = service
        .run(image_request("req-fail", user_id), async {
            Err::<OperationOutcome<()>, _>(std::io::Error::other("provider returned 500"))
        })
        .await
        .unwrap_err();

    match &err {
        BilledOperationError::Operation {
            failure: OperationFailure::Failed(inner),
            transaction: Some(transaction),
        } => {
            assert_eq!(inner.to_string(), "provider returned 500");
            assert_eq!(transaction.status, "failed");
            assert_eq!(transaction.delta, 0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(balance_of(&db, user_id).await, 500);

    let record = usage_record(&db, "req-fail").await;
    assert_eq!(record.status, "failed");
    assert_eq!(record.error_message.as_deref(), Some("provider returned 500"));
}

#[tokio::test]
async fn test_timeout_is_treated_as_failure() {
    let (db, service, user_id) = setup(500).await;
    let request = image_request("req-slow", user_id).with_timeout(Duration::from_millis(50));

    let err = service
        .run(request, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, std::io::Error>(OperationOutcome::new(()))
        })
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.settled_transaction().unwrap().status, "failed");
    assert_eq!(balance_of(&db, user_id).await, 500);
}

#[tokio::test]
async fn test_insufficient_balance_never_polls_operation() {
    let (db, service, user_id) = setup(50).await;
    let polled = Arc::new(AtomicBool::new(false));
    let flag = polled.clone();

    let err = service
        .run(image_request("req-poor", user_id), async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, std::io::Error>(OperationOutcome::new(()))
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BilledOperationError::Ledger(LedgerError::InsufficientBalance { .. })
    ));
    assert_eq!(err.to_http_response_parts().0.as_u16(), 402);
    assert!(!polled.load(Ordering::SeqCst));
    assert_eq!(balance_of(&db, user_id).await, 50);
    assert!(transactions_of(&db, user_id).await.is_empty());
}

#[tokio::test]
async fn test_realized_token_usage_adjusts_cost() {
    let (db, service, user_id) = setup(500).await;
    let pricing = PricingConfig::from_value(Some(&json!({
        "unit": "token",
        "input_per_k": 10,
        "output_per_k": 30,
        "minimum": 1
    })))
    .unwrap();
    let request = BilledRequest::new(
        "req-chat",
        user_id,
        "chat",
        Attribution::new(PROVIDER, "gpt-4o"),
        UsageFacts::tokens(1000, 2000),
    )
    .with_pricing(pricing);

    let outcome = service
        .run(request, async {
            Ok::<_, std::io::Error>(
                OperationOutcome::new("hello").with_usage(UsageFacts::tokens(1000, 500)),
            )
        })
        .await
        .unwrap();

    assert_eq!(outcome.precharged, 70);
    assert_eq!(outcome.actual_cost, 25);
    assert_eq!(balance_of(&db, user_id).await, 475);

    let record = usage_record(&db, "req-chat").await;
    assert_eq!(record.input_tokens, Some(1000));
    assert_eq!(record.output_tokens, Some(500));
    assert_eq!(record.total_tokens(), 1500);
}

#[tokio::test]
async fn test_unpriced_model_aborts_before_mutation() {
    let (db, service, user_id) = setup(500).await;
    let request = BilledRequest::new(
        "req-unknown",
        user_id,
        "image.generate",
        Attribution::new(PROVIDER, "dall-e-9"),
        UsageFacts::images(1, "512x512", ImageMode::Generate),
    );

    let err = service
        .run(request, async { Ok::<_, std::io::Error>(OperationOutcome::new(())) })
        .await
        .unwrap_err();

    assert!(matches!(err, BilledOperationError::Ledger(LedgerError::Config { .. })));
    assert_eq!(balance_of(&db, user_id).await, 500);
}

struct BrokenRecorder;

#[async_trait]
impl UsageRecorder for BrokenRecorder {
    async fn create(
        &self,
        _request_id: &str,
        _kind: &str,
        _user_id: Option<i32>,
        _attribution: Option<&Attribution>,
    ) -> credit_ledger::Result<()> {
        Err(LedgerError::database("usage 表不可用"))
    }

    async fn update(&self, _request_id: &str, _patch: UsagePatch) -> credit_ledger::Result<()> {
        Err(LedgerError::database("usage 表不可用"))
    }
}

#[tokio::test]
async fn test_usage_failures_do_not_affect_billing() {
    let db = create_test_db().await;
    let user_id = seed_user(&db, "frank", 500).await;
    seed_model(&db, PROVIDER, MODEL, json!({ "unit": "image", "base": 60 })).await;
    let service = BillingService::new(
        CreditLedger::new(db.clone()),
        ModelCatalog::new(db.clone()),
        Arc::new(BrokenRecorder),
        Duration::from_secs(5),
    );

    let outcome = service
        .run(image_request("req-broken-usage", user_id), async {
            Ok::<_, std::io::Error>(OperationOutcome::new(()))
        })
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, "success");
    assert_eq!(balance_of(&db, user_id).await, 440);
}
