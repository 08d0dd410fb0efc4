//! # 计费估算与定价目录测试

mod common;

use common::*;
use credit_ledger::pricing::{ImageMode, ModelCatalog, PricingConfig, UsageFacts, estimate};
use credit_ledger::LedgerError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

fn token_pricing(minimum: i64) -> PricingConfig {
    PricingConfig::from_value(Some(&json!({
        "unit": "token",
        "input_per_k": 10,
        "output_per_k": 30,
        "minimum": minimum
    })))
    .unwrap()
}

#[test]
fn test_minimum_charge_boundary() {
    let pricing = token_pricing(15);
    let cost = estimate(&pricing, &UsageFacts::tokens(100, 50)).unwrap();
    assert_eq!(cost, 15);
}

#[rstest]
#[case("512x512", ImageMode::Generate, 1, 60)]
#[case("1024x1024", ImageMode::Generate, 1, 120)]
#[case("1024x1024", ImageMode::Edit, 2, 320)]
#[case("2048x2048", ImageMode::Edit, 3, 240)]
fn test_image_pricing_cases(
    #[case] size: &str,
    #[case] mode: ImageMode,
    #[case] quantity: u32,
    #[case] expected: i64,
) {
    let pricing = PricingConfig::from_value(Some(&json!({
        "unit": "image",
        "base": 60,
        "edit_base": 80,
        "size_multipliers": { "1024x1024": 2.0 }
    })))
    .unwrap();

    let facts = UsageFacts::images(quantity, size, mode);
    assert_eq!(pricing.estimate(&facts).unwrap(), expected);
}

#[test]
fn test_unknown_fields_rejected() {
    let result = PricingConfig::from_value(Some(&json!({
        "unit": "token",
        "input_per_k": 1,
        "output_per_k": 1,
        "cache_per_k": 1
    })));
    assert!(matches!(result, Err(LedgerError::Config { .. })));
}

proptest! {
    #[test]
    fn prop_token_cost_never_below_minimum(
        prompt in 0u64..2_000_000,
        completion in 0u64..2_000_000,
        minimum in 0i64..10_000,
    ) {
        let pricing = token_pricing(minimum);
        let cost = estimate(&pricing, &UsageFacts::tokens(prompt, completion)).unwrap();
        prop_assert!(cost >= minimum);
    }

    #[test]
    fn prop_token_cost_monotonic_in_usage(
        prompt in 0u64..1_000_000,
        completion in 0u64..1_000_000,
        extra in 0u64..10_000,
    ) {
        let pricing = token_pricing(0);
        let base = estimate(&pricing, &UsageFacts::tokens(prompt, completion)).unwrap();
        let more = estimate(&pricing, &UsageFacts::tokens(prompt + extra, completion + extra)).unwrap();
        prop_assert!(more >= base);
    }

    #[test]
    fn prop_image_cost_scales_with_quantity(quantity in 1u32..100) {
        let pricing = PricingConfig::from_value(Some(&json!({ "unit": "image", "base": 60 }))).unwrap();
        let cost = pricing
            .estimate(&UsageFacts::images(quantity, "512x512", ImageMode::Generate))
            .unwrap();
        prop_assert_eq!(cost, 60 * i64::from(quantity));
    }
}

#[tokio::test]
async fn test_catalog_loads_active_model_pricing() {
    let db = create_test_db().await;
    seed_model(
        &db,
        "openai",
        "gpt-4o",
        json!({ "unit": "token", "input_per_k": 5, "output_per_k": 15 }),
    )
    .await;
    let catalog = ModelCatalog::new(db);

    let pricing = catalog.pricing_for("openai", "gpt-4o").await.unwrap();
    assert_eq!(pricing.unit(), "token");

    let err = catalog.pricing_for("openai", "unknown").await.unwrap_err();
    assert!(matches!(err, LedgerError::Config { .. }));
}

#[tokio::test]
async fn test_catalog_rejects_malformed_blob() {
    let db = create_test_db().await;
    seed_model(&db, "acme", "broken", json!({ "unit": "video" })).await;
    let catalog = ModelCatalog::new(db);

    let err = catalog.pricing_for("acme", "broken").await.unwrap_err();
    assert!(matches!(err.root(), LedgerError::Config { .. }));
}

#[tokio::test]
async fn test_catalog_upsert_validates_and_replaces() {
    let db = create_test_db().await;
    let catalog = ModelCatalog::new(db);

    let err = catalog
        .upsert_model("openai", "gpt-image-1", None, &json!({ "unit": "image" }))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Config { .. }));

    catalog
        .upsert_model(
            "openai",
            "gpt-image-1",
            Some("GPT Image".to_string()),
            &json!({ "unit": "image", "base": 60 }),
        )
        .await
        .unwrap();
    let replaced = catalog
        .upsert_model(
            "openai",
            "gpt-image-1",
            None,
            &json!({ "unit": "image", "base": 75 }),
        )
        .await
        .unwrap();

    assert_eq!(replaced.display_name.as_deref(), Some("GPT Image"));
    let pricing = catalog.pricing_for("openai", "gpt-image-1").await.unwrap();
    assert_eq!(
        pricing
            .estimate(&UsageFacts::images(1, "512x512", ImageMode::Generate))
            .unwrap(),
        75
    );
}
