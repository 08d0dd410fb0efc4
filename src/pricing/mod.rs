//! # 计费估算
//!
//! 将模型的定价配置与用量事实映射为积分费用。定价配置在边界处解析为
//! `PricingConfig::{Token, Image}`，下游不再接触原始 JSON。
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

pub mod catalog;

pub use catalog::ModelCatalog;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{LedgerError, Result};
use crate::types::Credits;
use crate::{config_error, ensure_config};

/// 浮点误差容忍度，避免 2.5000000000000004 这类结果被多取整一档
const CEIL_EPSILON: f64 = 1e-9;

/// 模型定价配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "lowercase")]
pub enum PricingConfig {
    /// 按 token 计费
    Token(TokenPricing),
    /// 按图片计费
    Image(ImagePricing),
}

/// Token 定价：每千 token 的积分单价
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPricing {
    #[serde(alias = "inputPerK")]
    pub input_per_k: f64,
    #[serde(alias = "outputPerK")]
    pub output_per_k: f64,
    /// 单次调用的最低收费
    #[serde(default)]
    pub minimum: Credits,
}

/// 图片定价
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagePricing {
    pub base: f64,
    /// 编辑模式单价，未设置时回退到 `base`
    #[serde(default, alias = "editBase", skip_serializing_if = "Option::is_none")]
    pub edit_base: Option<f64>,
    /// 尺寸倍率，如 `{"1024x1024": 2.0}`；未列出的尺寸倍率为 1
    #[serde(default, alias = "sizeMultipliers")]
    pub size_multipliers: BTreeMap<String, f64>,
}

/// 图片操作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    #[default]
    Generate,
    Edit,
}

/// 用量事实
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UsageFacts {
    /// 对话类调用的 token 数
    Tokens {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    /// 图片类调用的数量、尺寸与模式
    Images {
        quantity: u32,
        size: Option<String>,
        #[serde(default)]
        mode: ImageMode,
    },
}

impl UsageFacts {
    #[must_use]
    pub const fn tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self::Tokens {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn images(quantity: u32, size: impl Into<String>, mode: ImageMode) -> Self {
        Self::Images {
            quantity,
            size: Some(size.into()),
            mode,
        }
    }

    /// 输入/输出 token 数（图片用量没有 token）
    #[must_use]
    pub const fn token_counts(&self) -> (Option<u64>, Option<u64>) {
        match self {
            Self::Tokens {
                prompt_tokens,
                completion_tokens,
            } => (Some(*prompt_tokens), Some(*completion_tokens)),
            Self::Images { .. } => (None, None),
        }
    }
}

impl PricingConfig {
    /// 从模型记录上的原始 JSON 解析定价配置
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        let value = match value {
            None | Some(Value::Null) => return Err(config_error!("定价配置缺失")),
            Some(value) => value,
        };
        let Some(object) = value.as_object() else {
            return Err(config_error!("定价配置必须是 JSON 对象"));
        };
        match object.get("unit").and_then(Value::as_str) {
            Some("token" | "image") => {}
            Some(unit) => return Err(config_error!("未知的计费单位: {}", unit)),
            None => return Err(config_error!("定价配置缺少 unit 字段")),
        }

        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| LedgerError::config_with_source("定价配置格式错误", e))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验数值字段
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Token(pricing) => {
                ensure_non_negative("input_per_k", pricing.input_per_k)?;
                ensure_non_negative("output_per_k", pricing.output_per_k)?;
                ensure_config!(pricing.minimum >= 0, "minimum 不能为负数: {}", pricing.minimum);
            }
            Self::Image(pricing) => {
                ensure_non_negative("base", pricing.base)?;
                if let Some(edit_base) = pricing.edit_base {
                    ensure_non_negative("edit_base", edit_base)?;
                }
                for (size, multiplier) in &pricing.size_multipliers {
                    ensure_non_negative(&format!("size_multipliers.{size}"), *multiplier)?;
                }
            }
        }
        Ok(())
    }

    /// 计费单位名称
    #[must_use]
    pub const fn unit(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Image(_) => "image",
        }
    }

    /// 估算费用，结果不低于配置的最低收费
    pub fn estimate(&self, facts: &UsageFacts) -> Result<Credits> {
        estimate(self, facts)
    }
}

impl ImagePricing {
    /// 尺寸倍率，未配置时为 1
    #[must_use]
    pub fn size_multiplier(&self, size: Option<&str>) -> f64 {
        size.and_then(|size| self.size_multipliers.get(size))
            .copied()
            .unwrap_or(1.0)
    }

    /// 按模式选择单价
    #[must_use]
    pub fn unit_price(&self, mode: ImageMode) -> f64 {
        match mode {
            ImageMode::Edit => self.edit_base.unwrap_or(self.base),
            ImageMode::Generate => self.base,
        }
    }
}

/// 根据定价配置与用量事实计算积分费用
pub fn estimate(config: &PricingConfig, facts: &UsageFacts) -> Result<Credits> {
    match (config, facts) {
        (
            PricingConfig::Token(pricing),
            UsageFacts::Tokens {
                prompt_tokens,
                completion_tokens,
            },
        ) => {
            let raw = (*prompt_tokens as f64).mul_add(
                pricing.input_per_k,
                *completion_tokens as f64 * pricing.output_per_k,
            ) / 1000.0;
            let cost = ceil_credits(raw)?;
            Ok(cost.max(pricing.minimum))
        }
        (
            PricingConfig::Image(pricing),
            UsageFacts::Images {
                quantity,
                size,
                mode,
            },
        ) => {
            if *quantity == 0 {
                return Err(LedgerError::invalid_amount("图片数量必须大于0", 0));
            }
            let raw = pricing.unit_price(*mode)
                * pricing.size_multiplier(size.as_deref())
                * f64::from(*quantity);
            ceil_credits(raw)
        }
        (config, _) => Err(config_error!(
            "用量类型与计费单位不匹配: unit={}",
            config.unit()
        )),
    }
}

fn ceil_credits(raw: f64) -> Result<Credits> {
    ensure_config!(raw.is_finite() && raw >= 0.0, "计费结果无效: {}", raw);
    // 容差只吸收整数边界上的浮点误差，不能把极小的正费用抹成零
    let rounded = if raw > CEIL_EPSILON {
        (raw - CEIL_EPSILON).ceil()
    } else {
        raw.ceil()
    };
    ensure_config!(rounded < Credits::MAX as f64, "计费结果溢出: {}", raw);
    Ok(rounded as Credits)
}

fn ensure_non_negative(field: &str, value: f64) -> Result<()> {
    ensure_config!(
        value.is_finite() && value >= 0.0,
        "定价字段 {} 必须是非负数: {}",
        field,
        value
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_config(input: f64, output: f64, minimum: Credits) -> PricingConfig {
        PricingConfig::Token(TokenPricing {
            input_per_k: input,
            output_per_k: output,
            minimum,
        })
    }

    #[test]
    fn test_token_minimum_applies() {
        let config = token_config(10.0, 30.0, 15);
        // ceil(1.0 + 1.5) = 3，低于最低收费 15
        assert_eq!(estimate(&config, &UsageFacts::tokens(100, 50)).unwrap(), 15);
    }

    #[test]
    fn test_token_cost_rounds_up() {
        let config = token_config(10.0, 30.0, 0);
        assert_eq!(estimate(&config, &UsageFacts::tokens(100, 50)).unwrap(), 3);
        assert_eq!(estimate(&config, &UsageFacts::tokens(1000, 1000)).unwrap(), 40);
        assert_eq!(estimate(&config, &UsageFacts::tokens(0, 0)).unwrap(), 0);
    }

    #[test]
    fn test_token_fractional_price_not_over_rounded() {
        let config = token_config(0.1, 0.2, 0);
        assert_eq!(estimate(&config, &UsageFacts::tokens(10_000, 10_000)).unwrap(), 3);
    }

    #[test]
    fn test_tiny_positive_cost_charges_one_credit() {
        let config = token_config(5e-7, 0.0, 0);
        assert_eq!(estimate(&config, &UsageFacts::tokens(1, 0)).unwrap(), 1);
        assert_eq!(ceil_credits(1e-12).unwrap(), 1);
        assert_eq!(ceil_credits(0.0).unwrap(), 0);
    }

    #[test]
    fn test_image_default_multiplier() {
        let config = PricingConfig::from_value(Some(&json!({
            "unit": "image",
            "base": 60,
            "size_multipliers": { "1024x1024": 2.0 }
        })))
        .unwrap();

        let small = UsageFacts::images(1, "512x512", ImageMode::Generate);
        let large = UsageFacts::images(2, "1024x1024", ImageMode::Generate);
        assert_eq!(config.estimate(&small).unwrap(), 60);
        assert_eq!(config.estimate(&large).unwrap(), 240);
    }

    #[test]
    fn test_image_edit_base_with_fallback() {
        let with_edit = PricingConfig::from_value(Some(&json!({
            "unit": "image", "base": 60, "editBase": 80
        })))
        .unwrap();
        let without_edit = PricingConfig::from_value(Some(&json!({
            "unit": "image", "base": 60
        })))
        .unwrap();
        let edit = UsageFacts::images(1, "512x512", ImageMode::Edit);

        assert_eq!(with_edit.estimate(&edit).unwrap(), 80);
        assert_eq!(without_edit.estimate(&edit).unwrap(), 60);
    }

    #[test]
    fn test_image_zero_quantity_rejected() {
        let config = PricingConfig::Image(ImagePricing {
            base: 60.0,
            edit_base: None,
            size_multipliers: BTreeMap::new(),
        });
        let facts = UsageFacts::Images {
            quantity: 0,
            size: None,
            mode: ImageMode::Generate,
        };
        assert!(matches!(
            estimate(&config, &facts),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_malformed_configs_rejected() {
        let cases = [
            None,
            Some(json!(null)),
            Some(json!("token")),
            Some(json!([1, 2])),
            Some(json!({ "base": 60 })),
            Some(json!({ "unit": "video", "base": 60 })),
            Some(json!({ "unit": "token", "input_per_k": "ten", "output_per_k": 1 })),
            Some(json!({ "unit": "token", "input_per_k": -1, "output_per_k": 1 })),
            Some(json!({ "unit": "image" })),
        ];

        for value in cases {
            let result = PricingConfig::from_value(value.as_ref());
            assert!(
                matches!(result, Err(LedgerError::Config { .. })),
                "expected config error for {value:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_family_mismatch_is_config_error() {
        let config = token_config(10.0, 30.0, 0);
        let facts = UsageFacts::images(1, "512x512", ImageMode::Generate);
        assert!(matches!(
            estimate(&config, &facts),
            Err(LedgerError::Config { .. })
        ));
    }
}
