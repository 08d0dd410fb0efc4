//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库配置
    #[serde(default)]
    pub database: super::DatabaseConfig,
    /// 账本配置
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// 用量记录配置
    #[serde(default)]
    pub usage: UsageConfig,
}

/// 账本配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// pending 交易超过该时长（秒）即视为泄漏的预扣
    pub pending_ttl_secs: u64,
    /// 外部调用的截止时间（秒），超时按失败处理并全额退还
    pub operation_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 900,
            operation_timeout_secs: 120,
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub const fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// 用量记录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// 是否写入用量记录
    pub enabled: bool,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.ledger.operation_timeout_secs == 0 {
            return Err("ledger.operation_timeout_secs must be greater than 0".to_string());
        }
        // 预扣的有效期必须覆盖外部调用的截止时间，否则对账会释放仍在进行中的预扣
        if self.ledger.pending_ttl_secs <= self.ledger.operation_timeout_secs {
            return Err(
                "ledger.pending_ttl_secs must be greater than ledger.operation_timeout_secs"
                    .to_string(),
            );
        }

        Ok(())
    }
}
