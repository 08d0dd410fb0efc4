//! # 配置管理模块
//!
//! 处理应用配置加载、验证和管理

mod app_config;
mod database;

pub use app_config::{AppConfig, LedgerConfig, UsageConfig};
pub use database::DatabaseConfig;

use std::env;
use std::path::Path;

use crate::error::{LedgerError, Result};
use crate::{linfo, logging::{LogComponent, LogStage}};

/// 加载配置文件
///
/// 按 `RUST_ENV` 选择 `config/config.{env}.toml`；文件不存在时使用默认配置。
/// `DATABASE_URL` 环境变量优先于文件中的数据库地址。
pub fn load_config() -> Result<AppConfig> {
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config_file = format!("config/config.{env}.toml");
    resolve_config(Path::new(&config_file), env::var("DATABASE_URL").ok())
}

fn resolve_config(config_file: &Path, database_url: Option<String>) -> Result<AppConfig> {
    let mut config = if config_file.exists() {
        load_config_from(config_file)?
    } else {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_default",
            &format!("配置文件不存在，使用默认配置: {}", config_file.display())
        );
        AppConfig::default()
    };

    if let Some(url) = database_url {
        config.database.url = url;
    }

    config.validate().map_err(LedgerError::config)?;
    Ok(config)
}

/// 从指定路径加载配置
pub fn load_config_from(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let config_content = std::fs::read_to_string(path).map_err(|e| {
        LedgerError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
    })?;

    let config: AppConfig = toml::from_str(&config_content)?;
    config.validate().map_err(LedgerError::config)?;
    Ok(config)
}
