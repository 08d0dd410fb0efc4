//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::ErrorCategory;
use crate::ledger::TransactionStatus;

/// 账本主要错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 非法金额：预扣金额不为正，或管理员调整金额为零
    #[error("金额无效: {message} (amount={amount})")]
    InvalidAmount { message: String, amount: i64 },

    /// 余额不足
    #[error("余额不足: 用户 {user_id} 需要 {required}，可用 {available}")]
    InsufficientBalance {
        user_id: i32,
        required: i64,
        available: i64,
    },

    /// 交易不存在
    #[error("交易不存在: {transaction_id}")]
    NotFound { transaction_id: String },

    /// 用户不存在
    #[error("用户不存在: {user_id}")]
    UserNotFound { user_id: i32 },

    /// 非法状态迁移
    #[error("非法状态迁移: 交易 {transaction_id} 不能从 {from} 迁移到 {to}")]
    InvalidTransition {
        transaction_id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// 配置相关错误（包括定价配置）
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 附加上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    /// 将错误转换为HTTP状态码和错误代码
    pub fn to_http_response_parts(&self) -> (StatusCode, &str) {
        match self {
            Self::InvalidAmount { .. } => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            Self::InsufficientBalance { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE")
            }
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
            Self::UserNotFound { .. } => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            Self::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::Config { .. } => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
            Self::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::Serialization { .. } => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 错误分类（客户端 / 服务端）
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }

    /// 剥离上下文后的根错误
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 是否为余额不足
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self.root(), Self::InsufficientBalance { .. })
    }

    /// 创建金额错误
    pub fn invalid_amount<T: Into<String>>(message: T, amount: i64) -> Self {
        Self::InvalidAmount {
            message: message.into(),
            amount,
        }
    }

    /// 创建余额不足错误
    pub const fn insufficient_balance(user_id: i32, required: i64, available: i64) -> Self {
        Self::InsufficientBalance {
            user_id,
            required,
            available,
        }
    }

    /// 创建交易不存在错误
    pub fn not_found<T: Into<String>>(transaction_id: T) -> Self {
        Self::NotFound {
            transaction_id: transaction_id.into(),
        }
    }

    /// 创建用户不存在错误
    pub const fn user_not_found(user_id: i32) -> Self {
        Self::UserNotFound { user_id }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

// 自动转换常见错误类型
impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON处理失败".to_string(),
            source: err.into(),
        }
    }
}

impl From<sea_orm::error::DbErr> for LedgerError {
    fn from(err: sea_orm::error::DbErr) -> Self {
        Self::database_with_source("数据库操作失败", err)
    }
}
