//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::LedgerError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LedgerError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建数据库错误的宏
#[macro_export]
macro_rules! database_error {
    ($msg:expr) => {
        $crate::error::LedgerError::database($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LedgerError::database(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}

/// 确保金额合法，否则返回金额错误
#[macro_export]
macro_rules! ensure_amount {
    ($cond:expr, $amount:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::LedgerError::invalid_amount($msg, $amount));
        }
    };
}
