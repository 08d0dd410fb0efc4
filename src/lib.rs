//! # Credit Ledger Library
//!
//! 计费 AI 调用的积分账本：预扣、结算、退款、管理员调整与对账

pub mod billing;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod pricing;
pub mod types;
pub mod usage;

// Re-export commonly used types
pub use billing::{BilledOperationError, BilledOutcome, BilledRequest, BillingService, OperationOutcome};
pub use config::AppConfig;
pub use error::{LedgerError, Result};
pub use ledger::{Attribution, CreditLedger, Transaction, TransactionHandle, TransactionStatus};
pub use pricing::{ModelCatalog, PricingConfig, UsageFacts};
