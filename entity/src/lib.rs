//! # Entity 模块
//!
//! 包含积分账本所需的全部 Sea-ORM 实体定义

pub mod users;
pub mod ai_models;
pub mod credit_transactions;
pub mod usage_records;

pub use users::Entity as Users;
pub use ai_models::Entity as AiModels;
pub use credit_transactions::Entity as CreditTransactions;
pub use usage_records::Entity as UsageRecords;
