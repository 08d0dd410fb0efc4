//! # 账本存储原语
//!
//! 余额与交易状态的原子条件更新。所有函数都接受任意连接，调用方负责把它们放进同一个事务。

use chrono::{NaiveDateTime, Utc};
use entity::{credit_transactions, users};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::{Map, Value};

use super::{Transaction, TransactionStatus};
use crate::error::{LedgerError, Result};
use crate::types::{Credits, UserId};

/// 状态 CAS 的前置条件
#[derive(Debug, Clone, Copy)]
pub(super) enum StatusGuard {
    /// 当前状态恰好为给定值
    Is(TransactionStatus),
    /// 当前状态按迁移表允许进入目标状态
    TransitionAllowed,
}

pub(super) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// `UPDATE users SET credit_balance = credit_balance - amount WHERE id = ? AND credit_balance >= amount`
///
/// 返回是否扣减成功。
pub(super) async fn debit_if_sufficient<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    amount: Credits,
) -> Result<bool> {
    let result = users::Entity::update_many()
        .col_expr(
            users::Column::CreditBalance,
            Expr::col(users::Column::CreditBalance).sub(amount),
        )
        .col_expr(users::Column::UpdatedAt, Expr::value(now()))
        .filter(users::Column::Id.eq(user_id))
        .filter(users::Column::CreditBalance.gte(amount))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// `UPDATE users SET credit_balance = credit_balance + amount WHERE id = ? AND credit_balance <= MAX - amount`
///
/// `amount` 必须为正，返回是否入账成功。
pub(super) async fn credit_within_limit<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    amount: Credits,
) -> Result<bool> {
    let result = users::Entity::update_many()
        .col_expr(
            users::Column::CreditBalance,
            Expr::col(users::Column::CreditBalance).add(amount),
        )
        .col_expr(users::Column::UpdatedAt, Expr::value(now()))
        .filter(users::Column::Id.eq(user_id))
        .filter(users::Column::CreditBalance.lte(Credits::MAX - amount))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// 无条件增减余额，`amount` 可以为负
pub(super) async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    amount: Credits,
) -> Result<()> {
    let result = users::Entity::update_many()
        .col_expr(
            users::Column::CreditBalance,
            Expr::col(users::Column::CreditBalance).add(amount),
        )
        .col_expr(users::Column::UpdatedAt, Expr::value(now()))
        .filter(users::Column::Id.eq(user_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(LedgerError::user_not_found(user_id));
    }
    Ok(())
}

/// 状态 CAS：仅当前置条件成立时写入新状态，返回是否抢到这次迁移
pub(super) async fn claim_status<C: ConnectionTrait>(
    conn: &C,
    transaction_id: &str,
    guard: StatusGuard,
    next: TransactionStatus,
) -> Result<bool> {
    let guard_condition = match guard {
        StatusGuard::Is(status) => credit_transactions::Column::Status.eq(status.as_str()),
        StatusGuard::TransitionAllowed => credit_transactions::Column::Status
            .is_in(TransactionStatus::sources_of(next).map(TransactionStatus::as_str)),
    };

    let result = credit_transactions::Entity::update_many()
        .col_expr(credit_transactions::Column::Status, Expr::value(next.as_str()))
        .col_expr(credit_transactions::Column::UpdatedAt, Expr::value(now()))
        .filter(credit_transactions::Column::Id.eq(transaction_id))
        .filter(guard_condition)
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

pub(super) async fn load_transaction<C: ConnectionTrait>(
    conn: &C,
    transaction_id: &str,
) -> Result<Transaction> {
    credit_transactions::Entity::find_by_id(transaction_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::not_found(transaction_id))
}

/// 解析持久化的状态字符串
pub(super) fn current_status(transaction: &Transaction) -> Result<TransactionStatus> {
    transaction.status.parse().map_err(|err: super::UnknownStatus| {
        LedgerError::internal(format!("交易 {} {}", transaction.id, err))
    })
}

pub(super) async fn load_user<C: ConnectionTrait>(conn: &C, user_id: UserId) -> Result<users::Model> {
    users::Entity::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::user_not_found(user_id))
}

/// 条件扣减失败后区分用户不存在与余额不足
pub(super) async fn debit_rejection<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    required: Credits,
) -> LedgerError {
    match load_user(conn, user_id).await {
        Ok(user) => LedgerError::insufficient_balance(user_id, required, user.credit_balance),
        Err(err) => err,
    }
}

/// 条件入账失败后区分用户不存在与余额溢出
pub(super) async fn credit_rejection<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    amount: Credits,
) -> LedgerError {
    match load_user(conn, user_id).await {
        Ok(user) => LedgerError::invalid_amount(
            format!("入账后余额溢出，当前余额 {}", user.credit_balance),
            amount,
        ),
        Err(err) => err,
    }
}

/// 将补丁合并进已有的元数据对象，非对象的旧值会被替换
pub(super) fn merge_metadata(existing: Option<Value>, patch: Map<String, Value>) -> Option<Value> {
    if patch.is_empty() {
        return existing;
    }
    let mut merged = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    merged.extend(patch);
    Some(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_merge_metadata_extends_existing() {
        let merged = merge_metadata(
            Some(json!({ "request_id": "req-1", "estimate": 60 })),
            object(json!({ "estimate": 60, "input_tokens": 100 })),
        );
        assert_eq!(
            merged,
            Some(json!({ "request_id": "req-1", "estimate": 60, "input_tokens": 100 }))
        );
    }

    #[test]
    fn test_merge_metadata_empty_patch_keeps_original() {
        assert_eq!(merge_metadata(None, Map::new()), None);
        assert_eq!(
            merge_metadata(Some(json!("legacy")), Map::new()),
            Some(json!("legacy"))
        );
    }

    #[test]
    fn test_merge_metadata_replaces_non_object() {
        let merged = merge_metadata(Some(json!([1, 2])), object(json!({ "overdraft": true })));
        assert_eq!(merged, Some(json!({ "overdraft": true })));
    }
}
