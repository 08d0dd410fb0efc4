use std::time::Duration;

pub type UserId = i32;
pub type AdminId = i32;

/// 积分数量，带符号以表示扣费与入账
pub type Credits = i64;

/// 写入数据库的计数列为 BIGINT，超出范围时饱和
#[must_use]
pub fn count_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// 毫秒时长转为数据库列值
#[must_use]
pub fn duration_ms_to_db(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
