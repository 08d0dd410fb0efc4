//! # 交易状态机

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 积分交易状态
///
/// 迁移表：`Pending` 可以进入任意其他状态；`Success` 与 `Failed` 只能进入 `Refunded`；
/// `Refunded` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Success, Self::Failed, Self::Refunded];

    /// 持久化字符串
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Success | Self::Failed | Self::Refunded)
                | (Self::Success | Self::Failed, Self::Refunded)
        )
    }

    /// 能够迁移到 `next` 的所有状态
    pub fn sources_of(next: Self) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |from| from.can_transition_to(next))
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Refunded)
    }

    /// 结算只接受成功或失败
    #[must_use]
    pub const fn is_settlement_outcome(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的状态字符串
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知的交易状态: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
