//! Result of a usage log attempt.

use super::UsageRecord;
use crate::{HuginnError, Result};

/// Details of an accepted log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReceipt {
    /// The identity's record after the update.
    pub usage: UsageRecord,
    /// The identity is at 80% or more of its limit.
    pub identity_near_limit: bool,
    /// The system is at 80% or more of its limit.
    pub system_near_limit: bool,
}

/// What happened to a [`TokenUsage::log`](super::TokenUsage::log) call.
///
/// Rejections are ordinary outcomes, not errors: the ledger is left
/// untouched and the caller decides whether to proceed.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Recorded(LogReceipt),
    IdentityQuotaExceeded {
        identity: String,
        attempted: u64,
        limit: u64,
    },
    SystemQuotaExceeded {
        attempted: u64,
        limit: u64,
    },
    InvalidIdentity {
        identity: String,
    },
}

impl LogOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }

    pub fn receipt(&self) -> Option<&LogReceipt> {
        match self {
            Self::Recorded(receipt) => Some(receipt),
            _ => None,
        }
    }

    /// Convert rejections into errors so callers can use `?`.
    pub fn into_result(self) -> Result<LogReceipt> {
        match self {
            Self::Recorded(receipt) => Ok(receipt),
            Self::IdentityQuotaExceeded {
                identity,
                attempted,
                limit,
            } => Err(HuginnError::IdentityQuotaExceeded {
                identity,
                attempted,
                limit,
            }),
            Self::SystemQuotaExceeded { attempted, limit } => {
                Err(HuginnError::SystemQuotaExceeded { attempted, limit })
            }
            Self::InvalidIdentity { identity } => Err(HuginnError::InvalidInput(format!(
                "invalid identity: {identity:?}"
            ))),
        }
    }
}

/// Whether `total` has reached 80% of `limit`.
pub(crate) fn near_limit(total: u64, limit: u64) -> bool {
    u128::from(total) * 5 >= u128::from(limit) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_limit_threshold() {
        assert!(!near_limit(7_999, 10_000));
        assert!(near_limit(8_000, 10_000));
        assert!(near_limit(10_000, 10_000));
        assert!(!near_limit(3, 5));
        assert!(near_limit(4, 5));
        assert!(near_limit(u64::MAX, u64::MAX));
    }

    #[test]
    fn rejections_map_to_errors() {
        let err = LogOutcome::IdentityQuotaExceeded {
            identity: "agent1".to_string(),
            attempted: 10_001,
            limit: 10_000,
        }
        .into_result()
        .unwrap_err();
        assert!(err.is_quota_exceeded());

        let err = LogOutcome::SystemQuotaExceeded {
            attempted: 5,
            limit: 4,
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, HuginnError::SystemQuotaExceeded { .. }));

        let err = LogOutcome::InvalidIdentity {
            identity: "a b".to_string(),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, HuginnError::InvalidInput(_)));
    }
}
