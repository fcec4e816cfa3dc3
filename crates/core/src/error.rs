use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds for a single exchange gateway call.
///
/// Every venue interaction resolves to one of these. Transient and
/// venue-rejected failures are recoverable on the next cycle; authentication
/// failures stop that portfolio's automation until credentials are refreshed
/// externally.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network trouble, timeout, or rate limiting. Retry next cycle.
    #[error("transient gateway failure: {0}")]
    Transient(String),

    /// Credentials rejected. Fatal for this portfolio's automation.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The venue accepted the request but refused to execute it.
    #[error("rejected by venue: code {code}, {message}")]
    Rejected { code: i64, message: String },

    /// Not enough balance to cover a requested amount.
    #[error("insufficient {asset} balance: need {required}, have {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },
}

impl GatewayError {
    /// Whether the next automation cycle may simply retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Rejected { .. } | Self::InsufficientBalance { .. }
        )
    }

    /// Whether the failure must stop automation for the affected portfolio.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Failure of one portfolio control cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Malformed snapshot or configuration. The cycle is aborted without
    /// mutating portfolio state.
    #[error("invalid configuration or snapshot: {0}")]
    Validation(String),

    /// The emergency unwind did not complete. The portfolio stays in
    /// emergency status for manual operator intervention; never retried
    /// silently.
    #[error("liquidation incomplete: {0}")]
    Liquidation(String),

    #[error("persistence failure: {0}")]
    Store(anyhow::Error),

    /// The cycle overran its hard deadline and was abandoned. Venue calls
    /// already issued are not cancelled, only local bookkeeping is dropped.
    #[error("cycle deadline of {0:?} exceeded")]
    Deadline(Duration),
}

impl From<anyhow::Error> for CycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

impl CycleError {
    /// True when the underlying cause is an authentication failure.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Auth(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(GatewayError::Transient("connection reset".to_string()).is_retryable());
        assert!(GatewayError::Rejected {
            code: -1013,
            message: "MIN_NOTIONAL".to_string()
        }
        .is_retryable());
        assert!(GatewayError::InsufficientBalance {
            asset: "ETH".to_string(),
            required: dec!(1.5),
            available: dec!(0.2),
        }
        .is_retryable());
    }

    #[test]
    fn auth_failures_are_fatal_not_retryable() {
        let err = GatewayError::Auth("invalid API key".to_string());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());

        let cycle: CycleError = err.into();
        assert!(cycle.is_auth());
    }

    #[test]
    fn validation_is_not_auth() {
        let err = CycleError::Validation("min >= max".to_string());
        assert!(!err.is_auth());
    }
}
