//! Error types shared by the read and write paths

use rust_decimal::Decimal;
use thiserror::Error;

/// Failure of a single contract read.
///
/// Readers never collapse these into a zero value themselves; the UI-facing
/// accessors decide when "unknown" becomes `None` or an empty collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Node unreachable, timed out or answered with a transport error
    #[error("RPC unavailable: {0}")]
    Unavailable(String),

    /// The call reached the contract and reverted
    #[error("call reverted: {0}")]
    Reverted(String),

    /// Function missing from the ABI or arguments that cannot be encoded
    #[error("ABI error: {0}")]
    Abi(String),

    /// Return data did not match the expected shape or value range
    #[error("decode error: {0}")]
    Decode(String),
}

impl ReadError {
    /// Transport-level failures are worth retrying on the next poll; the rest are not
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadError::Unavailable(_))
    }
}

/// Failure of a state-changing submission or of waiting for its receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("connected to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("RPC unavailable: {0}")]
    Unavailable(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("transaction {0} not confirmed in time")]
    Timeout(String),
}

/// Client-side input checks, run before any contract interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("choose a side before staking")]
    MissingSide,

    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("amount {amount} exceeds available balance {balance}")]
    InsufficientBalance { amount: Decimal, balance: Decimal },

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("category must not be empty")]
    EmptyCategory,

    #[error("end time {ends_at} is not in the future")]
    EndTimeInPast { ends_at: i64 },

    #[error("fee of {0} basis points exceeds 10000")]
    FeeTooHigh(u16),
}

/// Failure of a validated submission such as market creation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Invalid user-supplied amount text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("'{0}' is not a decimal amount")]
    NotNumeric(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(ReadError::Unavailable("timeout".into()).is_transient());
        assert!(!ReadError::Reverted("not active".into()).is_transient());
        assert!(!ReadError::Decode("bad state".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let error = ValidationError::InsufficientBalance {
            amount: Decimal::new(1000, 0),
            balance: Decimal::new(500, 0),
        };

        let message = error.to_string();
        assert!(message.contains("1000"));
        assert!(message.contains("500"));

        let error = WriteError::WrongChain { expected: 84532, actual: 1 };
        assert_eq!(error.to_string(), "connected to chain 1, expected 84532");
    }
}
