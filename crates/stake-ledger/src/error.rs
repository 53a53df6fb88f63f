//! error types for the deposit ledger

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),

    #[error("deposit amount below the policy minimum")]
    DepositTooSmall,

    #[error("stake below role threshold")]
    InsufficientStake,

    #[error("current position holds less than requested")]
    InsufficientCurrentBalance,

    #[error("position {0} not found")]
    PositionNotFound(u64),

    #[error("position type {stored} does not match policy type {expected}")]
    PositionMismatch { stored: u32, expected: u32 },

    #[error("withdrawal not yet matured")]
    NotYetMatured,

    #[error("position already has a pending withdrawal")]
    AlreadyWithdrawn,

    #[error("caller is not the group owner")]
    NotOwner,

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("validator group is frozen by withdraw-all")]
    GroupExpired,

    #[error("owner withdrawal would drop the group below the validator threshold")]
    OwnerInsufficient,

    #[error("insufficient balance to fund transfer")]
    InsufficientBalance,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Config(e.to_string())
    }
}

impl LedgerError {
    /// Errors that point at a broken ledger invariant rather than a bad call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::InsufficientBalance | LedgerError::Invariant(_))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
