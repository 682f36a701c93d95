//! Error types for the OpenEscrow engine.
//!
//! All errors use the `OE_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Ledger / amount errors
//! - 2xx: Lifecycle (state machine) errors
//! - 3xx: Authorization errors
//! - 4xx: Conflict / voting errors
//! - 5xx: Lookup errors
//! - 6xx: Review errors
//! - 9xx: General / internal errors
//!
//! Every variant is synchronous and locally detected. The engine never
//! retries: a rejected call leaves all state unchanged and the caller decides
//! whether to resubmit with corrected input.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, MilestoneKey};

/// Central error enum for all OpenEscrow operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    // =================================================================
    // Ledger Errors (1xx)
    // =================================================================
    /// Amount is zero, negative, fractional, or would overflow.
    #[error("OE_ERR_100: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Not enough available balance to perform the operation.
    #[error("OE_ERR_101: Insufficient available balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Not enough frozen balance to release or split.
    #[error("OE_ERR_102: Insufficient frozen balance: need {needed}, have {frozen}")]
    InsufficientFrozenFunds { needed: Decimal, frozen: Decimal },

    /// The standing allowance does not cover the freeze.
    #[error("OE_ERR_103: Insufficient allowance: need {needed}, approved {allowance}")]
    InsufficientAllowance { needed: Decimal, allowance: Decimal },

    // =================================================================
    // Lifecycle Errors (2xx)
    // =================================================================
    /// The requested state transition is not allowed from the current state.
    #[error("OE_ERR_200: Invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        subject: String,
        from: String,
        to: String,
    },

    /// The milestone has already been verified and paid out.
    #[error("OE_ERR_201: Milestone already verified: {0}")]
    AlreadyVerified(MilestoneKey),

    /// A settlement was already recorded for this milestone.
    #[error("OE_ERR_202: Milestone already settled: {0}")]
    AlreadySettled(MilestoneKey),

    // =================================================================
    // Authorization Errors (3xx)
    // =================================================================
    /// The caller is not allowed to perform this action.
    #[error("OE_ERR_300: Unauthorized: {actor} may not {action}")]
    Unauthorized { actor: AccountId, action: String },

    // =================================================================
    // Conflict Errors (4xx)
    // =================================================================
    /// The voter already has a recorded vote on this conflict.
    #[error("OE_ERR_400: {voter} already voted on conflict {key}")]
    AlreadyVoted { key: MilestoneKey, voter: AccountId },

    /// All declared votes have been cast, or the conflict is resolved.
    #[error("OE_ERR_401: Voting closed for conflict {0}")]
    VotingClosed(MilestoneKey),

    /// The declared voter count is outside `1..=max`.
    #[error("OE_ERR_402: Invalid voter count {requested} (allowed 1..={max})")]
    InvalidVoterCount { requested: u32, max: u32 },

    // =================================================================
    // Lookup Errors (5xx)
    // =================================================================
    /// The referenced entity does not exist.
    #[error("OE_ERR_500: Not found: {what}")]
    NotFound { what: String },

    // =================================================================
    // Review Errors (6xx)
    // =================================================================
    /// A review in this direction was already recorded for the milestone.
    #[error("OE_ERR_600: Review already recorded for {key} ({direction})")]
    DuplicateReview { key: MilestoneKey, direction: String },

    /// Review text or rating is invalid.
    #[error("OE_ERR_601: Invalid review: {reason}")]
    InvalidReview { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical safety alert.
    #[error("OE_ERR_900: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// Configuration error (invalid config file, out-of-range values).
    #[error("OE_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("OE_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("OE_ERR_903: Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Shorthand for a [`EscrowError::NotFound`] with a formatted subject.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }

    /// Shorthand for an [`EscrowError::Unauthorized`].
    pub fn unauthorized(actor: AccountId, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor,
            action: action.into(),
        }
    }

    /// Shorthand for an [`EscrowError::InvalidTransition`].
    pub fn invalid_transition(
        subject: impl std::fmt::Display,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            subject: subject.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = EscrowError::AlreadyVerified(MilestoneKey::new(0, 0, 0));
        let msg = format!("{err}");
        assert!(msg.starts_with("OE_ERR_201"), "Got: {msg}");
        assert!(msg.contains("p0/s0/m0"));
    }

    #[test]
    fn insufficient_funds_display() {
        let err = EscrowError::InsufficientFunds {
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("OE_ERR_101"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = EscrowError::invalid_transition("milestone p0/s0/m1", "CREATED", "COMPLETED");
        let msg = format!("{err}");
        assert!(msg.contains("OE_ERR_200"));
        assert!(msg.contains("CREATED -> COMPLETED"));
    }

    #[test]
    fn all_errors_have_oe_err_prefix() {
        let key = MilestoneKey::new(1, 2, 3);
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(EscrowError::InvalidAmount { reason: "zero".into() }),
            Box::new(EscrowError::InsufficientFrozenFunds {
                needed: Decimal::ONE,
                frozen: Decimal::ZERO,
            }),
            Box::new(EscrowError::unauthorized(AccountId::new(), "verify")),
            Box::new(EscrowError::AlreadyVoted {
                key,
                voter: AccountId::new(),
            }),
            Box::new(EscrowError::VotingClosed(key)),
            Box::new(EscrowError::not_found(key)),
            Box::new(EscrowError::Internal("test".into())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("OE_ERR_"),
                "Error missing OE_ERR_ prefix: {msg}"
            );
        }
    }

    #[test]
    fn serde_error_maps_to_serialization() {
        let err: EscrowError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EscrowError::Serialization(_)));
    }
}
