//! Engine configuration.
//!
//! Every field has a default from [`crate::constants`], so a config file
//! only needs to list what it overrides:
//!
//! ```json
//! { "max_voters": 9, "requester_award": "split_evenly" }
//! ```

use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result, constants};

/// Who receives the odd base unit when a mixed vote splits an odd price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemainderRecipient {
    #[default]
    Provider,
    Requester,
}

/// Payout when every voter sides with the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequesterAward {
    /// Release the full price back to the requester.
    #[default]
    Refund,
    /// Split the price 50/50 even though the requester won. On an odd
    /// price the requester keeps the extra unit.
    SplitEvenly,
}

/// Configuration for an escrow engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on the voter count a raiser may declare.
    pub max_voters: u32,
    /// Maximum live (non-deleted) milestones per service.
    pub max_milestones_per_service: usize,
    /// Recipient of the odd unit in a 50/50 split.
    pub split_remainder: RemainderRecipient,
    /// Payout rule for a unanimous requester verdict.
    pub requester_award: RequesterAward,
    /// Settle inside the vote that completes the tally. When `false`,
    /// `resolve_payment` must be called separately.
    pub settle_on_final_vote: bool,
    /// Re-check supply conservation after every settlement.
    pub verify_conservation: bool,
    /// Lowest accepted review rating.
    pub min_rating: u8,
    /// Highest accepted review rating.
    pub max_rating: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_voters: constants::DEFAULT_MAX_VOTERS,
            max_milestones_per_service: constants::DEFAULT_MAX_MILESTONES_PER_SERVICE,
            split_remainder: RemainderRecipient::default(),
            requester_award: RequesterAward::default(),
            settle_on_final_vote: true,
            verify_conservation: true,
            min_rating: constants::MIN_RATING,
            max_rating: constants::MAX_RATING,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config and validate it.
    ///
    /// # Errors
    /// Returns `Configuration` for malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| EscrowError::Configuration(format!("invalid engine config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    /// Returns `Configuration` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.max_voters == 0 {
            return Err(EscrowError::Configuration(
                "max_voters must be at least 1".to_string(),
            ));
        }
        if self.max_milestones_per_service == 0 {
            return Err(EscrowError::Configuration(
                "max_milestones_per_service must be at least 1".to_string(),
            ));
        }
        if self.min_rating > self.max_rating {
            return Err(EscrowError::Configuration(format!(
                "min_rating {} exceeds max_rating {}",
                self.min_rating, self.max_rating
            )));
        }
        Ok(())
    }
}
