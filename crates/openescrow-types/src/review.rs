//! Review records handed to the external review sink.
//!
//! The engine only decides whether a review may be written: once per
//! `(milestone, direction)`, and only after the milestone has settled.
//! Storage belongs to the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, MilestoneKey};

/// Who is reviewing whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ReviewDirection {
    /// Project owner reviews the provider.
    OwnerToProvider,
    /// Provider reviews the project owner.
    ProviderToOwner,
}

impl std::fmt::Display for ReviewDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerToProvider => write!(f, "OWNER_TO_PROVIDER"),
            Self::ProviderToOwner => write!(f, "PROVIDER_TO_OWNER"),
        }
    }
}

/// Immutable review of a settled milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub key: MilestoneKey,
    pub reviewer: AccountId,
    pub reviewee: AccountId,
    pub direction: ReviewDirection,
    pub text: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display() {
        assert_eq!(ReviewDirection::OwnerToProvider.to_string(), "OWNER_TO_PROVIDER");
        assert_eq!(ReviewDirection::ProviderToOwner.to_string(), "PROVIDER_TO_OWNER");
    }

    #[test]
    fn serde_roundtrip() {
        let rec = ReviewRecord {
            key: MilestoneKey::new(0, 0, 0),
            reviewer: AccountId::new(),
            reviewee: AccountId::new(),
            direction: ReviewDirection::ProviderToOwner,
            text: "clear instructions".to_string(),
            rating: 5,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: ReviewRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
