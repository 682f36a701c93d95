//! System-wide constants for the OpenEscrow engine.

/// Default upper bound on the voter count declared for a conflict.
pub const DEFAULT_MAX_VOTERS: u32 = 101;

/// Default maximum live milestones per service.
pub const DEFAULT_MAX_MILESTONES_PER_SERVICE: usize = 64;

/// Lowest review rating (stars).
pub const MIN_RATING: u8 = 1;

/// Highest review rating (stars).
pub const MAX_RATING: u8 = 5;

/// Maximum length of a review text in bytes.
pub const MAX_REVIEW_TEXT_LEN: usize = 4096;

/// Domain separator for settlement receipt hashes.
pub const RECEIPT_DOMAIN: &[u8] = b"openescrow:receipt:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "OpenEscrow";
