//! Write-only review ingestion.
//!
//! The controller validates a review and then hands it to a [`ReviewSink`].
//! Storage, indexing and display belong to the sink's owner.

use openescrow_types::{MilestoneKey, Result, ReviewRecord};

/// Destination for accepted reviews.
pub trait ReviewSink: Send + Sync {
    /// Persist an accepted review.
    ///
    /// # Errors
    /// Implementation-defined; a failure aborts the review and the
    /// controller records nothing.
    fn record(&mut self, review: ReviewRecord) -> Result<()>;
}

/// Append-only in-memory sink.
#[derive(Debug, Default)]
pub struct ReviewLog {
    records: Vec<ReviewRecord>,
}

impl ReviewLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    /// Reviews written for one milestone, in arrival order.
    pub fn for_milestone(&self, key: MilestoneKey) -> impl Iterator<Item = &ReviewRecord> {
        self.records.iter().filter(move |r| r.key == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ReviewSink for ReviewLog {
    fn record(&mut self, review: ReviewRecord) -> Result<()> {
        self.records.push(review);
        Ok(())
    }
}
