//! # openescrow-engine
//!
//! Orchestration layer of the OpenEscrow workspace.
//!
//! ## Architecture
//!
//! ```text
//! Registry facts ─▶ EscrowController ─▶ MilestoneStore (state machines)
//!                          │
//!                          ├─▶ Ledger (freeze / release / split)
//!                          └─▶ ConflictResolver (vote-weighted settlement)
//! ```
//!
//! Every controller operation:
//! 1. Authorizes the actor against the [`Registry`]
//! 2. Checks every state guard before touching anything
//! 3. Performs the ledger movement (atomic on its own)
//! 4. Advances milestone / service / conflict state
//! 5. Returns an [`ActionReceipt`] with transfers and events
//!
//! Fund-moving settlements also append a hash-chained
//! [`SettlementReceipt`](openescrow_types::SettlementReceipt) and re-check
//! supply conservation.
//!
//! [`SharedEscrow`] wraps the controller for multi-threaded callers.

pub mod conflict_resolver;
pub mod controller;
pub mod milestone_store;
pub mod registry;
pub mod review_sink;
pub mod settlement_guard;
pub mod shared;

pub use conflict_resolver::{ConflictResolver, Settlement};
pub use controller::{ActionReceipt, EscrowController};
pub use milestone_store::MilestoneStore;
pub use registry::{InMemoryRegistry, Registry};
pub use review_sink::{ReviewLog, ReviewSink};
pub use settlement_guard::SettlementGuard;
pub use shared::SharedEscrow;
