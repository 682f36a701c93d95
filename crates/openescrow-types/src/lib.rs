//! # openescrow-types
//!
//! Shared types, errors, and configuration for the **OpenEscrow** milestone
//! escrow engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`ProjectId`], [`ServiceId`], [`ServiceKey`], [`MilestoneKey`]
//! - **Account model**: [`Account`] with available / frozen / allowance pools
//! - **Milestone model**: [`Milestone`], [`MilestoneState`]
//! - **Service model**: [`ServiceEscrow`], [`ServiceState`]
//! - **Conflict model**: [`Conflict`], [`ConflictState`], [`VoteChoice`], [`ConflictOutcome`]
//! - **Events & receipts**: [`EscrowEvent`], [`SettlementReceipt`], [`Transfer`]
//! - **Reviews**: [`ReviewRecord`], [`ReviewDirection`]
//! - **Configuration**: [`EngineConfig`], [`RemainderRecipient`], [`RequesterAward`]
//! - **Errors**: [`EscrowError`] with `OE_ERR_` prefix codes
//! - **Constants**: defaults and limits

pub mod account;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod milestone;
pub mod receipt;
pub mod review;
pub mod service;

// Re-export all primary types at crate root for ergonomic imports:
//   use openescrow_types::{Account, Milestone, MilestoneKey, ...};

pub use account::*;
pub use config::*;
pub use conflict::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use milestone::*;
pub use receipt::*;
pub use review::*;
pub use service::*;

// Constants are accessed via `openescrow_types::constants::FOO`
// (not re-exported to avoid name collisions).
