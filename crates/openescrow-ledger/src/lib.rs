//! # openescrow-ledger
//!
//! The money side of the escrow engine. Every balance change in the system
//! goes through [`Ledger`]:
//!
//! 1. `credit` / `withdraw` move funds in and out of custody
//! 2. `approve` sets the standing cap the operator may freeze
//! 3. `freeze` reserves funds against a milestone
//! 4. `release` / `split` settle frozen funds to their final owner(s)
//!
//! [`SupplyConservation`] tracks credits and withdrawals so that
//! `Σ(available + frozen) == credits − withdrawals` can be checked after
//! any settlement.

pub mod ledger;
pub mod supply_conservation;

pub use ledger::Ledger;
pub use supply_conservation::SupplyConservation;
