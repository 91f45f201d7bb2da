//! Sieve Core - prediction model and tiered decision policy.
//!
//! This crate has no I/O. It turns the five scores returned by the remote
//! classifier into a [`Disposition`] and a [`DecisionTrace`] explaining it.

pub mod decision;
pub mod prediction;

pub use decision::{decide, Decision, DecisionTrace, FlagGroup, RiskLevel, Rule};
pub use prediction::{Disposition, Prediction};
