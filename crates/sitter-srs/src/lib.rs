//! Sitter reliability scoring and tier evaluation.
//!
//! The crate computes the Sitter Reliability Score (SRS) from operational
//! event streams, persists daily tier snapshots, and runs the weekly tier
//! evaluations that drive promotions, demotions, at-risk flags, and pay-raise
//! eligibility. Persistence and event access sit behind ports so the engine
//! stays storage-agnostic.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod tiers;
