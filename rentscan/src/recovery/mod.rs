// rentscan/src/recovery/mod.rs
//! Failure classification and escalation policy.
//!
//! The policy here is pure: it only decides. Carrying out a decision against
//! the transport lives in `central::recovery`.

/// Recovery levels, attempt counters and the classifier.
pub mod policy;

pub use crate::config::RecoveryConfig;
pub use policy::{ConnectionAttemptState, Failure, RecoveryLevel, RecoveryPolicy};
