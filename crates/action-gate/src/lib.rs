//! Completion gate - waiting for a provider's terminal condition
//!
//! This crate implements the "wait for finalization" step that follows a
//! prompt submission:
//! - Terminal conditions (indicator absent, affordance stable, conjunctions)
//! - Optional start-marker wait so idle pages are not mistaken for finished ones
//! - Change-driven re-evaluation under a scaled timeout
//! - Marker-count evidence separating never-started from never-finished

pub mod conditions;
pub mod evidence;
pub mod types;
pub mod validator;

pub use conditions::FinalizationCondition;
pub use evidence::*;
pub use types::*;
pub use validator::*;
