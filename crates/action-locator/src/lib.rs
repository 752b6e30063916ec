//! Element resolution under actionability checks
//!
//! This crate implements the waiting side of element location:
//! - Prioritised locator sets evaluated in order against a scope
//! - Five-point actionability gating before anything resolves
//! - Change-driven re-checks (push or poll) under a scaled timeout
//! - Whole-wait retry for transient failures
//! - Diagnostics naming every tried locator and the failed checks

pub mod resolver;
pub mod types;

pub use resolver::*;
pub use types::*;
