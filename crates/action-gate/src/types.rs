//! Core types for the finalization gate

use crate::conditions::FinalizationCondition;
use action_locator::LocatorSet;
use action_primitives::Scope;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_FINALIZATION_TIMEOUT: Duration = Duration::from_secs(120);

/// What "the response is done" means for one provider
///
/// Durations are base values; the run's timeout scale is applied at wait time.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizationSpec {
    pub condition: FinalizationCondition,

    /// Marker that shows generation has begun (e.g. a stop button)
    pub started: Option<LocatorSet>,

    /// How long to wait for `started`. With only `absent` leaves an unseen
    /// marker ends the wait as never started.
    pub start_timeout: Duration,

    /// Budget for the terminal condition
    pub timeout: Duration,

    pub scope: Scope,
}

impl FinalizationSpec {
    pub fn new(condition: FinalizationCondition) -> Self {
        Self {
            condition,
            started: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            timeout: DEFAULT_FINALIZATION_TIMEOUT,
            scope: Scope::Document,
        }
    }

    pub fn with_started(mut self, marker: LocatorSet) -> Self {
        self.started = Some(marker);
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn within(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Successful completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizationReport {
    pub elapsed_ms: u64,
    /// `None` when no start marker was configured
    pub start_marker_seen: Option<bool>,
}
