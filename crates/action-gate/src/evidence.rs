//! Marker evidence attached to completion timeouts

use action_locator::PresenceCount;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse reading of a completion timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// The start marker never appeared
    NeverStarted,
    /// Generation began (or no start marker exists) but never reached the terminal state
    NeverFinished,
}

/// Snapshot of the relevant markers at the moment the wait gave up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvidence {
    pub condition: String,
    /// Current match count of every locator involved
    pub markers: Vec<PresenceCount>,
    pub start_marker_seen: Option<bool>,
    pub elapsed_ms: u64,
    pub diagnosis: Diagnosis,
}

impl MarkerEvidence {
    pub fn new(
        condition: String,
        markers: Vec<PresenceCount>,
        start_marker_seen: Option<bool>,
        elapsed_ms: u64,
    ) -> Self {
        let diagnosis = match start_marker_seen {
            Some(false) => Diagnosis::NeverStarted,
            _ => Diagnosis::NeverFinished,
        };
        Self {
            condition,
            markers,
            start_marker_seen,
            elapsed_ms,
            diagnosis,
        }
    }

    pub fn count_of(&self, locator: &str) -> Option<usize> {
        self.markers
            .iter()
            .find(|marker| marker.locator == locator)
            .map(|marker| marker.count)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_start_marker_means_never_started() {
        let evidence = MarkerEvidence::new(
            "absent [.stop]".to_string(),
            vec![PresenceCount {
                locator: ".stop".to_string(),
                count: 0,
            }],
            Some(false),
            3_000,
        );
        assert_eq!(evidence.diagnosis, Diagnosis::NeverStarted);
        assert_eq!(evidence.count_of(".stop"), Some(0));
        assert_eq!(evidence.to_value()["diagnosis"], "never_started");
    }

    #[test]
    fn seen_or_unconfigured_start_means_never_finished() {
        let seen = MarkerEvidence::new(String::new(), vec![], Some(true), 1);
        let none = MarkerEvidence::new(String::new(), vec![], None, 1);
        assert_eq!(seen.diagnosis, Diagnosis::NeverFinished);
        assert_eq!(none.diagnosis, Diagnosis::NeverFinished);
    }
}
