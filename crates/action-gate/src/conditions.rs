//! Terminal conditions for response completion

use action_locator::LocatorSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Provider-defined terminal condition
///
/// Tagged by `kind` so profiles can write
/// `{ kind: absent, locators: [".stop-button"] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalizationCondition {
    /// Busy/stop indicator no longer rendered
    Absent { locators: LocatorSet },

    /// Post-response affordance rendered, not in its alternate (busy) state,
    /// and unchanged for `settle_ms`
    StablePresent {
        marker: LocatorSet,
        #[serde(default)]
        busy: Option<LocatorSet>,
        #[serde(default = "default_settle_ms")]
        settle_ms: u64,
    },

    /// Every nested condition holds at the same time
    AllOf { conditions: Vec<FinalizationCondition> },
}

fn default_settle_ms() -> u64 {
    500
}

/// Leaf condition after flattening `AllOf`
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Leaf {
    Absent(LocatorSet),
    StablePresent {
        marker: LocatorSet,
        busy: Option<LocatorSet>,
        settle: Duration,
    },
}

impl Leaf {
    /// Holds only on positive evidence that the response exists
    pub(crate) fn is_positive(&self) -> bool {
        matches!(self, Leaf::StablePresent { .. })
    }
}

impl FinalizationCondition {
    pub fn absent(locators: LocatorSet) -> Self {
        FinalizationCondition::Absent { locators }
    }

    pub fn all_of(conditions: Vec<FinalizationCondition>) -> Self {
        FinalizationCondition::AllOf { conditions }
    }

    pub fn stable_present(marker: LocatorSet) -> Self {
        FinalizationCondition::StablePresent {
            marker,
            busy: None,
            settle_ms: default_settle_ms(),
        }
    }

    pub(crate) fn leaves(&self) -> Vec<Leaf> {
        match self {
            FinalizationCondition::Absent { locators } => vec![Leaf::Absent(locators.clone())],
            FinalizationCondition::StablePresent {
                marker,
                busy,
                settle_ms,
            } => vec![Leaf::StablePresent {
                marker: marker.clone(),
                busy: busy.clone(),
                settle: Duration::from_millis(*settle_ms),
            }],
            FinalizationCondition::AllOf { conditions } => {
                conditions.iter().flat_map(|condition| condition.leaves()).collect()
            }
        }
    }

    /// Every locator the condition mentions, for evidence collection
    pub fn locators(&self) -> LocatorSet {
        let mut all: Vec<String> = Vec::new();
        for leaf in self.leaves() {
            let mentioned = match leaf {
                Leaf::Absent(locators) => locators.to_vec(),
                Leaf::StablePresent { marker, busy, .. } => marker
                    .to_vec()
                    .into_iter()
                    .chain(busy.map(|busy| busy.to_vec()).unwrap_or_default())
                    .collect(),
            };
            for locator in mentioned {
                if !all.contains(&locator) {
                    all.push(locator);
                }
            }
        }
        LocatorSet::new(all)
    }
}

impl fmt::Display for FinalizationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizationCondition::Absent { locators } => write!(f, "absent {}", locators),
            FinalizationCondition::StablePresent {
                marker, settle_ms, ..
            } => write!(f, "stable {} for {}ms", marker, settle_ms),
            FinalizationCondition::AllOf { conditions } => {
                let parts: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                write!(f, "all of ({})", parts.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_of_flattens_nested_leaves() {
        let condition = FinalizationCondition::all_of(vec![
            FinalizationCondition::absent(LocatorSet::single(".stop")),
            FinalizationCondition::all_of(vec![FinalizationCondition::stable_present(
                LocatorSet::single(".copy"),
            )]),
        ]);
        assert_eq!(condition.leaves().len(), 2);
        assert_eq!(
            condition.locators().iter().collect::<Vec<_>>(),
            vec![".stop", ".copy"]
        );
        assert!(condition.to_string().starts_with("all of"));
    }

    #[test]
    fn deserialises_tagged_shape() {
        let condition: FinalizationCondition = serde_json::from_value(serde_json::json!({
            "kind": "stable_present", "marker": ["button.copy"], "busy": [".spinner"]
        }))
        .unwrap();
        match condition {
            FinalizationCondition::StablePresent { busy, settle_ms, .. } => {
                assert_eq!(busy, Some(LocatorSet::single(".spinner")));
                assert_eq!(settle_ms, 500);
            }
            other => panic!("unexpected {other:?}"),
        }

        let absent: FinalizationCondition =
            serde_json::from_value(serde_json::json!({ "kind": "absent", "locators": [".stop"] }))
                .unwrap();
        assert_eq!(absent, FinalizationCondition::absent(LocatorSet::single(".stop")));
    }
}
