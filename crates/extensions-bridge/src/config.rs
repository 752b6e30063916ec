//! Host capability configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Offer a clipboard capability to the engine
    pub clipboard: bool,

    /// Capacity of the observer event bus
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            clipboard: true,
            event_capacity: 256,
        }
    }
}
