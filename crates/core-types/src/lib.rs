//! Shared primitives for the promptrelay engine crates.
//!
//! Identifiers, layout geometry, timeout scaling and the per-run context that
//! every wait in an automation run is threaded through.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error raised when a caller hands in an unusable primitive value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid timeout modifier: {0}")]
    InvalidTimeoutModifier(f64),
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a node of the live document.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u64);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Viewport-relative layout box.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Multiplier applied to every base duration of a run.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeoutScale(f64);

impl TimeoutScale {
    pub const IDENTITY: TimeoutScale = TimeoutScale(1.0);

    pub fn new(factor: f64) -> Result<Self, CoreError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CoreError::InvalidTimeoutModifier(factor));
        }
        Ok(Self(factor))
    }

    pub fn factor(&self) -> f64 {
        self.0
    }

    pub fn apply(&self, base: Duration) -> Duration {
        let nanos = (base.as_nanos() as f64 * self.0).round();
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
    }
}

impl Default for TimeoutScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Lightweight picture of the document used in failure diagnostics.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LivenessSnapshot {
    pub url: Option<String>,
    pub ready_state: Option<String>,
    pub node_count: usize,
}

/// Per-run values set once at run start and read by every wait of that run.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: RunId,
    pub provider: String,
    pub timeout_scale: TimeoutScale,
    pub started_at: Instant,
    /// Cancelled once a later run starts, even one that fails in init. Every
    /// suspension point races it.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(provider: impl Into<String>, timeout_scale: TimeoutScale) -> Self {
        Self {
            run_id: RunId::new(),
            provider: provider.into(),
            timeout_scale,
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Context with identity scaling, used outside of orchestrated runs.
    pub fn detached() -> Self {
        Self::new("detached", TimeoutScale::IDENTITY)
    }

    pub fn scaled(&self, base: Duration) -> Duration {
        self.timeout_scale.apply(base)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
