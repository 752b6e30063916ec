//! Core types for element resolution

use action_primitives::{ActionabilityVerdict, Scope};
use promptrelay_core_types::NodeRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered locators for one logical target; earlier entries win
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorSet(Vec<String>);

impl LocatorSet {
    pub fn new<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(locators.into_iter().map(Into::into).collect())
    }

    pub fn single(locator: impl Into<String>) -> Self {
        Self(vec![locator.into()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: Into<String>> FromIterator<S> for LocatorSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for LocatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// One resolution attempt, described as a value
#[derive(Debug, Clone, PartialEq)]
pub struct WaitRequest {
    /// Human-readable name used in logs and diagnostics
    pub target: String,
    pub locators: LocatorSet,
    pub scope: Scope,
    /// Base timeout, before run scaling
    pub timeout: Duration,
    /// Whole-wait retries for transient failures
    pub retries: u32,
}

impl WaitRequest {
    pub fn new(target: impl Into<String>, locators: LocatorSet) -> Self {
        Self {
            target: target.into(),
            locators,
            scope: Scope::Document,
            timeout: DEFAULT_WAIT_TIMEOUT,
            retries: 0,
        }
    }

    pub fn within(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Element that passed all five checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    pub node: NodeRef,
    /// Locator that produced the match
    pub locator: String,
    /// Its position in the locator set
    pub locator_index: usize,
    pub verdict: ActionabilityVerdict,
}

/// How many nodes one locator currently matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceCount {
    pub locator: String,
    pub count: usize,
}
