//! Change notification: push (mutation feed) or poll (fixed interval)
//!
//! Both implementations feed the same re-check loop; callers only see
//! [`ChangeNotifier::changed`].

use crate::{
    dom::DomPort,
    types::{DomMutation, Scope},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a notifier woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    /// Something inside the scope changed
    Mutation,
    /// Polling interval elapsed
    Tick,
    /// The underlying feed went away; no further signals will arrive
    Closed,
}

#[async_trait]
pub trait ChangeNotifier: Send {
    async fn changed(&mut self) -> ChangeSignal;

    fn kind(&self) -> &'static str;
}

/// Push notifier backed by the document's mutation feed
pub struct MutationNotifier {
    receiver: broadcast::Receiver<DomMutation>,
    scope: Scope,
}

impl MutationNotifier {
    pub fn new(receiver: broadcast::Receiver<DomMutation>, scope: Scope) -> Self {
        Self { receiver, scope }
    }
}

#[async_trait]
impl ChangeNotifier for MutationNotifier {
    async fn changed(&mut self) -> ChangeSignal {
        loop {
            match self.receiver.recv().await {
                Ok(mutation) if self.scope.covers(&mutation) => return ChangeSignal::Mutation,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // Dropped records may have touched the scope.
                    debug!(skipped, "mutation feed lagged");
                    return ChangeSignal::Mutation;
                }
                Err(RecvError::Closed) => return ChangeSignal::Closed,
            }
        }
    }

    fn kind(&self) -> &'static str {
        "mutation"
    }
}

/// Poll notifier firing on a fixed interval
pub struct PollingNotifier {
    interval: Interval,
}

impl PollingNotifier {
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Default for PollingNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl ChangeNotifier for PollingNotifier {
    async fn changed(&mut self) -> ChangeSignal {
        self.interval.tick().await;
        ChangeSignal::Tick
    }

    fn kind(&self) -> &'static str {
        "polling"
    }
}

/// Which notifier to build for a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierStrategy {
    Mutation,
    Polling { interval_ms: u64 },
}

impl Default for NotifierStrategy {
    fn default() -> Self {
        NotifierStrategy::Mutation
    }
}

impl NotifierStrategy {
    pub fn poll_interval(&self) -> Duration {
        match self {
            NotifierStrategy::Polling { interval_ms } => Duration::from_millis(*interval_ms),
            NotifierStrategy::Mutation => DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Build a notifier for `scope`. `Mutation` degrades to polling when the port
/// has no feed.
pub fn open_notifier(
    dom: &dyn DomPort,
    scope: Scope,
    strategy: NotifierStrategy,
) -> Box<dyn ChangeNotifier> {
    match strategy {
        NotifierStrategy::Mutation => match dom.subscribe() {
            Some(receiver) => Box::new(MutationNotifier::new(receiver, scope)),
            None => {
                debug!(%scope, "no mutation feed, falling back to polling");
                Box::new(PollingNotifier::default())
            }
        },
        NotifierStrategy::Polling { .. } => Box::new(PollingNotifier::new(strategy.poll_interval())),
    }
}
