//! Finalization gate: wait for a provider's terminal condition

use crate::{
    conditions::Leaf,
    evidence::MarkerEvidence,
    types::{FinalizationReport, FinalizationSpec},
};
use action_locator::{ElementResolver, LocatorSet};
use action_primitives::{
    open_notifier, ActionError, ChangeNotifier, ChangeSignal, DomPort, NotifierStrategy,
    PollingNotifier, Scope,
};
use promptrelay_core_types::{NodeRef, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const RECHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Per-leaf bookkeeping for stability tracking
#[derive(Debug, Default, Clone)]
struct LeafState {
    fingerprint: Option<(NodeRef, String)>,
    since: Option<Instant>,
}

impl LeafState {
    fn reset(&mut self) {
        self.fingerprint = None;
        self.since = None;
    }
}

enum Wake {
    Cancelled,
    Deadline,
    Due,
    Changed(ChangeSignal),
    Recheck,
}

struct Watch {
    notifier: Box<dyn ChangeNotifier>,
    recheck: Interval,
    strategy: NotifierStrategy,
}

impl Watch {
    fn open(dom: &dyn DomPort, scope: Scope, strategy: NotifierStrategy) -> Self {
        let start = Instant::now() + RECHECK_INTERVAL;
        let mut recheck = interval_at(start, RECHECK_INTERVAL);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            notifier: open_notifier(dom, scope, strategy),
            recheck,
            strategy,
        }
    }

    /// Suspend until something may have changed. Returns `false` once the
    /// deadline has passed.
    async fn next(
        &mut self,
        ctx: &RunContext,
        deadline: Instant,
        due: Option<Instant>,
    ) -> Result<bool, ActionError> {
        let due = due.unwrap_or(deadline).min(deadline);
        let wake = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Wake::Cancelled,
            _ = sleep_until(deadline) => Wake::Deadline,
            _ = sleep_until(due) => Wake::Due,
            signal = self.notifier.changed() => Wake::Changed(signal),
            _ = self.recheck.tick() => Wake::Recheck,
        };
        match wake {
            Wake::Cancelled => Err(ActionError::Interrupted(
                "run cancelled while waiting for completion".to_string(),
            )),
            Wake::Deadline => Ok(false),
            Wake::Changed(ChangeSignal::Closed) => {
                debug!("change feed closed, switching to polling");
                self.notifier = Box::new(PollingNotifier::new(self.strategy.poll_interval()));
                Ok(true)
            }
            Wake::Due | Wake::Changed(_) | Wake::Recheck => Ok(true),
        }
    }
}

/// Waits for a provider-defined terminal condition
pub struct FinalizationGate {
    dom: Arc<dyn DomPort>,
    resolver: Arc<dyn ElementResolver>,
    strategy: NotifierStrategy,
}

impl FinalizationGate {
    pub fn new(dom: Arc<dyn DomPort>, resolver: Arc<dyn ElementResolver>) -> Self {
        Self {
            dom,
            resolver,
            strategy: NotifierStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: NotifierStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub async fn wait(
        &self,
        ctx: &RunContext,
        spec: &FinalizationSpec,
    ) -> Result<FinalizationReport, ActionError> {
        let started = Instant::now();
        let deadline = started + ctx.scaled(spec.timeout);
        let leaves = spec.condition.leaves();
        let mut states = vec![LeafState::default(); leaves.len()];
        let mut watch = Watch::open(self.dom.as_ref(), spec.scope, self.strategy);

        info!(
            run_id = %ctx.run_id,
            condition = %spec.condition,
            timeout_ms = ctx.scaled(spec.timeout).as_millis() as u64,
            "waiting for finalization"
        );

        // Phase one: bounded wait for the start marker so an `absent` busy
        // indicator is not satisfied before generation begins.
        let mut start_seen = None;
        if let Some(marker) = &spec.started {
            let start_deadline = (started + ctx.scaled(spec.start_timeout)).min(deadline);
            let mut seen = false;
            loop {
                if self.any_rendered(spec.scope, marker).await? {
                    seen = true;
                    break;
                }
                if Instant::now() >= start_deadline || !watch.next(ctx, start_deadline, None).await? {
                    break;
                }
            }
            start_seen = Some(seen);
            // `absent` alone cannot tell "finished" from "never began".
            if !seen && !leaves.iter().any(Leaf::is_positive) {
                return Err(self.timed_out(ctx, spec, start_seen, started).await);
            }
            if !seen {
                debug!(run_id = %ctx.run_id, "start marker not observed, continuing");
            }
        }

        loop {
            if let (Some(marker), Some(false)) = (&spec.started, start_seen) {
                if self.any_rendered(spec.scope, marker).await? {
                    start_seen = Some(true);
                }
            }

            let (met, due) = self
                .evaluate(ctx, spec.scope, &leaves, &mut states)
                .await?;
            if met {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(run_id = %ctx.run_id, elapsed_ms, "response finalized");
                return Ok(FinalizationReport {
                    elapsed_ms,
                    start_marker_seen: start_seen,
                });
            }
            if Instant::now() >= deadline || !watch.next(ctx, deadline, due).await? {
                break;
            }
        }

        Err(self.timed_out(ctx, spec, start_seen, started).await)
    }

    async fn timed_out(
        &self,
        ctx: &RunContext,
        spec: &FinalizationSpec,
        start_seen: Option<bool>,
        started: Instant,
    ) -> ActionError {
        let mut locators = spec.condition.locators().to_vec();
        if let Some(marker) = &spec.started {
            locators.extend(marker.to_vec());
        }
        let markers = match self
            .resolver
            .resolve_all_present(&LocatorSet::new(locators), spec.scope)
            .await
        {
            Ok(markers) => markers,
            Err(err) => return err,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let evidence = MarkerEvidence::new(spec.condition.to_string(), markers, start_seen, elapsed_ms);
        warn!(
            run_id = %ctx.run_id,
            elapsed_ms,
            diagnosis = ?evidence.diagnosis,
            "finalization timed out"
        );
        ActionError::Timeout {
            operation: "finalization".to_string(),
            elapsed_ms,
            evidence: Some(evidence.to_value()),
        }
    }

    /// Evaluate every leaf. Returns whether all hold and the earliest instant
    /// at which a settling leaf could complete.
    async fn evaluate(
        &self,
        ctx: &RunContext,
        scope: Scope,
        leaves: &[Leaf],
        states: &mut [LeafState],
    ) -> Result<(bool, Option<Instant>), ActionError> {
        let now = Instant::now();
        let mut all_met = true;
        let mut due: Option<Instant> = None;

        for (leaf, state) in leaves.iter().zip(states.iter_mut()) {
            let met = match leaf {
                Leaf::Absent(locators) => !self.any_rendered(scope, locators).await?,
                Leaf::StablePresent {
                    marker,
                    busy,
                    settle,
                } => {
                    let busy_now = match busy {
                        Some(busy) => self.any_rendered(scope, busy).await?,
                        None => false,
                    };
                    let node = match busy_now {
                        true => None,
                        false => self.last_rendered(scope, marker).await?,
                    };
                    match node {
                        None => {
                            state.reset();
                            false
                        }
                        Some(node) => {
                            let settle = ctx.scaled(*settle);
                            let text = self.dom.text_content(node).await?;
                            let fingerprint = Some((node, text));
                            if state.fingerprint != fingerprint {
                                state.fingerprint = fingerprint;
                                state.since = Some(now);
                            }
                            let since = state.since.unwrap_or(now);
                            if now.duration_since(since) >= settle {
                                true
                            } else {
                                let ready_at = since + settle;
                                due = Some(due.map_or(ready_at, |d| d.min(ready_at)));
                                false
                            }
                        }
                    }
                }
            };
            all_met &= met;
        }
        Ok((all_met, due))
    }

    async fn rendered(&self, node: NodeRef) -> Result<bool, ActionError> {
        let probe = match self.dom.probe(node).await {
            Ok(probe) => probe,
            Err(ActionError::UnknownNode(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        Ok(probe.connected
            && !probe.display_none
            && !probe.visibility_hidden
            && !probe.rect.is_empty()
            && probe.check_visibility != Some(false))
    }

    async fn any_rendered(&self, scope: Scope, locators: &LocatorSet) -> Result<bool, ActionError> {
        Ok(self.last_rendered(scope, locators).await?.is_some())
    }

    /// Last rendered match of the first locator that has one
    async fn last_rendered(
        &self,
        scope: Scope,
        locators: &LocatorSet,
    ) -> Result<Option<NodeRef>, ActionError> {
        for locator in locators.iter() {
            let nodes = self.dom.query_all(scope, locator).await?;
            for node in nodes.into_iter().rev() {
                if self.rendered(node).await? {
                    return Ok(Some(node));
                }
            }
        }
        Ok(None)
    }
}
