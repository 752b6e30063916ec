//! Element resolver: locator priority, actionability, change-driven waiting

use crate::types::*;
use action_primitives::{
    open_notifier, ActionError, ActionabilityChecker, ActionabilityVerdict, ChangeSignal, DomPort,
    NotifierStrategy, PollingNotifier, RetryError, RetryPolicy, RetrySupervisor, Scope,
    WaitDiagnostics,
};
use async_trait::async_trait;
use promptrelay_core_types::{NodeRef, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Safety re-check while waiting on a push feed. Covers changes outside the
/// watched scope that still affect hit-testing.
pub const RECHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Wait until some locator yields an actionable element
    async fn resolve(
        &self,
        ctx: &RunContext,
        request: &WaitRequest,
    ) -> Result<ResolvedElement, ActionError>;

    /// Current match count per locator, without actionability
    async fn resolve_all_present(
        &self,
        locators: &LocatorSet,
        scope: Scope,
    ) -> Result<Vec<PresenceCount>, ActionError>;

    /// One-shot: first node of the first locator that matches anything
    async fn find_first(
        &self,
        scope: Scope,
        locators: &LocatorSet,
    ) -> Result<Option<(usize, NodeRef)>, ActionError>;
}

/// What one evaluation pass saw
#[derive(Debug, Default)]
struct Pass {
    resolved: Option<ResolvedElement>,
    /// First matched element that failed a check
    first_failure: Option<(String, ActionabilityVerdict)>,
}

enum Wake {
    Changed(ChangeSignal),
    Recheck,
    Deadline,
    Cancelled,
}

/// Default element resolver implementation
pub struct DefaultElementResolver {
    dom: Arc<dyn DomPort>,
    checker: ActionabilityChecker,
    strategy: NotifierStrategy,
    retry_base_delay: Duration,
}

impl DefaultElementResolver {
    pub fn new(dom: Arc<dyn DomPort>) -> Self {
        Self {
            checker: ActionabilityChecker::new(dom.clone()),
            dom,
            strategy: NotifierStrategy::default(),
            retry_base_delay: Duration::from_millis(RetryPolicy::default().base_delay_ms),
        }
    }

    pub fn with_strategy(mut self, strategy: NotifierStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn evaluate(&self, ctx: &RunContext, request: &WaitRequest) -> Result<Pass, ActionError> {
        let mut pass = Pass::default();
        for (index, locator) in request.locators.iter().enumerate() {
            let nodes = self.dom.query_all(request.scope, locator).await?;
            for node in nodes {
                let verdict = self.checker.check(ctx, node).await?;
                if verdict.is_actionable() {
                    pass.resolved = Some(ResolvedElement {
                        node,
                        locator: locator.to_string(),
                        locator_index: index,
                        verdict,
                    });
                    return Ok(pass);
                }
                if pass.first_failure.is_none() {
                    pass.first_failure = Some((locator.to_string(), verdict));
                }
            }
        }
        Ok(pass)
    }

    async fn wait_once(
        &self,
        ctx: &RunContext,
        request: &WaitRequest,
    ) -> Result<ResolvedElement, ActionError> {
        let started = Instant::now();
        let deadline = started + ctx.scaled(request.timeout);
        let mut notifier = open_notifier(self.dom.as_ref(), request.scope, self.strategy);
        let mut recheck = interval_at(started + RECHECK_INTERVAL, RECHECK_INTERVAL);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pass = self.evaluate(ctx, request).await?;
            if let Some(resolved) = pass.resolved {
                info!(
                    element = %request.target,
                    locator = %resolved.locator,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "element resolved"
                );
                return Ok(resolved);
            }
            if Instant::now() >= deadline {
                break;
            }

            let wake = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Wake::Cancelled,
                _ = sleep_until(deadline) => Wake::Deadline,
                signal = notifier.changed() => Wake::Changed(signal),
                _ = recheck.tick() => Wake::Recheck,
            };
            match wake {
                Wake::Cancelled => {
                    return Err(ActionError::Interrupted(format!(
                        "run cancelled while waiting for '{}'",
                        request.target
                    )))
                }
                Wake::Deadline => break,
                Wake::Changed(ChangeSignal::Closed) => {
                    debug!(element = %request.target, "change feed closed, switching to polling");
                    notifier = Box::new(PollingNotifier::new(self.strategy.poll_interval()));
                }
                Wake::Changed(_) | Wake::Recheck => {}
            }
        }

        // Final pass for diagnostics; a last-moment success still counts.
        let pass = self.evaluate(ctx, request).await?;
        if let Some(resolved) = pass.resolved {
            return Ok(resolved);
        }

        let mut diagnostics = WaitDiagnostics {
            target: request.target.clone(),
            locators: request.locators.to_vec(),
            scope: request.scope.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempts: 1,
            ..Default::default()
        };
        let err = match pass.first_failure {
            Some((locator, verdict)) => {
                diagnostics.matched_locator = Some(locator);
                diagnostics.failed_checks = verdict.failed_checks();
                diagnostics.detail = verdict.detail;
                ActionError::NotActionable(Box::new(diagnostics))
            }
            None => ActionError::NotFound(Box::new(diagnostics)),
        };
        warn!(element = %request.target, code = err.code(), "wait timed out: {}", err);
        Err(err)
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve(
        &self,
        ctx: &RunContext,
        request: &WaitRequest,
    ) -> Result<ResolvedElement, ActionError> {
        debug!(
            element = %request.target,
            locators = %request.locators,
            scope = %request.scope,
            timeout_ms = ctx.scaled(request.timeout).as_millis() as u64,
            "resolving element"
        );
        if request.retries == 0 {
            return self.wait_once(ctx, request).await;
        }

        let policy = RetryPolicy::new(request.retries, self.retry_base_delay);
        RetrySupervisor::new(policy)
            .cancel_on(ctx.cancel.clone())
            .run(
                &request.target,
                |_| self.wait_once(ctx, request),
                ActionError::is_retryable,
            )
            .await
            .map_err(|err: RetryError<ActionError>| {
                let attempts = err.attempts;
                err.into_inner().with_attempts(attempts)
            })
    }

    async fn resolve_all_present(
        &self,
        locators: &LocatorSet,
        scope: Scope,
    ) -> Result<Vec<PresenceCount>, ActionError> {
        let mut counts = Vec::with_capacity(locators.len());
        for locator in locators.iter() {
            let count = self.dom.query_all(scope, locator).await?.len();
            counts.push(PresenceCount {
                locator: locator.to_string(),
                count,
            });
        }
        Ok(counts)
    }

    async fn find_first(
        &self,
        scope: Scope,
        locators: &LocatorSet,
    ) -> Result<Option<(usize, NodeRef)>, ActionError> {
        for (index, locator) in locators.iter().enumerate() {
            if let Some(node) = self.dom.query_all(scope, locator).await?.into_iter().next() {
                return Ok(Some((index, node)));
            }
        }
        Ok(None)
    }
}
