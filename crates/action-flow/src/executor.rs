//! Run orchestrator: the per-run phase state machine

use crate::{
    adapter::{Capability, ProviderAdapter},
    context::AdapterContext,
    errors::FlowError,
    registry::{ProviderKind, ProviderRegistry},
    types::{Phase, PhaseRecord, RunInput, RunReport},
};
use action_locator::ElementResolver;
use action_primitives::DomPort;
use async_trait::async_trait;
use chrono::Utc;
use extensions_bridge::{post_signal, HostBridge, OutwardSignal};
use parking_lot::RwLock;
use promptrelay_core_types::{LivenessSnapshot, RunContext, TimeoutScale};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrator trait
#[async_trait]
pub trait RunOrchestrator: Send + Sync {
    /// Run the phase sequence for one prompt. Posts exactly one outward
    /// signal; on failure the same error is also returned.
    async fn run(&self, input: RunInput) -> Result<RunReport, FlowError>;

    /// Extract the response of the most recent run
    async fn extract(&self) -> Result<String, FlowError>;
}

#[derive(Clone)]
struct ActiveRun {
    kind: ProviderKind,
    adapter: Arc<dyn ProviderAdapter>,
    context: AdapterContext,
}

struct PhaseJournal {
    current: Phase,
    phase_started: Instant,
    records: Vec<PhaseRecord>,
}

impl PhaseJournal {
    fn new() -> Self {
        Self {
            current: Phase::Init,
            phase_started: Instant::now(),
            records: Vec::new(),
        }
    }

    fn enter(&mut self, run: &RunContext, phase: Phase) {
        debug!(run_id = %run.run_id, %phase, "phase started");
        self.current = phase;
        self.phase_started = Instant::now();
    }

    fn complete(&mut self, run: &RunContext) {
        let record = PhaseRecord {
            phase: self.current,
            duration_ms: self.phase_started.elapsed().as_millis() as u64,
            elapsed_ms: run.elapsed().as_millis() as u64,
        };
        debug!(run_id = %run.run_id, phase = %record.phase, duration_ms = record.duration_ms, "phase completed");
        self.records.push(record);
    }
}

/// Default orchestrator implementation
pub struct WorkflowOrchestrator {
    registry: Arc<ProviderRegistry>,
    dom: Arc<dyn DomPort>,
    resolver: Arc<dyn ElementResolver>,
    host: Arc<dyn HostBridge>,
    default_scale: TimeoutScale,
    /// Held for the whole of a run; one run per process at a time
    run_lock: Mutex<()>,
    active: RwLock<Option<ActiveRun>>,
}

impl WorkflowOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        dom: Arc<dyn DomPort>,
        resolver: Arc<dyn ElementResolver>,
        host: Arc<dyn HostBridge>,
    ) -> Self {
        Self {
            registry,
            dom,
            resolver,
            host,
            default_scale: TimeoutScale::IDENTITY,
            run_lock: Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    /// Scale used when a run does not supply `timeoutModifier`
    pub fn with_default_scale(mut self, scale: TimeoutScale) -> Self {
        self.default_scale = scale;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn active_provider(&self) -> Option<ProviderKind> {
        self.active.read().as_ref().map(|active| active.kind)
    }

    /// Swap the active run, cancelling whichever run it replaces
    fn install(&self, next: Option<ActiveRun>) {
        let previous = std::mem::replace(&mut *self.active.write(), next);
        if let Some(previous) = previous {
            debug!(superseded = %previous.context.run.run_id, "previous run superseded");
            previous.context.run.cancel.cancel();
        }
    }

    fn prepare(
        &self,
        input: &RunInput,
    ) -> Result<(ProviderKind, Arc<dyn ProviderAdapter>, TimeoutScale), FlowError> {
        let (kind, adapter) = self.registry.lookup(&input.provider)?;
        if input.prompt.trim().is_empty() {
            return Err(FlowError::InvalidSettings("prompt is empty".to_string()));
        }
        Ok((kind, adapter, self.scale_for(input)?))
    }

    fn scale_for(&self, input: &RunInput) -> Result<TimeoutScale, FlowError> {
        match input.settings.as_ref().and_then(|s| s.timeout_modifier) {
            Some(modifier) => TimeoutScale::new(modifier)
                .map_err(|err| FlowError::InvalidSettings(err.to_string())),
            None => Ok(self.default_scale),
        }
    }

    async fn drive(
        &self,
        run: &mut RunContext,
        input: &RunInput,
        journal: &mut PhaseJournal,
    ) -> Result<(), FlowError> {
        journal.enter(run, Phase::Init);
        // A failed init still ends the previous run; extract must not reach it.
        let (kind, adapter, scale) = self.prepare(input).map_err(|err| {
            self.install(None);
            err
        })?;
        run.timeout_scale = scale;
        run.provider = kind.to_string();
        let ctx = AdapterContext::new(
            run.clone(),
            self.dom.clone(),
            self.resolver.clone(),
            self.host.clone(),
        );
        self.install(Some(ActiveRun {
            kind,
            adapter: adapter.clone(),
            context: ctx.clone(),
        }));
        journal.complete(run);

        if adapter.supports(Capability::ResetState) {
            journal.enter(run, Phase::ResetState);
            adapter.reset_state(&ctx).await?;
            journal.complete(run);
        }

        journal.enter(run, Phase::WaitReady);
        adapter.wait_for_ready(&ctx).await?;
        journal.complete(run);

        if let Some(settings) = &input.settings {
            let apply = settings.has_page_settings() && adapter.supports(Capability::ApplyAllSettings);
            let system_prompt = settings
                .system_prompt
                .as_deref()
                .filter(|_| adapter.supports(Capability::SetSystemPrompt));
            if apply || system_prompt.is_some() {
                journal.enter(run, Phase::ApplySettings);
                if apply {
                    adapter.apply_all_settings(&ctx, settings).await?;
                }
                if let Some(text) = system_prompt {
                    adapter.set_system_prompt(&ctx, text).await?;
                }
                journal.complete(run);
            } else if settings.has_page_settings() || settings.system_prompt.is_some() {
                warn!(run_id = %run.run_id, provider = %kind, "adapter cannot apply settings, skipping");
            }
        }

        journal.enter(run, Phase::SendPrompt);
        adapter.send_prompt(&ctx, &input.prompt).await?;
        journal.complete(run);

        journal.enter(run, Phase::NotifyReady);
        post_signal(self.host.signals().as_ref(), &OutwardSignal::ReadyForExtraction).await?;
        journal.complete(run);
        Ok(())
    }

    /// Wrap `cause`, post the single failure signal and hand the error back
    async fn fail(&self, run: &RunContext, phase: Phase, cause: FlowError) -> FlowError {
        let elapsed_ms = run.elapsed().as_millis() as u64;
        let liveness = match self.dom.liveness().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(run_id = %run.run_id, error = %err, "liveness snapshot unavailable");
                LivenessSnapshot::default()
            }
        };
        let login = cause.is_login_required();
        let error = FlowError::PhaseFailure {
            phase,
            elapsed_ms,
            liveness,
            source: Box::new(cause),
        };

        let signal = if login {
            info!(run_id = %run.run_id, %phase, "run stopped: login required");
            OutwardSignal::LoginRequired
        } else {
            warn!(
                run_id = %run.run_id,
                %phase,
                code = error.code(),
                elapsed_ms,
                error = %error,
                "automation run failed"
            );
            OutwardSignal::AutomationFailed {
                code: error.code().to_string(),
                message: error.to_string(),
                diagnostics: error.diagnostics(),
            }
        };
        if let Err(err) = post_signal(self.host.signals().as_ref(), &signal).await {
            warn!(run_id = %run.run_id, error = %err, "failed to post outward signal");
        }
        error
    }
}

#[async_trait]
impl RunOrchestrator for WorkflowOrchestrator {
    async fn run(&self, input: RunInput) -> Result<RunReport, FlowError> {
        let _serial = self.run_lock.lock().await;
        let started_at = Utc::now();
        let mut run = RunContext::new(input.provider.clone(), self.default_scale);
        let mut journal = PhaseJournal::new();
        info!(run_id = %run.run_id, provider = %input.provider, "automation run started");

        match self.drive(&mut run, &input, &mut journal).await {
            Ok(()) => {
                let report = RunReport {
                    run_id: run.run_id.to_string(),
                    provider: run.provider.clone(),
                    timeout_modifier: run.timeout_scale.factor(),
                    started_at,
                    finished_at: Utc::now(),
                    phases: journal.records,
                };
                info!(
                    run_id = %run.run_id,
                    elapsed_ms = run.elapsed().as_millis() as u64,
                    "automation run ready for extraction"
                );
                Ok(report)
            }
            Err(cause) => Err(self.fail(&run, journal.current, cause).await),
        }
    }

    async fn extract(&self) -> Result<String, FlowError> {
        let active = self.active.read().clone().ok_or(FlowError::NoActiveRun)?;
        info!(
            run_id = %active.context.run.run_id,
            provider = %active.kind,
            "extracting response"
        );
        active.adapter.extract_response(&active.context).await
    }
}
