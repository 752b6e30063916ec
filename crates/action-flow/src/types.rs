//! Core types for run orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied settings for one run
///
/// Field names follow the host's camelCase wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunSettings {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub thinking_budget: Option<u32>,
    pub use_web_search: Option<bool>,
    pub disable_thinking: Option<bool>,
    pub url_context: Option<bool>,
    /// Multiplier applied to every base timeout of the run
    pub timeout_modifier: Option<f64>,
}

impl RunSettings {
    /// True when anything besides the timeout modifier and system prompt is set
    pub fn has_page_settings(&self) -> bool {
        self.model.is_some()
            || self.temperature.is_some()
            || self.top_p.is_some()
            || self.thinking_budget.is_some()
            || self.use_web_search.is_some()
            || self.disable_thinking.is_some()
            || self.url_context.is_some()
    }
}

/// Run input contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    /// Provider identifier, e.g. `"aistudio"`
    pub provider: String,
    pub prompt: String,
    #[serde(default)]
    pub settings: Option<RunSettings>,
}

impl RunInput {
    pub fn new(provider: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            prompt: prompt.into(),
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Orchestrator phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    ResetState,
    WaitReady,
    ApplySettings,
    SendPrompt,
    NotifyReady,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::ResetState => "reset_state",
            Phase::WaitReady => "wait_ready",
            Phase::ApplySettings => "apply_settings",
            Phase::SendPrompt => "send_prompt",
            Phase::NotifyReady => "notify_ready",
        }
    }

    /// Machine code reported when this phase fails
    pub fn failure_code(&self) -> &'static str {
        match self {
            Phase::Init => "INIT_FAILED",
            Phase::ResetState => "RESET_STATE_FAILED",
            Phase::WaitReady => "WAIT_READY_FAILED",
            Phase::ApplySettings => "APPLY_SETTINGS_FAILED",
            Phase::SendPrompt => "SEND_PROMPT_FAILED",
            Phase::NotifyReady => "NOTIFY_READY_FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One completed phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    /// Time spent in the phase
    pub duration_ms: u64,
    /// Run time elapsed when the phase completed
    pub elapsed_ms: u64,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub provider: String,
    pub timeout_modifier: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
}

impl RunReport {
    pub fn phase_order(&self) -> Vec<Phase> {
        self.phases.iter().map(|record| record.phase).collect()
    }
}
