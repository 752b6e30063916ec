//! Run Orchestration Layer
//!
//! Provider adapters, the closed provider registry and the orchestrator that
//! drives one automation run through its fixed phase sequence:
//! `Init → ResetState? → WaitReady → ApplySettings? → SendPrompt → NotifyReady`.

pub mod adapter;
pub mod context;
pub mod errors;
pub mod executor;
pub mod profile;
pub mod registry;
pub mod types;

pub use adapter::{Capability, ProviderAdapter};
pub use context::AdapterContext;
pub use errors::FlowError;
pub use executor::{RunOrchestrator, WorkflowOrchestrator};
pub use profile::{
    AdapterTuning, ChoiceControl, ProfileAdapter, ProfileTimeouts, ProviderProfile,
    SettingsControls, TextControl,
};
pub use registry::{ProviderKind, ProviderRegistry};
pub use types::{Phase, PhaseRecord, RunInput, RunReport, RunSettings};
