//! Closed provider registry

use crate::{
    adapter::ProviderAdapter,
    errors::FlowError,
    profile::{AdapterTuning, ProfileAdapter, ProviderProfile},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AiStudio,
    ChatGpt,
    Claude,
    Gemini,
    Generic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::AiStudio,
        ProviderKind::ChatGpt,
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AiStudio => "aistudio",
            ProviderKind::ChatGpt => "chatgpt",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Generic => "generic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::AiStudio => "Google AI Studio",
            ProviderKind::ChatGpt => "ChatGPT",
            ProviderKind::Claude => "Claude",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Generic => "Generic chat",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aistudio" | "ai-studio" | "ai_studio" => Ok(ProviderKind::AiStudio),
            "chatgpt" | "openai" => Ok(ProviderKind::ChatGpt),
            "claude" => Ok(ProviderKind::Claude),
            "gemini" => Ok(ProviderKind::Gemini),
            "generic" => Ok(ProviderKind::Generic),
            _ => Err(FlowError::UnknownProvider(s.to_string())),
        }
    }
}

/// Maps each provider kind to its adapter
pub struct ProviderRegistry {
    profiles: HashMap<ProviderKind, ProviderProfile>,
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    tuning: AdapterTuning,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("profiles", &self.profiles)
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl ProviderRegistry {
    /// Every kind backed by the generic profile
    pub fn builtin(tuning: AdapterTuning) -> Self {
        let profiles = ProviderKind::ALL
            .iter()
            .map(|kind| (*kind, ProviderProfile::generic(kind.display_name())))
            .collect();
        Self {
            profiles,
            adapters: HashMap::new(),
            tuning,
        }
    }

    /// Replace the profile for `kind`
    pub fn with_profile(mut self, kind: ProviderKind, profile: ProviderProfile) -> Self {
        debug!(provider = %kind, "profile override registered");
        self.adapters.remove(&kind);
        self.profiles.insert(kind, profile);
        self
    }

    /// Serve `kind` with a hand-written adapter instead of its profile
    pub fn with_adapter(mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    pub fn profile(&self, kind: ProviderKind) -> Option<&ProviderProfile> {
        self.profiles.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.profiles.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn adapter(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>, FlowError> {
        if let Some(adapter) = self.adapters.get(&kind) {
            return Ok(adapter.clone());
        }
        let profile = self
            .profiles
            .get(&kind)
            .ok_or_else(|| FlowError::UnknownProvider(kind.to_string()))?;
        Ok(Arc::new(ProfileAdapter::new(
            kind.as_str(),
            profile.clone(),
            self.tuning,
        )))
    }

    /// Parse `identifier` and build its adapter
    pub fn lookup(
        &self,
        identifier: &str,
    ) -> Result<(ProviderKind, Arc<dyn ProviderAdapter>), FlowError> {
        let kind: ProviderKind = identifier.parse()?;
        Ok((kind, self.adapter(kind)?))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin(AdapterTuning::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Capability;
    use action_locator::LocatorSet;

    #[test]
    fn identifiers_parse_case_insensitively() {
        assert_eq!("AIStudio".parse::<ProviderKind>().unwrap(), ProviderKind::AiStudio);
        assert_eq!(" chatgpt ".parse::<ProviderKind>().unwrap(), ProviderKind::ChatGpt);
        let err = "bard".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PROVIDER");
    }

    #[test]
    fn builtin_registry_serves_every_kind() {
        let registry = ProviderRegistry::default();
        assert_eq!(registry.kinds(), ProviderKind::ALL.to_vec());
        for kind in ProviderKind::ALL {
            let adapter = registry.adapter(kind).unwrap();
            assert_eq!(adapter.name(), kind.as_str());
            assert!(adapter.capabilities().is_empty());
        }
    }

    #[test]
    fn profile_override_changes_capabilities() {
        let mut profile = ProviderProfile::generic("Claude");
        profile.reset = Some(LocatorSet::single("a.new-chat"));
        let registry = ProviderRegistry::default().with_profile(ProviderKind::Claude, profile);

        let (kind, adapter) = registry.lookup("claude").unwrap();
        assert_eq!(kind, ProviderKind::Claude);
        assert!(adapter.supports(Capability::ResetState));
        assert!(!adapter.supports(Capability::SetSystemPrompt));
    }
}
