//! Engine configuration loaded from `config.yaml`

use std::collections::BTreeMap;
use std::time::Duration;

use action_extract::ClipboardSettings;
use action_flow::{AdapterTuning, ProviderKind, ProviderProfile, ProviderRegistry};
use action_primitives::{NotifierStrategy, RetryPolicy};
use anyhow::{Context, Result};
use extensions_bridge::HostConfig;
use promptrelay_core_types::TimeoutScale;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// How waits learn about document changes
    pub notifier: NotifierStrategy,
    /// Timeout multiplier for runs that do not pass `timeoutModifier`
    pub default_timeout_modifier: f64,
    /// Retry budget for element waits
    pub retry: RetryPolicy,
    pub extraction: ClipboardSettings,
    pub host: HostConfig,
    /// Profile overrides keyed by provider identifier
    pub providers: BTreeMap<String, ProviderProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notifier: NotifierStrategy::Mutation,
            default_timeout_modifier: 1.0,
            retry: RetryPolicy::default(),
            extraction: ClipboardSettings::default(),
            host: HostConfig::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn default_scale(&self) -> Result<TimeoutScale> {
        TimeoutScale::new(self.default_timeout_modifier).context("invalid default_timeout_modifier")
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms)
    }

    pub fn tuning(&self) -> AdapterTuning {
        AdapterTuning {
            strategy: self.notifier,
            clipboard: self.extraction,
        }
    }

    /// Built-in profiles with the configured retry budget, then overrides
    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::builtin(self.tuning());
        for kind in ProviderKind::ALL {
            let mut profile = ProviderProfile::generic(kind.display_name());
            profile.retries = self.retry.max_retries;
            registry = registry.with_profile(kind, profile);
        }
        for (identifier, profile) in &self.providers {
            let kind: ProviderKind = identifier
                .parse()
                .with_context(|| format!("unknown provider `{}` in configuration", identifier))?;
            profile
                .validate()
                .with_context(|| format!("invalid profile for `{}`", identifier))?;
            registry = registry.with_profile(kind, profile.clone());
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::Capability;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.extraction.max_polls, 20);
        assert_eq!(config.default_scale().unwrap(), TimeoutScale::IDENTITY);
    }

    #[test]
    fn provider_overrides_replace_builtin_profiles() {
        let config: Config = serde_yaml::from_str(
            r#"
notifier: { kind: polling, interval_ms: 250 }
default_timeout_modifier: 2.0
retry: { max_retries: 1 }
providers:
  aistudio:
    prompt_input: ["textarea.prompt"]
    submit: ["button.run"]
    response: [".chat-turn"]
    copy_button: ["button.copy"]
    reset: ["a.new-chat"]
    finalization: { kind: absent, locators: ["button.stop"] }
"#,
        )
        .unwrap();
        assert_eq!(config.notifier, NotifierStrategy::Polling { interval_ms: 250 });
        assert_eq!(config.retry.base_delay_ms, 500);

        let registry = config.build_registry().unwrap();
        let aistudio = registry.profile(ProviderKind::AiStudio).unwrap();
        assert_eq!(aistudio.retries, 0);
        assert!(registry
            .adapter(ProviderKind::AiStudio)
            .unwrap()
            .supports(Capability::ResetState));
        assert_eq!(registry.profile(ProviderKind::Claude).unwrap().retries, 1);
    }

    #[test]
    fn unknown_provider_key_is_rejected() {
        let mut config = Config::default();
        config
            .providers
            .insert("bard".to_string(), ProviderProfile::generic("Bard"));
        let err = config.build_registry().unwrap_err();
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn non_positive_modifier_is_rejected() {
        let config = Config {
            default_timeout_modifier: 0.0,
            ..Config::default()
        };
        assert!(config.default_scale().is_err());
    }
}
