//! Data-driven provider adapter
//!
//! A [`ProviderProfile`] describes one site purely as locator data; the
//! [`ProfileAdapter`] turns it into the adapter contract using the resolver,
//! the finalization gate and the extraction chain.

use crate::{
    adapter::{Capability, ProviderAdapter},
    context::AdapterContext,
    errors::FlowError,
    types::RunSettings,
};
use action_extract::{ClipboardSettings, ExtractionPlan, ResponseExtractor};
use action_gate::{FinalizationCondition, FinalizationGate, FinalizationSpec};
use action_locator::{LocatorSet, WaitRequest};
use action_primitives::{fill_text, pointer_click, NotifierStrategy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dropdown-style control: click `open`, then the option matching `option`
/// with `{value}` substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceControl {
    pub open: LocatorSet,
    pub option: String,
}

/// Text or number field, optionally behind a disclosure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextControl {
    #[serde(default)]
    pub open: Option<LocatorSet>,
    pub input: LocatorSet,
}

/// Page controls for [`RunSettings`]; absent controls are skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsControls {
    pub model: Option<ChoiceControl>,
    pub system_prompt: Option<TextControl>,
    pub temperature: Option<TextControl>,
    pub top_p: Option<TextControl>,
    pub thinking_budget: Option<TextControl>,
    /// Toggles read their state from `aria-checked`/`aria-pressed`
    pub web_search: Option<LocatorSet>,
    /// Toggle that turns thinking on; `disableThinking` drives it off
    pub thinking: Option<LocatorSet>,
    pub url_context: Option<LocatorSet>,
}

impl SettingsControls {
    fn has_page_controls(&self) -> bool {
        self.model.is_some()
            || self.temperature.is_some()
            || self.top_p.is_some()
            || self.thinking_budget.is_some()
            || self.web_search.is_some()
            || self.thinking.is_some()
            || self.url_context.is_some()
    }
}

/// Base timeouts in milliseconds, scaled per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTimeouts {
    pub ready_ms: u64,
    pub action_ms: u64,
    pub start_ms: u64,
    pub finalization_ms: u64,
    pub copy_ms: u64,
}

impl Default for ProfileTimeouts {
    fn default() -> Self {
        Self {
            ready_ms: 15_000,
            action_ms: 10_000,
            start_ms: 3_000,
            finalization_ms: 120_000,
            copy_ms: 5_000,
        }
    }
}

/// Locator data describing one provider site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub display_name: String,
    pub prompt_input: LocatorSet,
    pub submit: LocatorSet,
    pub response: LocatorSet,
    pub copy_button: LocatorSet,
    #[serde(default)]
    pub login_markers: LocatorSet,
    /// "New chat" affordance; enables `reset_state`
    #[serde(default)]
    pub reset: Option<LocatorSet>,
    /// Shown while a response is being generated
    #[serde(default)]
    pub busy_indicator: Option<LocatorSet>,
    pub finalization: FinalizationCondition,
    #[serde(default)]
    pub settings: SettingsControls,
    #[serde(default)]
    pub timeouts: ProfileTimeouts,
    /// Supervisor retries for each element wait
    #[serde(default)]
    pub retries: u32,
}

impl ProviderProfile {
    /// Conservative defaults that fit many chat UIs
    pub fn generic(display_name: impl Into<String>) -> Self {
        let busy = LocatorSet::new([
            "button[aria-label=\"Stop generating\"]",
            "button[aria-label=\"Stop\"]",
            ".stop-button",
        ]);
        Self {
            display_name: display_name.into(),
            prompt_input: LocatorSet::new([
                "textarea[aria-label=\"Prompt\"]",
                "[contenteditable=\"true\"]",
                "textarea",
            ]),
            submit: LocatorSet::new([
                "button[type=\"submit\"]",
                "button[aria-label=\"Send message\"]",
                "button[aria-label=\"Send\"]",
            ]),
            response: LocatorSet::new(["[data-role=\"response\"]", ".response", ".model-response"]),
            copy_button: LocatorSet::new([
                "button[aria-label=\"Copy\"]",
                "button[aria-label=\"Copy response\"]",
                "button.copy",
            ]),
            login_markers: LocatorSet::new([
                "[data-testid=\"login-button\"]",
                "form[action*=\"login\"]",
            ]),
            reset: None,
            busy_indicator: Some(busy.clone()),
            finalization: FinalizationCondition::absent(busy),
            settings: SettingsControls::default(),
            timeouts: ProfileTimeouts::default(),
            retries: 0,
        }
    }

    pub fn from_yaml(source: &str) -> Result<Self, FlowError> {
        let profile: ProviderProfile =
            serde_yaml::from_str(source).map_err(|err| FlowError::Profile(err.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        let required = [
            ("prompt_input", &self.prompt_input),
            ("submit", &self.submit),
            ("response", &self.response),
            ("copy_button", &self.copy_button),
        ];
        for (field, locators) in required {
            if locators.is_empty() {
                return Err(FlowError::Profile(format!("{} needs at least one locator", field)));
            }
        }
        Ok(())
    }

    /// Optional operations this profile can drive
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        if self.reset.is_some() {
            capabilities.push(Capability::ResetState);
        }
        if self.settings.has_page_controls() {
            capabilities.push(Capability::ApplyAllSettings);
        }
        if self.settings.system_prompt.is_some() {
            capabilities.push(Capability::SetSystemPrompt);
        }
        capabilities
    }
}

/// Knobs shared by every profile adapter, taken from engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdapterTuning {
    pub strategy: NotifierStrategy,
    pub clipboard: ClipboardSettings,
}

pub struct ProfileAdapter {
    name: String,
    profile: ProviderProfile,
    capabilities: Vec<Capability>,
    tuning: AdapterTuning,
}

impl ProfileAdapter {
    pub fn new(name: impl Into<String>, profile: ProviderProfile, tuning: AdapterTuning) -> Self {
        Self {
            name: name.into(),
            capabilities: profile.capabilities(),
            profile,
            tuning,
        }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn request(&self, target: &str, locators: &LocatorSet) -> WaitRequest {
        WaitRequest::new(target, locators.clone())
            .timeout(Duration::from_millis(self.profile.timeouts.action_ms))
            .retries(self.profile.retries)
    }

    async fn click(
        &self,
        ctx: &AdapterContext,
        target: &str,
        locators: &LocatorSet,
    ) -> Result<(), FlowError> {
        let element = ctx.resolve(&self.request(target, locators)).await?;
        pointer_click(ctx.dom.as_ref(), element.node).await?;
        debug!(run_id = %ctx.run.run_id, control = target, locator = %element.locator, "clicked");
        Ok(())
    }

    async fn fill(
        &self,
        ctx: &AdapterContext,
        target: &str,
        control: &TextControl,
        text: &str,
    ) -> Result<(), FlowError> {
        if let Some(open) = &control.open {
            self.click(ctx, target, open).await?;
        }
        let element = ctx.resolve(&self.request(target, &control.input)).await?;
        fill_text(ctx.dom.as_ref(), element.node, text).await?;
        Ok(())
    }

    async fn choose(
        &self,
        ctx: &AdapterContext,
        control: &ChoiceControl,
        value: &str,
    ) -> Result<(), FlowError> {
        self.click(ctx, "model picker", &control.open).await?;
        let option = LocatorSet::single(control.option.replace("{value}", value));
        self.click(ctx, "model option", &option).await
    }

    async fn toggle(
        &self,
        ctx: &AdapterContext,
        target: &str,
        locators: &LocatorSet,
        desired: bool,
    ) -> Result<(), FlowError> {
        let element = ctx.resolve(&self.request(target, locators)).await?;
        let mut current = false;
        for attribute in ["aria-checked", "aria-pressed"] {
            if let Some(value) = ctx.dom.attribute(element.node, attribute).await? {
                current = value == "true";
                break;
            }
        }
        if current != desired {
            pointer_click(ctx.dom.as_ref(), element.node).await?;
            debug!(run_id = %ctx.run.run_id, control = target, desired, "toggled");
        }
        Ok(())
    }

    fn skipped(&self, setting: &str) {
        warn!(provider = %self.name, setting, "no control configured, setting skipped");
    }
}

#[async_trait]
impl ProviderAdapter for ProfileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn reset_state(&self, ctx: &AdapterContext) -> Result<(), FlowError> {
        let Some(reset) = &self.profile.reset else {
            return Err(FlowError::Unsupported(Capability::ResetState));
        };
        self.click(ctx, "new chat", reset).await
    }

    async fn wait_for_ready(&self, ctx: &AdapterContext) -> Result<(), FlowError> {
        let logins = self.profile.login_markers.len();
        let locators: LocatorSet = self
            .profile
            .login_markers
            .iter()
            .chain(self.profile.prompt_input.iter())
            .collect();
        let request = WaitRequest::new("prompt input", locators)
            .timeout(Duration::from_millis(self.profile.timeouts.ready_ms))
            .retries(self.profile.retries);

        let element = ctx.resolve(&request).await?;
        if element.locator_index < logins {
            info!(run_id = %ctx.run.run_id, locator = %element.locator, "login marker showing");
            return Err(FlowError::LoginRequired(format!(
                "{} is showing a sign-in prompt ({})",
                self.profile.display_name, element.locator
            )));
        }
        debug!(run_id = %ctx.run.run_id, locator = %element.locator, "prompt input ready");
        Ok(())
    }

    async fn apply_all_settings(
        &self,
        ctx: &AdapterContext,
        settings: &RunSettings,
    ) -> Result<(), FlowError> {
        let controls = &self.profile.settings;

        if let Some(model) = &settings.model {
            match &controls.model {
                Some(control) => self.choose(ctx, control, model).await?,
                None => self.skipped("model"),
            }
        }

        let numbers = [
            ("temperature", settings.temperature.map(|v| v.to_string()), &controls.temperature),
            ("top_p", settings.top_p.map(|v| v.to_string()), &controls.top_p),
            (
                "thinking_budget",
                settings.thinking_budget.map(|v| v.to_string()),
                &controls.thinking_budget,
            ),
        ];
        for (setting, value, control) in numbers {
            let Some(value) = value else { continue };
            match control {
                Some(control) => self.fill(ctx, setting, control, &value).await?,
                None => self.skipped(setting),
            }
        }

        let toggles = [
            ("web_search", settings.use_web_search, &controls.web_search),
            ("thinking", settings.disable_thinking.map(|off| !off), &controls.thinking),
            ("url_context", settings.url_context, &controls.url_context),
        ];
        for (setting, desired, control) in toggles {
            let Some(desired) = desired else { continue };
            match control {
                Some(locators) => self.toggle(ctx, setting, locators, desired).await?,
                None => self.skipped(setting),
            }
        }

        info!(run_id = %ctx.run.run_id, provider = %self.name, "settings applied");
        Ok(())
    }

    async fn set_system_prompt(&self, ctx: &AdapterContext, text: &str) -> Result<(), FlowError> {
        let Some(control) = &self.profile.settings.system_prompt else {
            return Err(FlowError::Unsupported(Capability::SetSystemPrompt));
        };
        self.fill(ctx, "system prompt", control, text).await
    }

    async fn send_prompt(&self, ctx: &AdapterContext, prompt: &str) -> Result<(), FlowError> {
        let input = ctx
            .resolve(&self.request("prompt input", &self.profile.prompt_input))
            .await?;
        fill_text(ctx.dom.as_ref(), input.node, prompt).await?;
        self.click(ctx, "submit button", &self.profile.submit).await?;
        info!(run_id = %ctx.run.run_id, chars = prompt.chars().count(), "prompt submitted");

        let timeouts = self.profile.timeouts;
        let mut spec = FinalizationSpec::new(self.profile.finalization.clone())
            .with_start_timeout(Duration::from_millis(timeouts.start_ms))
            .with_timeout(Duration::from_millis(timeouts.finalization_ms));
        if let Some(busy) = &self.profile.busy_indicator {
            spec = spec.with_started(busy.clone());
        }
        FinalizationGate::new(ctx.dom.clone(), ctx.resolver.clone())
            .with_strategy(self.tuning.strategy)
            .wait(&ctx.run, &spec)
            .await?;
        Ok(())
    }

    async fn extract_response(&self, ctx: &AdapterContext) -> Result<String, FlowError> {
        let mut plan = ExtractionPlan::new(
            self.profile.response.clone(),
            self.profile.copy_button.clone(),
        );
        plan.copy_timeout = Duration::from_millis(self.profile.timeouts.copy_ms);
        let extraction = ResponseExtractor::new(
            ctx.dom.clone(),
            ctx.resolver.clone(),
            self.tuning.clipboard,
        )
        .extract(&ctx.run, &plan, ctx.host.as_ref())
        .await?;
        Ok(extraction.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::DefaultElementResolver;
    use action_primitives::{DomPort, ElementSpec, MemoryDom};
    use extensions_bridge::{MemoryHost, MemoryHostBridge};
    use promptrelay_core_types::RunContext;
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use tokio::time::{sleep, Instant};

    fn context(dom: &Arc<MemoryDom>) -> (AdapterContext, Arc<MemoryHost>) {
        let host = MemoryHost::new(broadcast::channel(16).0);
        let ctx = AdapterContext::new(
            RunContext::detached(),
            dom.clone(),
            Arc::new(DefaultElementResolver::new(dom.clone())),
            Arc::new(MemoryHostBridge(host.clone())),
        );
        (ctx, host)
    }

    fn adapter(profile: ProviderProfile) -> ProfileAdapter {
        ProfileAdapter::new("generic", profile, AdapterTuning::default())
    }

    #[test]
    fn profile_parses_from_yaml() {
        let profile = ProviderProfile::from_yaml(
            r#"
display_name: Example Chat
prompt_input: ["textarea#prompt"]
submit: ["button.send"]
response: [".answer"]
copy_button: ["button.copy"]
reset: ["a.new-chat"]
finalization:
  kind: stable_present
  marker: ["button.copy"]
  busy: [".spinner"]
settings:
  model:
    open: ["button.model"]
    option: "li[data-model=\"{value}\"]"
  system_prompt:
    input: ["textarea.system"]
timeouts:
  ready_ms: 2000
"#,
        )
        .unwrap();
        assert_eq!(profile.timeouts.ready_ms, 2_000);
        assert_eq!(profile.timeouts.action_ms, 10_000);
        assert_eq!(
            profile.capabilities(),
            vec![
                Capability::ResetState,
                Capability::ApplyAllSettings,
                Capability::SetSystemPrompt
            ]
        );
        match profile.finalization {
            FinalizationCondition::StablePresent { settle_ms, busy, .. } => {
                assert_eq!(settle_ms, 500);
                assert_eq!(busy, Some(LocatorSet::single(".spinner")));
            }
            other => panic!("unexpected condition {other:?}"),
        }
    }

    #[test]
    fn profile_without_prompt_input_is_rejected() {
        let err = ProviderProfile::from_yaml(
            r#"
prompt_input: []
submit: ["button"]
response: [".answer"]
copy_button: ["button.copy"]
finalization: { kind: absent, locators: [".stop"] }
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "PROFILE");
    }

    #[tokio::test(start_paused = true)]
    async fn login_marker_before_prompt_input_reports_login_required() {
        let dom = MemoryDom::new();
        dom.append(
            dom.body(),
            ElementSpec::new("button").attr("data-testid", "login-button"),
        )
        .unwrap();
        let (ctx, _host) = context(&dom);

        let err = adapter(ProviderProfile::generic("Generic"))
            .wait_for_ready(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::LoginRequired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_once_prompt_input_appears() {
        let dom = MemoryDom::new();
        let (ctx, _host) = context(&dom);
        let page = dom.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(700)).await;
            page.append(page.body(), ElementSpec::new("textarea")).unwrap();
        });

        let started = Instant::now();
        adapter(ProviderProfile::generic("Generic"))
            .wait_for_ready(&ctx)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn send_prompt_waits_for_busy_indicator_to_clear() {
        let dom = MemoryDom::new();
        let input = dom.append(dom.body(), ElementSpec::new("textarea")).unwrap();
        let send = dom
            .append(
                dom.body(),
                ElementSpec::new("button").attr("type", "submit").rect(0.0, 100.0, 80.0, 30.0),
            )
            .unwrap();
        dom.on(send, "click", |page, _| {
            let stop = page
                .append(page.body(), ElementSpec::new("div").class("stop-button"))
                .unwrap();
            let page = page.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(1_500)).await;
                page.remove(stop).unwrap();
                page.append(
                    page.body(),
                    ElementSpec::new("div").class("response").text("Done."),
                )
                .unwrap();
            });
        });
        let (ctx, _host) = context(&dom);
        let adapter = adapter(ProviderProfile::generic("Generic"));

        let started = Instant::now();
        adapter.send_prompt(&ctx, "Hello there").await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(1_500));
        assert_eq!(dom.value(input).as_deref(), Some("Hello there"));
        assert_eq!(adapter.extract_response(&ctx).await.unwrap(), "Done.");
    }

    #[tokio::test(start_paused = true)]
    async fn settings_drive_configured_controls_only() {
        let dom = MemoryDom::new();
        let picker = dom
            .append(dom.body(), ElementSpec::new("button").class("model"))
            .unwrap();
        dom.on(picker, "click", |page, _| {
            page.append(
                page.body(),
                ElementSpec::new("li")
                    .attr("data-model", "pro")
                    .rect(0.0, 200.0, 100.0, 30.0),
            )
            .unwrap();
        });
        let temperature = dom
            .append(
                dom.body(),
                ElementSpec::new("input").class("temperature").rect(0.0, 300.0, 100.0, 30.0),
            )
            .unwrap();
        let search = dom
            .append(
                dom.body(),
                ElementSpec::new("button")
                    .class("search")
                    .attr("aria-checked", "true")
                    .rect(0.0, 400.0, 100.0, 30.0),
            )
            .unwrap();

        let mut profile = ProviderProfile::generic("Generic");
        profile.settings = SettingsControls {
            model: Some(ChoiceControl {
                open: LocatorSet::single("button.model"),
                option: "li[data-model=\"{value}\"]".into(),
            }),
            temperature: Some(TextControl {
                open: None,
                input: LocatorSet::single("input.temperature"),
            }),
            web_search: Some(LocatorSet::single("button.search")),
            ..Default::default()
        };
        let (ctx, _host) = context(&dom);
        let settings = RunSettings {
            model: Some("pro".into()),
            temperature: Some(0.2),
            use_web_search: Some(true),
            top_p: Some(0.5),
            ..Default::default()
        };

        adapter(profile).apply_all_settings(&ctx, &settings).await.unwrap();

        let option = dom.find("li[data-model=\"pro\"]").unwrap();
        assert!(dom.event_names(option).contains(&"click"));
        assert_eq!(dom.value(temperature).as_deref(), Some("0.2"));
        // Already on; clicking would turn it off.
        assert!(dom.event_names(search).is_empty());
        assert!(ctx.dom.liveness().await.unwrap().node_count > 0);
    }
}
