use std::path::PathBuf;
use std::sync::Arc;

use action_flow::{ProviderKind, ProviderProfile};
use action_locator::{DefaultElementResolver, ElementResolver, LocatorSet, PresenceCount};
use action_primitives::{DomPort, Scope};
use anyhow::{Context, Result};
use clap::Args;
use promptrelay_core_types::LivenessSnapshot;
use serde::Serialize;
use tracing::debug;

use crate::cli::context::CliContext;
use crate::cli::output::{emit_structured, OutputFormat};
use crate::fixture::PageFixture;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Also report which provider locators match this page fixture
    #[arg(short, long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub version: &'static str,
    pub build_date: &'static str,
    pub git_hash: &'static str,
    pub config_path: String,
    pub timeout_modifier: f64,
    pub providers: Vec<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageCheck>,
}

#[derive(Debug, Serialize)]
pub struct PageCheck {
    pub liveness: LivenessSnapshot,
    pub providers: Vec<ProviderPresence>,
}

#[derive(Debug, Serialize)]
pub struct ProviderPresence {
    pub provider: ProviderKind,
    pub login_markers: Vec<PresenceCount>,
    pub prompt_input: Vec<PresenceCount>,
    pub submit: Vec<PresenceCount>,
    pub response: Vec<PresenceCount>,
}

impl ProviderPresence {
    /// Something matches for both the prompt input and the submit control
    pub fn looks_usable(&self) -> bool {
        let any = |counts: &[PresenceCount]| counts.iter().any(|c| c.count > 0);
        any(&self.prompt_input) && any(&self.submit)
    }

    pub fn login_visible(&self) -> bool {
        self.login_markers.iter().any(|c| c.count > 0)
    }
}

pub async fn cmd_check(args: CheckArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let config = ctx.config();
    let scale = config.default_scale()?;
    let registry = config.build_registry()?;

    let page = match &args.fixture {
        Some(path) => {
            let fixture = PageFixture::load(path).await?;
            let dom: Arc<dyn DomPort> = fixture.build(None)?;
            let resolver = DefaultElementResolver::new(dom.clone()).with_strategy(config.notifier);
            let mut providers = Vec::new();
            for kind in registry.kinds() {
                let Some(profile) = registry.profile(kind) else {
                    continue;
                };
                providers.push(presence_for(&resolver, kind, profile).await?);
            }
            Some(PageCheck {
                liveness: dom.liveness().await.context("Failed to read page state")?,
                providers,
            })
        }
        None => None,
    };

    let report = CheckReport {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("PROMPTRELAY_BUILD_DATE"),
        git_hash: env!("PROMPTRELAY_GIT_HASH"),
        config_path: ctx.config_path().display().to_string(),
        timeout_modifier: scale.factor(),
        providers: registry.kinds(),
        page,
    };

    if emit_structured(output, &report)? {
        return Ok(());
    }

    println!("PromptRelay {}", report.version);
    println!("Build Date: {}", report.build_date);
    println!("Git Commit: {}", report.git_hash);
    println!();
    println!("Configuration: {}", report.config_path);
    println!("- Timeout modifier: {}", report.timeout_modifier);
    println!("- Notifier: {:?}", config.notifier);
    println!(
        "- Retries: {} (base delay {}ms)",
        config.retry.max_retries, config.retry.base_delay_ms
    );
    println!("- Clipboard: {}", if config.host.clipboard { "enabled" } else { "disabled" });
    println!("- Providers: {}", report.providers.len());

    if let Some(page) = &report.page {
        println!();
        println!(
            "Page: {} ({} nodes, {})",
            page.liveness.url.as_deref().unwrap_or("(no url)"),
            page.liveness.node_count,
            page.liveness.ready_state.as_deref().unwrap_or("unknown"),
        );
        for presence in &page.providers {
            let verdict = if presence.login_visible() {
                "login required"
            } else if presence.looks_usable() {
                "ready"
            } else {
                "no match"
            };
            println!("- {}: {}", presence.provider, verdict);
        }
    }
    Ok(())
}

async fn presence_for(
    resolver: &DefaultElementResolver,
    kind: ProviderKind,
    profile: &ProviderProfile,
) -> Result<ProviderPresence> {
    let presence = ProviderPresence {
        provider: kind,
        login_markers: count(resolver, &profile.login_markers).await?,
        prompt_input: count(resolver, &profile.prompt_input).await?,
        submit: count(resolver, &profile.submit).await?,
        response: count(resolver, &profile.response).await?,
    };
    debug!(provider = %kind, usable = presence.looks_usable(), "locator presence checked");
    Ok(presence)
}

async fn count(
    resolver: &DefaultElementResolver,
    locators: &LocatorSet,
) -> Result<Vec<PresenceCount>> {
    if locators.is_empty() {
        return Ok(Vec::new());
    }
    Ok(resolver.resolve_all_present(locators, Scope::Document).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
url: https://chat.example/login
elements:
  - tag: form
    attrs: { action: /auth/login }
    rect: [0, 0, 400, 300]
  - tag: textarea
    rect: [0, 700, 600, 60]
"#;

    #[tokio::test]
    async fn presence_reports_login_before_usability() {
        let dom: Arc<dyn DomPort> = PageFixture::from_yaml(LOGIN_PAGE)
            .unwrap()
            .build(None)
            .unwrap();
        let resolver = DefaultElementResolver::new(dom);
        let profile = ProviderProfile::generic("Generic chat");

        let presence = presence_for(&resolver, ProviderKind::Generic, &profile)
            .await
            .unwrap();
        assert!(presence.login_visible());
        assert!(!presence.looks_usable());
        assert_eq!(presence.prompt_input.len(), 3);
        assert_eq!(presence.prompt_input[2].count, 1);
    }
}
