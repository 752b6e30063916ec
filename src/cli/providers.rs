use anyhow::{Context, Result};
use action_flow::{Capability, ProviderKind, ProviderProfile};
use clap::Args;
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::{emit_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ProvidersArgs {
    /// Print the full profile of one provider
    #[arg(long, value_name = "PROVIDER")]
    pub show: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    pub id: ProviderKind,
    pub display_name: String,
    pub capabilities: Vec<Capability>,
    pub prompt_input: Vec<String>,
    pub submit: Vec<String>,
}

impl ProviderSummary {
    fn new(kind: ProviderKind, profile: &ProviderProfile) -> Self {
        let display_name = if profile.display_name.is_empty() {
            kind.display_name().to_string()
        } else {
            profile.display_name.clone()
        };
        Self {
            id: kind,
            display_name,
            capabilities: profile.capabilities(),
            prompt_input: profile.prompt_input.to_vec(),
            submit: profile.submit.to_vec(),
        }
    }
}

pub async fn cmd_providers(
    args: ProvidersArgs,
    ctx: &CliContext,
    output: &OutputFormat,
) -> Result<()> {
    let registry = ctx.config().build_registry()?;

    if let Some(identifier) = args.show {
        let kind: ProviderKind = identifier.parse()?;
        let profile = registry
            .profile(kind)
            .with_context(|| format!("no profile registered for `{}`", kind))?;
        if !emit_structured(output, profile)? {
            // Profiles are authored in YAML; show them the same way.
            print!("{}", serde_yaml::to_string(profile)?);
        }
        return Ok(());
    }

    let summaries: Vec<ProviderSummary> = registry
        .kinds()
        .into_iter()
        .filter_map(|kind| registry.profile(kind).map(|p| ProviderSummary::new(kind, p)))
        .collect();

    if emit_structured(output, &summaries)? {
        return Ok(());
    }

    println!("Providers ({})", summaries.len());
    println!("==============");
    for summary in &summaries {
        println!("- {} ({})", summary.id, summary.display_name);
        if summary.capabilities.is_empty() {
            println!("    capabilities: none");
        } else {
            let names: Vec<String> = summary
                .capabilities
                .iter()
                .map(|capability| format!("{:?}", capability))
                .collect();
            println!("    capabilities: {}", names.join(", "));
        }
        println!("    prompt input: {}", summary.prompt_input.join(" | "));
        println!("    submit:       {}", summary.submit.join(" | "));
    }
    Ok(())
}
