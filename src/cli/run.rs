use std::path::PathBuf;
use std::sync::Arc;

use action_flow::{FlowError, RunInput, RunOrchestrator, RunReport, RunSettings, WorkflowOrchestrator};
use action_locator::DefaultElementResolver;
use action_primitives::DomPort;
use anyhow::{bail, Context, Result};
use clap::Args;
use extensions_bridge::{BridgeEvent, MemoryHost, MemoryHostBridge, OutwardSignal};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cli::context::CliContext;
use crate::cli::output::{emit_structured, OutputFormat};
use crate::fixture::PageFixture;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Provider identifier (aistudio, chatgpt, claude, gemini, generic)
    pub provider: String,

    /// Prompt text
    #[arg(short, long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long, value_name = "FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Page fixture to drive
    #[arg(short, long, value_name = "FILE")]
    pub fixture: PathBuf,

    /// Model to select
    #[arg(long)]
    pub model: Option<String>,

    /// System instructions
    #[arg(long)]
    pub system_prompt: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long)]
    pub thinking_budget: Option<u32>,

    /// Toggle web search grounding (true/false)
    #[arg(long)]
    pub web_search: Option<bool>,

    /// Toggle thinking off (true/false)
    #[arg(long)]
    pub disable_thinking: Option<bool>,

    /// Toggle URL context (true/false)
    #[arg(long)]
    pub url_context: Option<bool>,

    /// Multiplier for every timeout of the run
    #[arg(long)]
    pub timeout_modifier: Option<f64>,

    /// Stop after the ready signal without extracting
    #[arg(long)]
    pub no_extract: bool,
}

impl RunArgs {
    fn settings(&self) -> Option<RunSettings> {
        let settings = RunSettings {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            thinking_budget: self.thinking_budget,
            use_web_search: self.web_search,
            disable_thinking: self.disable_thinking,
            url_context: self.url_context,
            timeout_modifier: self.timeout_modifier,
        };
        (settings != RunSettings::default()).then_some(settings)
    }

    async fn prompt(&self) -> Result<String> {
        match (&self.prompt, &self.prompt_file) {
            (Some(prompt), _) => Ok(prompt.clone()),
            (None, Some(path)) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt file {}", path.display())),
            (None, None) => bail!("either --prompt or --prompt-file is required"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub signals: Vec<OutwardSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorSummary {
    pub code: String,
    pub message: String,
    pub diagnostics: Value,
}

impl From<&FlowError> for ErrorSummary {
    fn from(err: &FlowError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            diagnostics: err.diagnostics(),
        }
    }
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let config = ctx.config();
    let input = RunInput {
        provider: args.provider.clone(),
        prompt: args.prompt().await?,
        settings: args.settings(),
    };

    let (events, observer) = broadcast::channel(config.host.event_capacity.max(1));
    spawn_event_logger(observer);
    let host = MemoryHost::from_config(&config.host, events);

    let fixture = PageFixture::load(&args.fixture).await?;
    let dom = fixture.build(host.memory_clipboard())?;
    let dom: Arc<dyn DomPort> = dom;
    let resolver = DefaultElementResolver::new(dom.clone())
        .with_strategy(config.notifier)
        .with_retry_base_delay(config.retry_base_delay());

    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(config.build_registry()?),
        dom,
        Arc::new(resolver),
        Arc::new(MemoryHostBridge(host.clone())),
    )
    .with_default_scale(config.default_scale()?);

    info!(provider = %input.provider, fixture = %args.fixture.display(), "driving fixture page");
    let mut outcome = RunOutcome {
        report: None,
        response: None,
        signals: Vec::new(),
        error: None,
    };
    let mut failure = None;

    match orchestrator.run(input).await {
        Ok(report) => {
            outcome.report = Some(report);
            if !args.no_extract {
                match orchestrator.extract().await {
                    Ok(text) => outcome.response = Some(text),
                    Err(err) => failure = Some(err),
                }
            }
        }
        Err(err) => failure = Some(err),
    }
    outcome.error = failure.as_ref().map(ErrorSummary::from);
    outcome.signals = host.signals_posted();

    if !emit_structured(output, &outcome)? {
        print_human(&outcome);
    }

    match failure {
        Some(err) => {
            let code = err.code();
            Err(anyhow::Error::new(err).context(format!("run failed [{}]", code)))
        }
        None => Ok(()),
    }
}

fn spawn_event_logger(mut observer: broadcast::Receiver<BridgeEvent>) {
    tokio::spawn(async move {
        loop {
            match observer.recv().await {
                Ok(event) => debug!(?event, "host event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "host event observer lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn print_human(outcome: &RunOutcome) {
    if let Some(report) = &outcome.report {
        println!("Run {} ({})", report.run_id, report.provider);
        println!("Timeout modifier: {}", report.timeout_modifier);
        for record in &report.phases {
            println!(
                "  {:<15} {:>7}ms  (at {}ms)",
                record.phase.name(),
                record.duration_ms,
                record.elapsed_ms
            );
        }
    }
    for signal in &outcome.signals {
        println!("Signal: {}", signal.name());
    }
    if let Some(error) = &outcome.error {
        println!("Error [{}]: {}", error.code, error.message);
    }
    if let Some(response) = &outcome.response {
        println!();
        println!("{}", response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn settings_are_omitted_when_no_flag_is_given() {
        let harness = Harness::parse_from(["run", "claude", "-p", "hi", "-f", "page.yaml"]);
        assert!(harness.run.settings().is_none());
    }

    #[test]
    fn flags_map_onto_run_settings() {
        let harness = Harness::parse_from([
            "run",
            "aistudio",
            "--prompt",
            "hi",
            "--fixture",
            "page.yaml",
            "--model",
            "gemini-pro",
            "--web-search",
            "true",
            "--timeout-modifier",
            "2.5",
        ]);
        let settings = harness.run.settings().unwrap();
        assert_eq!(settings.model.as_deref(), Some("gemini-pro"));
        assert_eq!(settings.use_web_search, Some(true));
        assert_eq!(settings.timeout_modifier, Some(2.5));
        assert!(settings.temperature.is_none());
    }

    #[test]
    fn prompt_and_prompt_file_conflict() {
        let result = Harness::try_parse_from([
            "run",
            "claude",
            "-p",
            "hi",
            "--prompt-file",
            "prompt.txt",
            "-f",
            "page.yaml",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn prompt_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        tokio::fs::write(&path, "from file").await.unwrap();
        let argv: Vec<std::ffi::OsString> = vec![
            "run".into(),
            "claude".into(),
            "--prompt-file".into(),
            path.into_os_string(),
            "-f".into(),
            "page.yaml".into(),
        ];
        let harness = Harness::parse_from(argv);
        assert_eq!(harness.run.prompt().await.unwrap(), "from file");
    }
}
