//! Full runs against an in-memory page driven by the generic profile

use action_flow::{
    AdapterTuning, Phase, ProviderKind, ProviderProfile, ProviderRegistry, RunInput,
    RunOrchestrator, RunSettings, WorkflowOrchestrator,
};
use action_locator::{DefaultElementResolver, LocatorSet};
use action_primitives::{ElementSpec, MemoryDom};
use extensions_bridge::{MemoryHost, MemoryHostBridge, OutwardSignal};
use promptrelay_core_types::NodeRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

struct Page {
    dom: Arc<MemoryDom>,
    host: Arc<MemoryHost>,
    send: NodeRef,
}

/// Chat page whose send button shows a stop button for `generation`, then
/// renders an empty response container and a copy button.
fn chat_page(generation: Option<Duration>) -> Page {
    let dom = MemoryDom::new();
    dom.set_location("https://chat.example/", "complete");
    dom.append(dom.body(), ElementSpec::new("textarea").rect(0.0, 700.0, 600.0, 60.0))
        .unwrap();
    let send = dom
        .append(
            dom.body(),
            ElementSpec::new("button")
                .attr("aria-label", "Send")
                .rect(620.0, 700.0, 60.0, 60.0),
        )
        .unwrap();
    let host = MemoryHost::new(broadcast::channel(64).0);
    let clipboard = host.memory_clipboard().unwrap();

    dom.on(send, "click", move |page, _| {
        let stop = page
            .append(
                page.body(),
                ElementSpec::new("button")
                    .attr("aria-label", "Stop")
                    .rect(620.0, 640.0, 60.0, 40.0),
            )
            .unwrap();
        let Some(generation) = generation else {
            return;
        };
        let page = page.clone();
        let clipboard = clipboard.clone();
        tokio::spawn(async move {
            sleep(generation).await;
            page.remove(stop).unwrap();
            page.append(page.body(), ElementSpec::new("div").class("response"))
                .unwrap();
            let copy = page
                .append(
                    page.body(),
                    ElementSpec::new("button")
                        .attr("aria-label", "Copy")
                        .rect(0.0, 400.0, 40.0, 40.0),
                )
                .unwrap();
            page.on(copy, "click", move |_, _| {
                clipboard.set_content("## Result\r\n\r\n\r\n\r\nAll done.  ")
            });
        });
    });

    Page { dom, host, send }
}

fn orchestrator(page: &Page, registry: ProviderRegistry) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(
        Arc::new(registry),
        page.dom.clone(),
        Arc::new(DefaultElementResolver::new(page.dom.clone())),
        Arc::new(MemoryHostBridge(page.host.clone())),
    )
}

#[tokio::test(start_paused = true)]
async fn run_then_extract_through_clipboard_fallback() {
    let page = chat_page(Some(Duration::from_secs(4)));
    let orchestrator = orchestrator(&page, ProviderRegistry::default());

    let started = Instant::now();
    let report = orchestrator
        .run(RunInput::new("gemini", "Summarise the meeting"))
        .await
        .unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(report.provider, "gemini");
    assert_eq!(
        report.phase_order(),
        vec![Phase::Init, Phase::WaitReady, Phase::SendPrompt, Phase::NotifyReady]
    );
    assert_eq!(
        page.dom.event_names(page.send),
        vec!["pointerdown", "mousedown", "pointerup", "mouseup", "click"]
    );
    assert_eq!(page.host.signals_posted(), vec![OutwardSignal::ReadyForExtraction]);

    let text = orchestrator.extract().await.unwrap();
    assert_eq!(text, "## Result\n\nAll done.");
}

#[tokio::test(start_paused = true)]
async fn unfinished_generation_fails_send_prompt_with_marker_evidence() {
    let page = chat_page(None);
    let mut profile = ProviderProfile::generic("Claude");
    profile.timeouts.finalization_ms = 10_000;
    let registry = ProviderRegistry::builtin(AdapterTuning::default())
        .with_profile(ProviderKind::Claude, profile);
    let orchestrator = orchestrator(&page, registry);

    let input = RunInput::new("claude", "Hello").with_settings(RunSettings {
        timeout_modifier: Some(1.5),
        ..Default::default()
    });
    let started = Instant::now();
    let err = orchestrator.run(input).await.unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(err.phase(), Some(Phase::SendPrompt));
    match page.host.signals_posted().as_slice() {
        [OutwardSignal::AutomationFailed {
            code, diagnostics, ..
        }] => {
            assert_eq!(code, "SEND_PROMPT_FAILED");
            assert_eq!(diagnostics["cause_code"], "TIMEOUT");
            let evidence = &diagnostics["cause"]["evidence"];
            assert_eq!(evidence["diagnosis"], "never_finished");
            assert_eq!(evidence["start_marker_seen"], true);
        }
        other => panic!("unexpected signals {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reset_affordance_runs_before_waiting_for_ready() {
    let page = chat_page(Some(Duration::from_millis(500)));
    let reset = page
        .dom
        .append(
            page.dom.body(),
            ElementSpec::new("a").class("new-chat").rect(0.0, 0.0, 120.0, 30.0),
        )
        .unwrap();
    let mut profile = ProviderProfile::generic("ChatGPT");
    profile.reset = Some(LocatorSet::single("a.new-chat"));
    let registry = ProviderRegistry::default().with_profile(ProviderKind::ChatGpt, profile);

    let report = orchestrator(&page, registry)
        .run(RunInput::new("chatgpt", "Hi"))
        .await
        .unwrap();
    assert_eq!(report.phase_order()[1], Phase::ResetState);
    assert!(page.dom.event_names(reset).contains(&"click"));
}

#[tokio::test(start_paused = true)]
async fn dead_submit_button_fails_as_never_started() {
    let dom = MemoryDom::new();
    dom.append(dom.body(), ElementSpec::new("textarea").rect(0.0, 700.0, 600.0, 60.0))
        .unwrap();
    let send = dom
        .append(
            dom.body(),
            ElementSpec::new("button")
                .attr("aria-label", "Send")
                .rect(620.0, 700.0, 60.0, 60.0),
        )
        .unwrap();
    let page = Page {
        dom,
        host: MemoryHost::new(broadcast::channel(16).0),
        send,
    };
    let orchestrator = orchestrator(&page, ProviderRegistry::default());

    let started = Instant::now();
    let err = orchestrator
        .run(RunInput::new("generic", "hello"))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(err.phase(), Some(Phase::SendPrompt));
    assert!(page.dom.event_names(page.send).contains(&"click"));
    match page.host.signals_posted().as_slice() {
        [OutwardSignal::AutomationFailed {
            code, diagnostics, ..
        }] => {
            assert_eq!(code, "SEND_PROMPT_FAILED");
            let evidence = &diagnostics["cause"]["evidence"];
            assert_eq!(evidence["diagnosis"], "never_started");
            assert_eq!(evidence["start_marker_seen"], false);
        }
        other => panic!("unexpected signals {other:?}"),
    }
}
