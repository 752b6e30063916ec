//! Host bridge: the boundary between the engine and its embedding host.
//!
//! The host exposes two capabilities to the engine: a text clipboard and a
//! single named call-out channel for outward signals. Both are traits so a
//! browser-extension host and the in-memory test host plug in the same way.

pub mod config;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

pub use config::HostConfig;

/// Channel every outward signal is posted on.
pub const SIGNAL_CHANNEL: &str = "promptrelay:signal";

/// Errors surfaced by the bridge.
#[derive(Clone, Debug, Error)]
pub enum BridgeError {
    #[error("clipboard capability unavailable")]
    ClipboardUnavailable,
    #[error("clipboard write failed: {0}")]
    ClipboardWrite(String),
    #[error("clipboard read failed: {0}")]
    ClipboardRead(String),
}

impl BridgeError {
    /// Reads may race a pending copy; nothing else is worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::ClipboardRead(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::ClipboardUnavailable => "CLIPBOARD_UNAVAILABLE",
            BridgeError::ClipboardWrite(_) => "CLIPBOARD_WRITE",
            BridgeError::ClipboardRead(_) => "CLIPBOARD_READ",
        }
    }
}

/// Host-provided text clipboard.
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn read_text(&self) -> Result<String, BridgeError>;
    async fn write_text(&self, text: &str) -> Result<(), BridgeError>;
}

/// Host-provided named call-out channel.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn post(&self, channel: &str, payload: Value) -> Result<(), BridgeError>;
}

/// Everything the host exposes to the engine.
pub trait HostBridge: Send + Sync {
    /// `None` when the host has no clipboard capability.
    fn clipboard(&self) -> Option<Arc<dyn Clipboard>>;
    fn signals(&self) -> Arc<dyn SignalChannel>;
}

/// Outward signal payloads. Exactly one is posted per automation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutwardSignal {
    ReadyForExtraction,
    LoginRequired,
    AutomationFailed {
        code: String,
        message: String,
        diagnostics: Value,
    },
}

impl OutwardSignal {
    pub fn name(&self) -> &'static str {
        match self {
            OutwardSignal::ReadyForExtraction => "ready-for-extraction",
            OutwardSignal::LoginRequired => "login-required",
            OutwardSignal::AutomationFailed { .. } => "automation-failed",
        }
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Post `signal` on the engine's single outward channel.
pub async fn post_signal(
    signals: &dyn SignalChannel,
    signal: &OutwardSignal,
) -> Result<(), BridgeError> {
    info!(signal = signal.name(), channel = SIGNAL_CHANNEL, "posting outward signal");
    signals.post(SIGNAL_CHANNEL, signal.to_payload()).await
}

/// Observer event bus.
pub type BridgeEventBus = broadcast::Sender<BridgeEvent>;

/// Events emitted by the in-memory host to observers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BridgeEvent {
    ClipboardWritten { len: usize },
    ClipboardRead { len: usize },
    SignalPosted {
        delivery: Uuid,
        channel: String,
        payload: Value,
    },
}

/// In-memory clipboard.
pub struct MemoryClipboard {
    content: RwLock<String>,
    fail_writes: AtomicBool,
    events: BridgeEventBus,
}

impl MemoryClipboard {
    pub fn new(events: BridgeEventBus) -> Arc<Self> {
        Arc::new(Self {
            content: RwLock::new(String::new()),
            fail_writes: AtomicBool::new(false),
            events,
        })
    }

    /// Synchronous write used by scripted page behaviour (e.g. a copy button).
    pub fn set_content(&self, text: impl Into<String>) {
        *self.content.write() = text.into();
    }

    pub fn content(&self) -> String {
        self.content.read().clone()
    }

    /// Make subsequent `write_text` calls fail, as a denied permission would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn read_text(&self) -> Result<String, BridgeError> {
        let text = self.content();
        let _ = self.events.send(BridgeEvent::ClipboardRead { len: text.len() });
        Ok(text)
    }

    async fn write_text(&self, text: &str) -> Result<(), BridgeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::ClipboardWrite("write permission denied".to_string()));
        }
        self.set_content(text);
        let _ = self.events.send(BridgeEvent::ClipboardWritten { len: text.len() });
        Ok(())
    }
}

/// In-memory host: optional clipboard plus a recording signal channel.
pub struct MemoryHost {
    pub events: BridgeEventBus,
    clipboard: Option<Arc<MemoryClipboard>>,
    posted: DashMap<String, Vec<Value>>,
}

impl MemoryHost {
    pub fn new(events: BridgeEventBus) -> Arc<Self> {
        Arc::new(Self {
            clipboard: Some(MemoryClipboard::new(events.clone())),
            events,
            posted: DashMap::new(),
        })
    }

    pub fn without_clipboard(events: BridgeEventBus) -> Arc<Self> {
        Arc::new(Self {
            clipboard: None,
            events,
            posted: DashMap::new(),
        })
    }

    pub fn from_config(config: &HostConfig, events: BridgeEventBus) -> Arc<Self> {
        if config.clipboard {
            Self::new(events)
        } else {
            Self::without_clipboard(events)
        }
    }

    pub fn memory_clipboard(&self) -> Option<Arc<MemoryClipboard>> {
        self.clipboard.clone()
    }

    /// Raw payloads posted on `channel`, in order
    pub fn posted_on(&self, channel: &str) -> Vec<Value> {
        self.posted
            .get(channel)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Outward signals posted so far
    pub fn signals_posted(&self) -> Vec<OutwardSignal> {
        self.posted_on(SIGNAL_CHANNEL)
            .into_iter()
            .filter_map(|payload| serde_json::from_value(payload).ok())
            .collect()
    }
}

#[async_trait]
impl SignalChannel for MemoryHost {
    async fn post(&self, channel: &str, payload: Value) -> Result<(), BridgeError> {
        let delivery = Uuid::new_v4();
        debug!(%delivery, channel, "signal delivered");
        self.posted
            .entry(channel.to_string())
            .or_default()
            .push(payload.clone());
        let _ = self.events.send(BridgeEvent::SignalPosted {
            delivery,
            channel: channel.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Shared handle implementing [`HostBridge`] for a [`MemoryHost`].
#[derive(Clone)]
pub struct MemoryHostBridge(pub Arc<MemoryHost>);

impl HostBridge for MemoryHostBridge {
    fn clipboard(&self) -> Option<Arc<dyn Clipboard>> {
        self.0
            .clipboard
            .clone()
            .map(|clipboard| clipboard as Arc<dyn Clipboard>)
    }

    fn signals(&self) -> Arc<dyn SignalChannel> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bus() -> BridgeEventBus {
        broadcast::channel(16).0
    }

    #[test]
    fn only_clipboard_reads_are_retryable() {
        assert!(BridgeError::ClipboardRead("busy".into()).is_retryable());
        assert!(!BridgeError::ClipboardWrite("denied".into()).is_retryable());
        assert!(!BridgeError::ClipboardUnavailable.is_retryable());
        assert_eq!(BridgeError::ClipboardUnavailable.code(), "CLIPBOARD_UNAVAILABLE");
    }

    #[test]
    fn signals_serialise_with_type_tag() {
        assert_eq!(
            OutwardSignal::ReadyForExtraction.to_payload(),
            json!({ "type": "ready-for-extraction" })
        );
        assert_eq!(
            OutwardSignal::LoginRequired.to_payload(),
            json!({ "type": "login-required" })
        );
        let failed = OutwardSignal::AutomationFailed {
            code: "SEND_PROMPT_FAILED".to_string(),
            message: "boom".to_string(),
            diagnostics: json!({ "phase": "send_prompt" }),
        };
        let payload = failed.to_payload();
        assert_eq!(payload["type"], "automation-failed");
        assert_eq!(payload["code"], "SEND_PROMPT_FAILED");
        assert_eq!(payload["diagnostics"]["phase"], "send_prompt");
    }

    #[tokio::test]
    async fn memory_host_records_signals_and_emits_events() {
        let events = bus();
        let mut observer = events.subscribe();
        let host = MemoryHost::new(events);
        let bridge = MemoryHostBridge(host.clone());

        post_signal(bridge.signals().as_ref(), &OutwardSignal::ReadyForExtraction)
            .await
            .unwrap();

        assert_eq!(host.signals_posted(), vec![OutwardSignal::ReadyForExtraction]);
        match observer.recv().await.unwrap() {
            BridgeEvent::SignalPosted { channel, .. } => assert_eq!(channel, SIGNAL_CHANNEL),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn clipboard_round_trip_and_denied_writes() {
        let host = MemoryHost::new(bus());
        let bridge = MemoryHostBridge(host.clone());
        let clipboard = bridge.clipboard().unwrap();

        clipboard.write_text("hello").await.unwrap();
        assert_eq!(clipboard.read_text().await.unwrap(), "hello");

        host.memory_clipboard().unwrap().fail_writes(true);
        let err = clipboard.write_text("again").await.unwrap_err();
        assert_eq!(err.code(), "CLIPBOARD_WRITE");
        assert!(!err.is_retryable());
    }

    #[test]
    fn host_without_clipboard_reports_none() {
        let host = MemoryHost::without_clipboard(bus());
        assert!(MemoryHostBridge(host).clipboard().is_none());
    }
}
