//! Action primitives - the live document seam and everything that waits on it
//!
//! This crate provides the low-level building blocks of the automation engine:
//! - `DomPort`, the async trait every document inspection goes through
//! - `MemoryDom`, an in-memory document used by tests and fixture runs
//! - The five-point actionability checker
//! - Change notification (push or poll) and bounded retry with backoff
//! - Pointer and text-entry gestures

pub mod actionability;
pub mod dom;
pub mod errors;
pub mod gesture;
pub mod memory;
pub mod notifier;
pub mod retry;
pub mod selector;
pub mod types;

pub use actionability::{ActionabilityCheck, ActionabilityChecker, ActionabilityVerdict};
pub use dom::DomPort;
pub use errors::ActionError;
pub use gesture::{fill_text, pointer_click, press_key};
pub use memory::{DispatchedEvent, ElementSpec, MemoryDom, NodeStyle};
pub use notifier::{
    open_notifier, ChangeNotifier, ChangeSignal, MutationNotifier, NotifierStrategy,
    PollingNotifier,
};
pub use retry::{always_retryable, RetryError, RetryPolicy, RetrySupervisor};
pub use selector::{SelectorList, SelectorTarget};
pub use types::*;
