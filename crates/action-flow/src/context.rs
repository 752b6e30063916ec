use action_locator::{ElementResolver, ResolvedElement, WaitRequest};
use action_primitives::{ActionError, DomPort};
use extensions_bridge::HostBridge;
use promptrelay_core_types::RunContext;
use std::sync::Arc;

/// Everything an adapter call may touch during one run
#[derive(Clone)]
pub struct AdapterContext {
    pub run: RunContext,
    pub dom: Arc<dyn DomPort>,
    pub resolver: Arc<dyn ElementResolver>,
    pub host: Arc<dyn HostBridge>,
}

impl AdapterContext {
    pub fn new(
        run: RunContext,
        dom: Arc<dyn DomPort>,
        resolver: Arc<dyn ElementResolver>,
        host: Arc<dyn HostBridge>,
    ) -> Self {
        Self {
            run,
            dom,
            resolver,
            host,
        }
    }

    /// Resolve `request` under this run's scaling and cancellation
    pub async fn resolve(&self, request: &WaitRequest) -> Result<ResolvedElement, ActionError> {
        self.resolver.resolve(&self.run, request).await
    }
}
