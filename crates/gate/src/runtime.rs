//! Wiring the gate to a page-event bus.

use std::sync::Arc;

use tokio::task::JoinHandle;

use docgate_events::{EventBus, NavigationWatcher, PageEvent, PagePublisher, WatcherHandle};

use crate::gate::AuthGate;
use crate::observer::PageObserver;

/// A gate attached to a bus: the host publishes through `publisher`, the
/// watcher task drives evaluation cycles.
pub struct GateRuntime<B> {
    pub gate: Arc<AuthGate>,
    pub publisher: Arc<PagePublisher<B>>,
    pub watcher: WatcherHandle,
    pub task: JoinHandle<()>,
}

impl<B> GateRuntime<B>
where
    B: EventBus<PageEvent> + Clone + 'static,
{
    /// Register the document observer and spawn the navigation watcher.
    pub fn start(gate: Arc<AuthGate>, bus: B) -> Self {
        let publisher = Arc::new(PagePublisher::new(bus.clone(), gate.current_route()));
        let observer = PageObserver::new(publisher.clone(), gate.policy().restricted_prefixes().to_vec());
        gate.with_document(|doc| doc.observe(Arc::new(observer)));

        let (watcher, handle) = NavigationWatcher::new(bus.subscribe(), gate.clone());
        let task = watcher.start();
        tracing::debug!("gate runtime started");

        Self {
            gate,
            publisher,
            watcher: handle,
            task,
        }
    }

    /// Stop the watcher and wait for it to exit.
    pub async fn shutdown(self) {
        self.watcher.shutdown();
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "navigation watcher task failed");
        }
    }
}
