//! Host-facing entry points.
//!
//! The host application's router and DOM glue call into a [`PagePublisher`]
//! instead of the gate intercepting global navigation functions.

use std::sync::Mutex;

use docgate_core::RoutePath;

use crate::{EventBus, PageEvent};

pub struct PagePublisher<B> {
    bus: B,
    current: Mutex<RoutePath>,
}

impl<B> PagePublisher<B>
where
    B: EventBus<PageEvent>,
{
    pub fn new(bus: B, initial: RoutePath) -> Self {
        Self {
            bus,
            current: Mutex::new(initial),
        }
    }

    pub fn current_path(&self) -> RoutePath {
        match self.current.lock() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Record a route change. `href` may be absolute or relative; a missing
    /// or unparseable href keeps the current path.
    pub fn navigate(&self, href: Option<&str>) -> RoutePath {
        let path = {
            let mut current = match self.current.lock() {
                Ok(p) => p,
                Err(poisoned) => poisoned.into_inner(),
            };
            let next = RoutePath::from_href(href, &current);
            *current = next.clone();
            next
        };
        self.emit(PageEvent::Navigated { path: path.clone() });
        path
    }

    pub fn dialog_opened(&self) {
        self.emit(PageEvent::DialogOpened);
    }

    pub fn viewport_resized(&self, width: u32, height: u32) {
        self.emit(PageEvent::ViewportResized { width, height });
    }

    pub fn storage_changed(&self, key: impl Into<String>, new_value: Option<String>) {
        self.emit(PageEvent::StorageChanged {
            key: key.into(),
            new_value,
        });
    }

    pub fn emit(&self, event: PageEvent) {
        let kind = event.kind();
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(kind, error = ?err, "failed to publish page event");
        }
    }
}
