use std::time::Duration;

use serde::{Deserialize, Serialize};

use docgate_core::RoutePath;

/// Something happened after which the visible route or DOM may differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEvent {
    /// The host router changed the current route (push or replace).
    Navigated { path: RoutePath },
    /// A full-screen dialog/portal subtree was inserted.
    DialogOpened,
    /// The viewport changed size; different navigation affordances may show.
    ViewportResized { width: u32, height: u32 },
    /// A watched subtree gained qualifying children.
    SubtreeGrew { added: usize },
    /// A persisted key changed outside this page (another tab).
    StorageChanged { key: String, new_value: Option<String> },
}

impl PageEvent {
    /// How long to let the host's own rendering settle before re-evaluating.
    ///
    /// `None` means the event is handled immediately, outside the debounce.
    pub fn settle_delay(&self) -> Option<Duration> {
        match self {
            PageEvent::Navigated { .. } => Some(Duration::from_millis(50)),
            PageEvent::DialogOpened
            | PageEvent::ViewportResized { .. }
            | PageEvent::SubtreeGrew { .. } => Some(Duration::from_millis(100)),
            PageEvent::StorageChanged { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PageEvent::Navigated { .. } => "navigated",
            PageEvent::DialogOpened => "dialog_opened",
            PageEvent::ViewportResized { .. } => "viewport_resized",
            PageEvent::SubtreeGrew { .. } => "subtree_grew",
            PageEvent::StorageChanged { .. } => "storage_changed",
        }
    }
}
