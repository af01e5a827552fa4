//! Page-change events and the re-evaluation scheduler.
//!
//! Hosts publish [`PageEvent`]s (route changes, inserted dialogs, viewport
//! resizes, subtree growth, storage changes) onto an [`EventBus`]; the
//! [`NavigationWatcher`] subscribes, coalesces bursts and drives exactly one
//! evaluation cycle at a time.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod publisher;
pub mod watcher;

pub use bus::{EventBus, Subscription};
pub use event::PageEvent;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use publisher::PagePublisher;
pub use watcher::{
    CycleEvaluator, Debouncer, MAX_COALESCE_WAIT, NavigationWatcher, Trigger, WatchState, WatcherHandle,
};
