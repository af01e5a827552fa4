//! `docgate-gate` — the client-side authorization gate for the documentation site.
//!
//! [`AuthGate`] runs one evaluation cycle per settled page change: session
//! checks, permission resolution, full-page denial, and reconciliation of the
//! page's navigation against the route policy. [`GateRuntime`] attaches it to
//! a page-event bus.

pub mod affordance;
pub mod config;
pub mod dom;
pub mod gate;
pub mod loader;
pub mod navigator;
pub mod observer;
pub mod reconciler;
pub mod runtime;

pub use config::GateConfig;
pub use dom::{Document, Element, NodeId, Surface, SubtreeObserver};
pub use gate::{AuthGate, CycleOutcome, GateParts};
pub use loader::{LoaderController, OverlayPhase, OverlayState};
pub use navigator::{LogNavigator, Navigator, RecordingNavigator};
pub use observer::PageObserver;
pub use reconciler::{DomReconciler, ReconcileReport};
pub use runtime::GateRuntime;
