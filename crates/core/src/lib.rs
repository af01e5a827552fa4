//! `docgate-core` — shared vocabulary for the documentation access gate.
//!
//! This crate contains **pure** primitives (no IO, no async): capability
//! identifiers, route paths, the clock seam and the gate's error taxonomy.

pub mod capability;
pub mod clock;
pub mod error;
pub mod route;

pub use capability::Capability;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthFailure, GateError, GateResult};
pub use route::RoutePath;
