//! `docgate-auth` — session lifecycle, capability resolution and route policy.
//!
//! Storage and transport sit behind traits ([`KeyValueStore`],
//! [`IdentityClient`]) so the policy and resolver logic stays testable without
//! a browser or a live identity service.

pub mod identity;
pub mod permissions;
pub mod policy;
pub mod resolver;
pub mod session;

pub use identity::{HttpIdentityClient, IdentityClient, IdentityError, parse_capability_body};
pub use permissions::PermissionSet;
pub use policy::{AccessDecision, AccessPolicy, DecisionReason, RouteAccessRule, default_rules};
pub use resolver::PermissionResolver;
pub use session::{
    FileStore, InMemoryStore, KeyValueStore, LEGACY_CAPABILITIES_KEY, Session, SessionStore,
    StoreError, TIMESTAMP_KEY, TOKEN_KEY,
};
