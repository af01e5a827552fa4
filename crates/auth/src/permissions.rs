use serde::{Deserialize, Serialize};

use docgate_core::Capability;

/// Authoritative capability list for the current session.
///
/// "Not yet resolved" is modeled by the caller as `Option<PermissionSet>`;
/// a present but empty set grants nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<Capability>);

impl PermissionSet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, capability: &Capability) -> bool {
        self.0.iter().any(|c| c == capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

impl FromIterator<Capability> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<'a> FromIterator<&'a str> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|s| Capability::new(s.to_string())))
    }
}
