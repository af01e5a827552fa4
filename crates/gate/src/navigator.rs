//! Where the gate sends the user when a cycle ends in a redirect.

use std::sync::Mutex;

use docgate_core::RoutePath;

/// Full-page navigation performed by the host (e.g. assigning the location).
pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &RoutePath);
}

/// Logs redirects; for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, to: &RoutePath) {
        tracing::info!(to = %to, "redirect");
    }
}

/// Keeps every redirect for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<RoutePath>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<RoutePath> {
        match self.redirects.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<RoutePath> {
        self.redirects().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, to: &RoutePath) {
        let mut redirects = match self.redirects.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        redirects.push(to.clone());
    }
}
