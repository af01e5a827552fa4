//! Full-page loading overlay with a minimum display duration.
//!
//! `Hidden -> Showing -> PendingHide -> Hidden`. A hide requested before the
//! minimum has elapsed is deferred; a show in the meantime cancels it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Hidden,
    Showing,
    PendingHide,
}

impl OverlayPhase {
    /// Whether the overlay covers the page in this phase.
    pub fn is_visible(self) -> bool {
        !matches!(self, OverlayPhase::Hidden)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayState {
    pub phase: OverlayPhase,
    pub shown_at: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    phase: OverlayPhase,
    shown_at: Option<Instant>,
    /// Bumped by every show; a deferred hide only applies to its own generation.
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    phase: watch::Sender<OverlayPhase>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, phase: OverlayPhase) {
        self.phase.send_replace(phase);
    }

    fn hide_now(&self, inner: &mut Inner) {
        inner.phase = OverlayPhase::Hidden;
        inner.shown_at = None;
        self.publish(OverlayPhase::Hidden);
    }
}

#[derive(Clone)]
pub struct LoaderController {
    min_display: Duration,
    shared: Arc<Shared>,
}

impl core::fmt::Debug for LoaderController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoaderController")
            .field("min_display", &self.min_display)
            .field("state", &self.state())
            .finish()
    }
}

impl LoaderController {
    pub fn new(min_display: Duration) -> Self {
        let (phase, _) = watch::channel(OverlayPhase::Hidden);
        Self {
            min_display,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    phase: OverlayPhase::Hidden,
                    shown_at: None,
                    generation: 0,
                }),
                phase,
            }),
        }
    }

    pub fn min_display(&self) -> Duration {
        self.min_display
    }

    pub fn state(&self) -> OverlayState {
        let inner = self.shared.lock();
        OverlayState {
            phase: inner.phase,
            shown_at: inner.shown_at,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.shared.lock().phase
    }

    /// Phase updates for the host renderer.
    pub fn subscribe(&self) -> watch::Receiver<OverlayPhase> {
        self.shared.phase.subscribe()
    }

    /// Show (or keep showing) the overlay and restart the display clock.
    pub fn show(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.shown_at = Some(Instant::now());
        if inner.phase != OverlayPhase::Showing {
            tracing::trace!(from = ?inner.phase, "loader shown");
            inner.phase = OverlayPhase::Showing;
            self.shared.publish(OverlayPhase::Showing);
        }
    }

    /// Hide the overlay, deferring until the minimum display time has passed.
    ///
    /// The deferral needs a Tokio runtime; called from outside one, the hide
    /// applies immediately.
    pub fn hide(&self) {
        let mut inner = self.shared.lock();
        if inner.phase != OverlayPhase::Showing {
            return;
        }

        let elapsed = inner.shown_at.map_or(self.min_display, |at| at.elapsed());
        if elapsed >= self.min_display {
            self.shared.hide_now(&mut inner);
            tracing::trace!("loader hidden");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime to defer the loader hide; hiding now");
            self.shared.hide_now(&mut inner);
            return;
        };

        let remaining = self.min_display - elapsed;
        let generation = inner.generation;
        inner.phase = OverlayPhase::PendingHide;
        self.shared.publish(OverlayPhase::PendingHide);
        drop(inner);

        let shared = self.shared.clone();
        runtime.spawn(async move {
            tokio::time::sleep(remaining).await;
            let mut inner = shared.lock();
            if inner.generation == generation && inner.phase == OverlayPhase::PendingHide {
                shared.hide_now(&mut inner);
                tracing::trace!("deferred loader hide applied");
            }
        });
    }
}
