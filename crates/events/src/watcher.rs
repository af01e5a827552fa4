//! Re-evaluation scheduler.
//!
//! `Idle -> Scheduled -> Evaluating -> Idle`, for the lifetime of the page.
//!
//! Every debounced [`PageEvent`] pushes the deadline out to the latest
//! settle time requested so far, so a burst collapses into one cycle. The
//! first pending event also fixes a ceiling ([`MAX_COALESCE_WAIT`]) so a page
//! that never stops changing is still evaluated.
//! Cycles never overlap: events that arrive while a cycle runs are queued
//! and become exactly one follow-up cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use docgate_core::RoutePath;

use crate::{PageEvent, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Scheduled,
    Evaluating,
}

/// The merged cause of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    /// Most recent route change folded into this cycle, if any.
    pub navigated_to: Option<RoutePath>,
    /// Number of events coalesced into this cycle.
    pub coalesced: usize,
}

impl Trigger {
    fn absorb(&mut self, event: &PageEvent) {
        if let PageEvent::Navigated { path } = event {
            self.navigated_to = Some(path.clone());
        }
        self.coalesced += 1;
    }
}

/// Longest a pending cycle can be postponed: twice the longest settle delay.
pub const MAX_COALESCE_WAIT: Duration = Duration::from_millis(200);

/// Pure debounce bookkeeping (no timers of its own).
#[derive(Debug, Default)]
pub struct Debouncer {
    deadline: Option<Instant>,
    ceiling: Option<Instant>,
    pending: Option<Trigger>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event in; returns `false` for events that bypass the debounce.
    pub fn push(&mut self, event: &PageEvent, now: Instant) -> bool {
        let Some(delay) = event.settle_delay() else {
            return false;
        };
        let ceiling = *self.ceiling.get_or_insert(now + MAX_COALESCE_WAIT);
        let due = now + delay;
        self.deadline = Some(self.deadline.map_or(due, |d| d.max(due)).min(ceiling));
        self.pending.get_or_insert_with(Trigger::default).absorb(event);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending trigger and reset.
    pub fn take(&mut self) -> Option<Trigger> {
        self.deadline = None;
        self.ceiling = None;
        self.pending.take()
    }
}

/// What the watcher drives.
#[async_trait]
pub trait CycleEvaluator: Send + Sync {
    /// Run one full evaluation cycle.
    async fn evaluate(&self, trigger: Trigger);

    /// A persisted key changed elsewhere; handled immediately.
    async fn storage_changed(&self, key: &str, new_value: Option<&str>);

    /// Called synchronously when a debounced event arrives, before the delay.
    fn triggered(&self, _event: &PageEvent) {}
}

/// Control handle for a running watcher.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    shutdown: Arc<Notify>,
    state: watch::Receiver<WatchState>,
}

impl WatcherHandle {
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

pub struct NavigationWatcher<E: ?Sized> {
    subscription: Subscription<PageEvent>,
    evaluator: Arc<E>,
    state: watch::Sender<WatchState>,
    shutdown: Arc<Notify>,
}

impl<E> NavigationWatcher<E>
where
    E: CycleEvaluator + ?Sized + 'static,
{
    pub fn new(subscription: Subscription<PageEvent>, evaluator: Arc<E>) -> (Self, WatcherHandle) {
        let (state, state_rx) = watch::channel(WatchState::Idle);
        let shutdown = Arc::new(Notify::new());
        let handle = WatcherHandle {
            shutdown: shutdown.clone(),
            state: state_rx,
        };
        (
            Self {
                subscription,
                evaluator,
                state,
                shutdown,
            },
            handle,
        )
    }

    /// Spawn the watcher loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown or until the bus goes away.
    pub async fn run(mut self) {
        tracing::debug!("navigation watcher started");
        let mut debouncer = Debouncer::new();

        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    tracing::debug!("navigation watcher received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let Some(trigger) = debouncer.take() else {
                        continue;
                    };
                    self.set_state(WatchState::Evaluating);
                    tracing::debug!(coalesced = trigger.coalesced, "running evaluation cycle");
                    self.evaluator.evaluate(trigger).await;
                    self.set_state(WatchState::Idle);
                }
                event = self.subscription.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("page event bus closed");
                        break;
                    };
                    self.handle(&mut debouncer, event).await;
                }
            }
        }

        self.set_state(WatchState::Idle);
        tracing::debug!("navigation watcher stopped");
    }

    async fn handle(&self, debouncer: &mut Debouncer, event: PageEvent) {
        if let PageEvent::StorageChanged { key, new_value } = &event {
            self.evaluator.storage_changed(key, new_value.as_deref()).await;
            return;
        }

        self.evaluator.triggered(&event);
        if debouncer.push(&event, Instant::now()) {
            tracing::trace!(kind = event.kind(), "evaluation scheduled");
            self.set_state(WatchState::Scheduled);
        }
    }

    fn set_state(&self, state: WatchState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::{EventBus, InMemoryEventBus};

    #[derive(Default)]
    struct Recorder {
        cycles: Mutex<Vec<(Instant, Trigger)>>,
        storage: Mutex<Vec<(String, Option<String>)>>,
        triggered: Mutex<usize>,
        eval_time: Duration,
    }

    #[async_trait]
    impl CycleEvaluator for Recorder {
        async fn evaluate(&self, trigger: Trigger) {
            self.cycles.lock().unwrap().push((Instant::now(), trigger));
            if !self.eval_time.is_zero() {
                tokio::time::sleep(self.eval_time).await;
            }
        }

        async fn storage_changed(&self, key: &str, new_value: Option<&str>) {
            self.storage
                .lock()
                .unwrap()
                .push((key.to_string(), new_value.map(str::to_string)));
        }

        fn triggered(&self, _event: &PageEvent) {
            *self.triggered.lock().unwrap() += 1;
        }
    }

    fn spawn(recorder: Arc<Recorder>) -> (Arc<InMemoryEventBus<PageEvent>>, WatcherHandle) {
        let bus = Arc::new(InMemoryEventBus::new());
        let (watcher, handle) = NavigationWatcher::new(bus.subscribe(), recorder);
        watcher.start();
        (bus, handle)
    }

    fn nav(path: &str) -> PageEvent {
        PageEvent::Navigated {
            path: RoutePath::new(path),
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn debouncer_extends_to_the_latest_deadline() {
        let start = Instant::now();
        let mut d = Debouncer::new();

        assert!(d.push(&PageEvent::DialogOpened, start));
        assert!(d.push(&nav("/a"), start + Duration::from_millis(70)));
        assert_eq!(d.deadline(), Some(start + Duration::from_millis(120)));

        let trigger = d.take().unwrap();
        assert_eq!(trigger.coalesced, 2);
        assert_eq!(trigger.navigated_to, Some(RoutePath::new("/a")));
        assert!(!d.is_scheduled());

        assert!(!d.push(
            &PageEvent::StorageChanged {
                key: "access_token".into(),
                new_value: None
            },
            start
        ));
        assert_eq!(d.deadline(), None);
    }

    #[test]
    fn debouncer_deadline_never_passes_the_first_event_ceiling() {
        let start = Instant::now();
        let mut d = Debouncer::new();

        for step in 0..10u64 {
            d.push(&PageEvent::SubtreeGrew { added: 1 }, start + Duration::from_millis(60 * step));
            assert!(d.deadline().unwrap() <= start + MAX_COALESCE_WAIT);
        }
        assert_eq!(d.deadline(), Some(start + MAX_COALESCE_WAIT));

        d.take();
        let later = start + Duration::from_millis(600);
        d.push(&PageEvent::SubtreeGrew { added: 1 }, later);
        assert_eq!(d.deadline(), Some(later + Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn steady_growth_events_still_produce_cycles() {
        let recorder = Arc::new(Recorder::default());
        let (bus, _handle) = spawn(recorder.clone());

        for _ in 0..20 {
            bus.publish(PageEvent::SubtreeGrew { added: 1 }).unwrap();
            advance(60).await;
        }
        advance(500).await;

        let cycles = recorder.cycles.lock().unwrap();
        assert!(cycles.len() >= 5, "only {} cycles", cycles.len());
        for pair in cycles.windows(2) {
            assert!(pair[1].0 - pair[0].0 <= MAX_COALESCE_WAIT + Duration::from_millis(60));
        }
        assert_eq!(cycles.iter().map(|(_, t)| t.coalesced).sum::<usize>(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_is_evaluated_after_its_settle_delay() {
        let recorder = Arc::new(Recorder::default());
        let (bus, handle) = spawn(recorder.clone());
        let start = Instant::now();

        bus.publish(nav("/fields/Account")).unwrap();
        advance(49).await;
        assert!(recorder.cycles.lock().unwrap().is_empty());
        assert_eq!(handle.state(), WatchState::Scheduled);

        advance(2).await;
        let cycles = recorder.cycles.lock().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].0 - start, Duration::from_millis(50));
        assert_eq!(handle.state(), WatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_cycle() {
        let recorder = Arc::new(Recorder::default());
        let (bus, _handle) = spawn(recorder.clone());

        bus.publish(nav("/a")).unwrap();
        bus.publish(PageEvent::ViewportResized { width: 800, height: 600 }).unwrap();
        advance(30).await;
        bus.publish(PageEvent::SubtreeGrew { added: 3 }).unwrap();
        bus.publish(nav("/b")).unwrap();
        advance(500).await;

        let cycles = recorder.cycles.lock().unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].1.coalesced, 4);
        assert_eq!(cycles[0].1.navigated_to, Some(RoutePath::new("/b")));
        assert_eq!(*recorder.triggered.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn events_during_evaluation_yield_exactly_one_follow_up() {
        let recorder = Arc::new(Recorder {
            eval_time: Duration::from_millis(200),
            ..Recorder::default()
        });
        let (bus, handle) = spawn(recorder.clone());

        bus.publish(PageEvent::DialogOpened).unwrap();
        advance(150).await;
        assert_eq!(handle.state(), WatchState::Evaluating);

        bus.publish(PageEvent::SubtreeGrew { added: 1 }).unwrap();
        bus.publish(PageEvent::SubtreeGrew { added: 2 }).unwrap();
        bus.publish(nav("/c")).unwrap();
        advance(1_000).await;

        let cycles = recorder.cycles.lock().unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[1].1.coalesced, 3);
        // The follow-up starts only after the first cycle finished.
        assert!(cycles[1].0 - cycles[0].0 >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_changes_bypass_the_debounce() {
        let recorder = Arc::new(Recorder::default());
        let (bus, _handle) = spawn(recorder.clone());

        bus.publish(PageEvent::StorageChanged {
            key: "access_token".into(),
            new_value: None,
        })
        .unwrap();
        tokio::task::yield_now().await;
        advance(1).await;

        assert_eq!(
            recorder.storage.lock().unwrap().as_slice(),
            &[("access_token".to_string(), None)]
        );
        assert!(recorder.cycles.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_cycles() {
        let recorder = Arc::new(Recorder::default());
        let bus = Arc::new(InMemoryEventBus::new());
        let (watcher, handle) = NavigationWatcher::new(bus.subscribe(), recorder.clone());
        let task = watcher.start();

        bus.publish(nav("/a")).unwrap();
        advance(10).await;
        handle.shutdown();
        task.await.unwrap();
        advance(500).await;

        assert!(recorder.cycles.lock().unwrap().is_empty());
        assert_eq!(handle.state(), WatchState::Idle);
    }
}
