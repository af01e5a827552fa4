//! Memoized, single-flight permission resolution.
//!
//! The resolver is the only owner of the in-memory [`PermissionSet`] cache.
//! Concurrent callers for the same session token share one in-flight fetch;
//! the result is cached per token until [`PermissionResolver::invalidate`].
//!
//! Any failure is fail-closed: the cache is dropped and the stored session is
//! cleared, so every gated route evaluated afterwards is denied.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};

use docgate_core::{AuthFailure, GateError, GateResult};

use crate::{IdentityClient, IdentityError, PermissionSet, Session, SessionStore};

type SharedFetch = Shared<BoxFuture<'static, GateResult<PermissionSet>>>;

struct InFlight {
    token: String,
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct ResolverState {
    /// Bumped on every invalidation; results from older generations are not cached.
    generation: u64,
    cached: Option<(String, PermissionSet)>,
    in_flight: Option<InFlight>,
}

pub struct PermissionResolver {
    client: Arc<dyn IdentityClient>,
    sessions: Arc<SessionStore>,
    timeout: Duration,
    state: Arc<Mutex<ResolverState>>,
}

impl PermissionResolver {
    pub fn new(client: Arc<dyn IdentityClient>, sessions: Arc<SessionStore>, timeout: Duration) -> Self {
        Self {
            client,
            sessions,
            timeout,
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Resolve the permission set for `session`.
    ///
    /// Returns the cached set when one exists for this token, joins an
    /// in-flight fetch for the same token, or starts exactly one new fetch.
    pub async fn resolve(&self, session: &Session) -> GateResult<PermissionSet> {
        let Some(token) = session.token() else {
            return Err(AuthFailure::MissingToken.into());
        };
        if self.sessions.is_expired(session) {
            tracing::info!("session expired before permission fetch");
            self.end_session();
            return Err(AuthFailure::Expired.into());
        }

        let fetch = {
            let mut state = self.lock_state();
            match &state.cached {
                Some((cached_token, set)) if cached_token == token => return Ok(set.clone()),
                Some(_) => state.cached = None,
                None => {}
            }

            match &state.in_flight {
                Some(flight) if flight.token == token => {
                    tracing::debug!("joining in-flight permission fetch");
                    flight.fetch.clone()
                }
                _ => {
                    let generation = state.generation;
                    let fetch = self.start_fetch(token.to_string(), generation);
                    state.in_flight = Some(InFlight {
                        token: token.to_string(),
                        generation,
                        fetch: fetch.clone(),
                    });
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Currently cached set for `session`, without fetching.
    pub fn cached_for(&self, session: &Session) -> Option<PermissionSet> {
        let token = session.token()?;
        let state = self.lock_state();
        state
            .cached
            .as_ref()
            .filter(|(t, _)| t == token)
            .map(|(_, set)| set.clone())
    }

    /// Drop the cached set and detach any in-flight fetch from the cache.
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        state.cached = None;
        state.in_flight = None;
    }

    /// Invalidate and remove the persisted session.
    pub fn end_session(&self) {
        self.invalidate();
        if let Err(err) = self.sessions.clear() {
            tracing::error!(error = %err, "failed to clear session storage");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn start_fetch(&self, token: String, generation: u64) -> SharedFetch {
        let client = self.client.clone();
        let sessions = self.sessions.clone();
        let timeout = self.timeout;
        let state: Weak<Mutex<ResolverState>> = Arc::downgrade(&self.state);

        async move {
            tracing::debug!("fetching permissions from identity service");
            let result = match tokio::time::timeout(timeout, client.fetch_capabilities(&token)).await {
                Ok(result) => result,
                Err(_) => Err(IdentityError::Timeout),
            };

            let current = match state.upgrade() {
                Some(state) => {
                    let mut state = match state.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let current = state.generation == generation;
                    if state
                        .in_flight
                        .as_ref()
                        .is_some_and(|f| f.generation == generation && f.token == token)
                    {
                        state.in_flight = None;
                    }
                    if current {
                        match &result {
                            Ok(set) => state.cached = Some((token.clone(), set.clone())),
                            Err(_) => {
                                state.cached = None;
                                state.generation += 1;
                            }
                        }
                    }
                    current
                }
                None => false,
            };

            match result {
                Ok(set) => {
                    tracing::debug!(capabilities = set.len(), "permissions resolved");
                    Ok(set)
                }
                Err(err) => {
                    let gate_err = match &err {
                        IdentityError::Rejected(status) => {
                            tracing::warn!(status, "identity service rejected session token");
                            GateError::from(AuthFailure::Rejected(*status))
                        }
                        other => {
                            tracing::error!(error = %other, "permission fetch failed");
                            GateError::fetch_failure(other.to_string())
                        }
                    };
                    // A stale fetch must not wipe a session that replaced it.
                    if current {
                        if let Err(store_err) = sessions.clear() {
                            tracing::error!(error = %store_err, "failed to clear session storage");
                        }
                    }
                    Err(gate_err)
                }
            }
        }
        .boxed()
        .shared()
    }
}
