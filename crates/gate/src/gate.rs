//! The authorization gate.
//!
//! One evaluation cycle decides, for the current route, between four
//! outcomes: the login view, a redirect, a full-page denial, or the rendered
//! page with unauthorized references hidden. Redirects end the cycle; nothing
//! is reconciled after one is issued.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::Instrument;

use docgate_auth::{
    AccessPolicy, IdentityClient, IdentityError, KeyValueStore, PermissionResolver, PermissionSet,
    Session, SessionStore, TOKEN_KEY,
};
use docgate_core::{AuthFailure, Clock, GateError, GateResult, RoutePath};
use docgate_events::{CycleEvaluator, PageEvent, Trigger};

use crate::affordance::{inject_logout_button, remove_logout_controls, replace_more_actions};
use crate::config::GateConfig;
use crate::dom::{Document, Element, Surface};
use crate::loader::LoaderController;
use crate::navigator::Navigator;
use crate::reconciler::{DomReconciler, ReconcileReport};

const EMPTY_FIELDS_MESSAGE: &str = "Please enter both username and password.";

/// External collaborators the gate is wired to.
pub struct GateParts {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub identity: Arc<dyn IdentityClient>,
    pub navigator: Arc<dyn Navigator>,
    pub document: Arc<Mutex<Document>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The login route was rendered.
    LoginView,
    /// The user was sent elsewhere. `cause` is `None` for the
    /// already-authenticated bounce off the login route.
    Redirected {
        to: RoutePath,
        cause: Option<GateError>,
    },
    /// The current route was replaced by the access-denied view.
    Denied(GateError),
    /// The page rendered; denied references were hidden.
    Rendered(ReconcileReport),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::LoginView => "login_view",
            CycleOutcome::Redirected { .. } => "redirected",
            CycleOutcome::Denied(_) => "denied",
            CycleOutcome::Rendered(_) => "rendered",
        }
    }
}

pub struct AuthGate {
    config: GateConfig,
    policy: AccessPolicy,
    identity: Arc<dyn IdentityClient>,
    resolver: PermissionResolver,
    loader: LoaderController,
    navigator: Arc<dyn Navigator>,
    document: Arc<Mutex<Document>>,
    current: Mutex<RoutePath>,
}

impl AuthGate {
    pub fn new(config: GateConfig, parts: GateParts) -> Self {
        let sessions = Arc::new(SessionStore::new(
            parts.store,
            parts.clock,
            config.session_max_age,
        ));
        let resolver = PermissionResolver::new(parts.identity.clone(), sessions, config.fetch_timeout);

        Self {
            policy: config.policy(),
            loader: LoaderController::new(config.loader_min_display),
            current: Mutex::new(config.home_route()),
            identity: parts.identity,
            navigator: parts.navigator,
            document: parts.document,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.resolver.sessions()
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn loader(&self) -> &LoaderController {
        &self.loader
    }

    pub fn current_route(&self) -> RoutePath {
        lock(&self.current).clone()
    }

    pub fn set_current_route(&self, route: RoutePath) {
        *lock(&self.current) = route;
    }

    /// Run `f` against the document. The lock is never held across an await.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut lock(&self.document))
    }

    /// Evaluate the current route once.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let route = self.current_route();
        let span = tracing::debug_span!("cycle", route = %route);
        async move {
            let outcome = self.evaluate_route(&route).await;
            tracing::debug!(outcome = outcome.label(), "cycle complete");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn evaluate_route(&self, route: &RoutePath) -> CycleOutcome {
        if self.config.is_login_route(route) {
            return self.show_login_surface();
        }
        if self.config.shows_loader_for(route) {
            self.loader.show();
        }

        let sessions = self.sessions();
        let session = sessions.get();
        let required = self.policy.required_capability(route).cloned();

        if !session.has_token() {
            if required.is_some() {
                return self.redirect_to_login(AuthFailure::MissingToken.into());
            }
            tracing::debug!("anonymous visit to a public route");
            return self.render(None);
        }
        if sessions.is_expired(&session) {
            tracing::info!("stored session has expired");
            self.resolver.end_session();
            return self.redirect_to_login(AuthFailure::Expired.into());
        }

        self.with_document(|doc| {
            doc.set_authenticated(true);
            inject_logout_button(doc);
            replace_more_actions(doc);
        });

        if let Some(required) = required.as_ref() {
            self.loader.show();
            let permissions = match self.resolver.resolve(&session).await {
                Ok(p) => p,
                Err(err) => return self.redirect_to_login(err),
            };
            let decision = self.policy.evaluate(route, Some(&permissions));
            let reason = decision.reason.clone();
            if let Err(violation) = decision.into_result(route, Some(required)) {
                tracing::warn!(reason = ?reason, "access to current route denied");
                return self.deny(violation);
            }
        }

        let permissions = if self.has_restricted_references() {
            match self.resolver.resolve(&session).await {
                Ok(p) => Some(p),
                Err(err) => return self.redirect_to_login(err),
            }
        } else {
            self.resolver.cached_for(&session)
        };
        self.render(permissions.as_ref())
    }

    fn has_restricted_references(&self) -> bool {
        self.with_document(|doc| DomReconciler::new(&self.policy).has_restricted_references(doc))
    }

    fn render(&self, permissions: Option<&PermissionSet>) -> CycleOutcome {
        let report = self.with_document(|doc| DomReconciler::new(&self.policy).reconcile(doc, permissions));
        self.loader.hide();
        CycleOutcome::Rendered(report)
    }

    fn deny(&self, violation: GateError) -> CycleOutcome {
        self.with_document(|doc| {
            doc.render_surface(Surface::AccessDenied, Element::new("div").with_text("Access Denied"));
        });
        self.loader.hide();
        CycleOutcome::Denied(violation)
    }

    fn show_login_surface(&self) -> CycleOutcome {
        let sessions = self.sessions();
        let session = sessions.get();
        if session.has_token() {
            if !sessions.is_expired(&session) {
                tracing::info!("already authenticated; leaving the login route");
                self.loader.hide();
                let to = self.config.home_route();
                self.redirect(&to);
                return CycleOutcome::Redirected { to, cause: None };
            }
            tracing::info!("clearing expired session on the login route");
            self.resolver.end_session();
        }

        self.with_document(|doc| {
            doc.set_authenticated(false);
            doc.render_surface(Surface::Login, Element::new("form").with_attr("data-action", "login"));
        });
        self.loader.hide();
        CycleOutcome::LoginView
    }

    /// Terminal for the cycle. The resolver has already cleared the stored
    /// session for failures it reported.
    fn redirect_to_login(&self, cause: GateError) -> CycleOutcome {
        self.drop_authenticated_ui();
        self.loader.hide();
        let to = self.config.login_route();
        tracing::info!(cause = %cause, "redirecting to login");
        self.redirect(&to);
        CycleOutcome::Redirected {
            to,
            cause: Some(cause),
        }
    }

    fn redirect(&self, to: &RoutePath) {
        self.set_current_route(to.clone());
        self.navigator.redirect(to);
    }

    fn drop_authenticated_ui(&self) {
        self.with_document(|doc| {
            doc.set_authenticated(false);
            remove_logout_controls(doc);
        });
    }

    /// Exchange credentials for a session and go home.
    pub async fn login(&self, username: &str, password: &str) -> GateResult<Session> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthFailure::InvalidCredentials(EMPTY_FIELDS_MESSAGE.to_string()).into());
        }

        let token = self.identity.login(username, password).await.map_err(|err| {
            tracing::warn!(error = %err, "login rejected");
            let message = match err {
                IdentityError::LoginFailed(message) => message,
                other => other.to_string(),
            };
            GateError::from(AuthFailure::InvalidCredentials(message))
        })?;

        self.resolver.invalidate();
        let session = self.sessions().set(&token).map_err(|err| {
            tracing::error!(error = %err, "failed to persist session");
            GateError::from(AuthFailure::InvalidCredentials(format!(
                "could not store session: {err}"
            )))
        })?;

        tracing::info!("login succeeded");
        self.with_document(|doc| doc.set_authenticated(true));
        let home = self.config.home_route();
        self.redirect(&home);
        Ok(session)
    }

    /// End the session and return to the login route.
    pub fn logout(&self) {
        tracing::info!("logging out");
        self.resolver.end_session();
        self.drop_authenticated_ui();
        let to = self.config.login_route();
        self.redirect(&to);
    }

    /// React to a storage change made by another tab. Returns whether the
    /// change revoked this tab's session.
    pub fn apply_storage_change(&self, key: &str, new_value: Option<&str>) -> bool {
        if key != TOKEN_KEY || new_value.is_some() {
            return false;
        }
        tracing::info!("session token removed elsewhere");
        self.resolver.invalidate();
        self.drop_authenticated_ui();
        self.loader.hide();
        if !self.config.is_login_route(&self.current_route()) {
            let to = self.config.login_route();
            self.redirect(&to);
        }
        true
    }
}

#[async_trait]
impl CycleEvaluator for AuthGate {
    async fn evaluate(&self, trigger: Trigger) {
        if let Some(path) = trigger.navigated_to {
            self.set_current_route(path);
        }
        let outcome = self.run_cycle().await;
        tracing::trace!(
            coalesced = trigger.coalesced,
            outcome = outcome.label(),
            "triggered cycle finished"
        );
    }

    async fn storage_changed(&self, key: &str, new_value: Option<&str>) {
        self.apply_storage_change(key, new_value);
    }

    fn triggered(&self, event: &PageEvent) {
        let route = match event {
            PageEvent::Navigated { path } => path.clone(),
            _ => self.current_route(),
        };
        if self.config.shows_loader_for(&route) && !self.config.is_login_route(&route) {
            self.loader.show();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
