//! End-to-end gate behavior against a mocked identity service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docgate_auth::{
    HttpIdentityClient, InMemoryStore, KeyValueStore, LEGACY_CAPABILITIES_KEY, RouteAccessRule,
    TIMESTAMP_KEY, TOKEN_KEY,
};
use docgate_core::{AuthFailure, GateError, ManualClock, RoutePath};
use docgate_events::{InMemoryEventBus, PageEvent};
use docgate_gate::{
    AuthGate, CycleOutcome, Document, Element, GateConfig, GateParts, GateRuntime, OverlayPhase,
    RecordingNavigator, Surface,
};

const CAPABILITIES: &str = "/api/accessibilityObjects";

struct World {
    gate: Arc<AuthGate>,
    kv: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    navigator: Arc<RecordingNavigator>,
}

fn docs_page() -> Document {
    let mut doc = Document::new();
    let nav = doc.append(doc.body(), Element::new("nav"));
    let group = doc.append(nav, Element::new("div").with_attr("role", "group"));
    for href in [
        "/api-reference/endpoint/accounts",
        "/api-reference/endpoint/contacts",
        "/api-reference/endpoint/investment",
        "/fields/Contact",
    ] {
        let item = doc.append(group, Element::new("li"));
        doc.append(item, Element::new("a").with_attr("href", href));
    }
    let public = doc.append(nav, Element::new("ul"));
    let item = doc.append(public, Element::new("li"));
    doc.append(item, Element::new("a").with_attr("href", "/introduction"));
    doc
}

fn world(server: &MockServer, config: GateConfig) -> World {
    let kv = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let navigator = Arc::new(RecordingNavigator::new());
    let identity = HttpIdentityClient::new(server.uri(), Duration::from_secs(5)).unwrap();
    let gate = AuthGate::new(
        config,
        GateParts {
            store: kv.clone(),
            clock: clock.clone(),
            identity: Arc::new(identity),
            navigator: navigator.clone(),
            document: Arc::new(Mutex::new(docs_page())),
        },
    );
    World {
        gate: Arc::new(gate),
        kv,
        clock,
        navigator,
    }
}

fn fast_config() -> GateConfig {
    GateConfig {
        loader_min_display: Duration::from_millis(20),
        ..GateConfig::default()
    }
}

async fn grant(server: &MockServer, token: &str, capabilities: &[&str], times: u64) {
    Mock::given(method("POST"))
        .and(path(CAPABILITIES))
        .and(header("Oauth-Token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessible_objects": capabilities
        })))
        .expect(times)
        .mount(server)
        .await;
}

async fn visit(w: &World, route: &str) -> CycleOutcome {
    w.gate.set_current_route(RoutePath::new(route));
    w.gate.run_cycle().await
}

fn visible_hrefs(w: &World) -> Vec<String> {
    w.gate.with_document(|doc| {
        doc.visible_nodes()
            .into_iter()
            .filter_map(|n| doc.element(n).href().map(str::to_string))
            .collect()
    })
}

#[tokio::test]
async fn anonymous_navigation_to_public_route_renders_without_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let w = world(&server, fast_config());
    let bus = Arc::new(InMemoryEventBus::<PageEvent>::new());
    let runtime = GateRuntime::start(w.gate.clone(), bus);

    runtime.publisher.navigate(Some("https://docs.example.com/"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(w.gate.current_route(), RoutePath::new("/"));
    assert!(w.navigator.redirects().is_empty());
    assert_eq!(w.gate.loader().phase(), OverlayPhase::Hidden);
    assert_eq!(visible_hrefs(&w), vec!["/introduction"]);
    assert_eq!(w.gate.with_document(|doc| doc.surface()), Surface::App);

    runtime.shutdown().await;
}

#[tokio::test]
async fn granted_route_renders_and_other_restricted_items_stay_hidden() {
    let server = MockServer::start().await;
    grant(&server, "tok", &["account", "investment__c"], 1).await;
    let w = world(&server, fast_config());
    w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/api-reference/endpoint/investment").await;

    assert!(matches!(outcome, CycleOutcome::Rendered(_)), "{outcome:?}");
    assert_eq!(w.gate.with_document(|doc| doc.surface()), Surface::App);
    assert_eq!(
        visible_hrefs(&w),
        vec![
            "/api-reference/endpoint/accounts",
            "/api-reference/endpoint/investment",
            "/introduction",
        ]
    );
}

#[tokio::test]
async fn missing_capability_renders_denial_and_keeps_session() {
    let server = MockServer::start().await;
    grant(&server, "tok", &["account"], 1).await;
    let w = world(&server, fast_config());
    w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/api-reference/endpoint/contacts").await;

    assert_eq!(
        outcome,
        CycleOutcome::Denied(GateError::policy_violation(
            "/api-reference/endpoint/contacts",
            "contact"
        ))
    );
    assert_eq!(w.gate.with_document(|doc| doc.surface()), Surface::AccessDenied);
    assert_eq!(w.kv.get(TOKEN_KEY).unwrap().as_deref(), Some("tok"));
    assert!(w.kv.get(TIMESTAMP_KEY).unwrap().is_some());
    assert!(w.navigator.redirects().is_empty());
}

#[tokio::test]
async fn expired_session_redirects_and_never_calls_the_identity_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let w = world(&server, fast_config());
    w.gate.sessions().set("tok").unwrap();
    w.kv.set(LEGACY_CAPABILITIES_KEY, r#"["account"]"#).unwrap();
    w.clock.advance(chrono::Duration::hours(1) + chrono::Duration::milliseconds(1));

    let outcome = visit(&w, "/fields/Contact").await;

    assert_eq!(
        outcome,
        CycleOutcome::Redirected {
            to: RoutePath::new("/login"),
            cause: Some(AuthFailure::Expired.into()),
        }
    );
    for key in [TOKEN_KEY, TIMESTAMP_KEY, LEGACY_CAPABILITIES_KEY] {
        assert_eq!(w.kv.get(key).unwrap(), None, "{key} should be cleared");
    }
    assert_eq!(w.navigator.redirects(), vec![RoutePath::new("/login")]);
}

#[tokio::test]
async fn forbidden_fetch_clears_session_and_denies_gated_routes_afterwards() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CAPABILITIES))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    let w = world(&server, fast_config());
    let session = w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/fields/Contact").await;
    assert_eq!(
        outcome,
        CycleOutcome::Redirected {
            to: RoutePath::new("/login"),
            cause: Some(AuthFailure::Rejected(403).into()),
        }
    );
    assert_eq!(w.kv.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(w.kv.get(TIMESTAMP_KEY).unwrap(), None);
    assert_eq!(w.gate.resolver().cached_for(&session), None);

    for route in ["/fields/Account", "/api-reference/endpoint/investment"] {
        let route = RoutePath::new(route);
        assert!(!w.gate.policy().evaluate(&route, None).allowed);
        w.gate.set_current_route(route);
        assert_eq!(
            w.gate.run_cycle().await,
            CycleOutcome::Redirected {
                to: RoutePath::new("/login"),
                cause: Some(AuthFailure::MissingToken.into()),
            }
        );
    }
}

#[tokio::test]
async fn unauthorized_fetch_clears_session_and_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CAPABILITIES))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let w = world(&server, fast_config());
    let session = w.gate.sessions().set("stale").unwrap();

    let outcome = visit(&w, "/api-reference/endpoint/accounts").await;

    assert_eq!(
        outcome,
        CycleOutcome::Redirected {
            to: RoutePath::new("/login"),
            cause: Some(AuthFailure::Rejected(401).into()),
        }
    );
    assert_eq!(w.kv.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(w.kv.get(TIMESTAMP_KEY).unwrap(), None);
    assert_eq!(w.gate.resolver().cached_for(&session), None);
    assert_eq!(w.navigator.redirects(), vec![RoutePath::new("/login")]);
    assert!(!w.gate.with_document(|doc| doc.is_authenticated()));
}

#[tokio::test]
async fn non_json_capability_body_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CAPABILITIES))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;
    let w = world(&server, fast_config());
    w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/introduction").await;

    let CycleOutcome::Redirected { to, cause: Some(cause) } = &outcome else {
        panic!("expected a redirect, got {outcome:?}");
    };
    assert_eq!(to, &RoutePath::new("/login"));
    assert!(matches!(cause, GateError::PermissionFetchFailure(_)), "{cause:?}");
    assert_eq!(w.kv.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(w.kv.get(TIMESTAMP_KEY).unwrap(), None);
    assert_eq!(w.navigator.last(), Some(RoutePath::new("/login")));
}

#[tokio::test]
async fn configured_route_outside_the_section_markers_is_gated() {
    let server = MockServer::start().await;
    grant(&server, "tok", &["account"], 1).await;
    let mut routes = docgate_auth::default_rules();
    routes.push(RouteAccessRule::requires("/guides/secret", "secret"));
    let w = world(
        &server,
        GateConfig {
            routes,
            ..fast_config()
        },
    );
    w.gate.with_document(|doc| {
        let body = doc.body();
        let item = doc.append(body, Element::new("li"));
        doc.append(item, Element::new("a").with_attr("href", "/guides/secret"));
    });

    assert_eq!(
        visit(&w, "/guides/secret").await,
        CycleOutcome::Redirected {
            to: RoutePath::new("/login"),
            cause: Some(AuthFailure::MissingToken.into()),
        }
    );

    w.gate.sessions().set("tok").unwrap();
    let outcome = visit(&w, "/guides/secret").await;
    assert_eq!(
        outcome,
        CycleOutcome::Denied(GateError::policy_violation("/guides/secret", "secret"))
    );
    assert_eq!(w.gate.with_document(|doc| doc.surface()), Surface::AccessDenied);
    assert!(w.gate.sessions().get().has_token());
}

#[tokio::test]
async fn links_to_configured_gated_routes_are_hidden() {
    let server = MockServer::start().await;
    grant(&server, "tok", &["account"], 1).await;
    let mut routes = docgate_auth::default_rules();
    routes.push(RouteAccessRule::requires("/guides/secret", "secret"));
    let w = world(
        &server,
        GateConfig {
            routes,
            ..fast_config()
        },
    );
    w.gate.with_document(|doc| {
        let body = doc.body();
        let item = doc.append(body, Element::new("li"));
        doc.append(item, Element::new("a").with_attr("href", "/guides/secret"));
    });
    w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/introduction").await;

    assert!(matches!(outcome, CycleOutcome::Rendered(_)), "{outcome:?}");
    assert!(!visible_hrefs(&w).contains(&"/guides/secret".to_string()));
    assert!(visible_hrefs(&w).contains(&"/api-reference/endpoint/accounts".to_string()));
}

#[tokio::test]
async fn slow_identity_service_times_out_as_a_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CAPABILITIES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!(["account"]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let w = world(
        &server,
        GateConfig {
            fetch_timeout: Duration::from_millis(100),
            ..fast_config()
        },
    );
    w.gate.sessions().set("tok").unwrap();

    let outcome = visit(&w, "/fields/Account").await;

    let CycleOutcome::Redirected { cause: Some(cause), .. } = &outcome else {
        panic!("expected a redirect, got {outcome:?}");
    };
    assert!(matches!(cause, GateError::PermissionFetchFailure(_)));
    assert!(!w.gate.sessions().get().has_token());
}

#[tokio::test]
async fn login_stores_session_then_gated_routes_resolve() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "fresh"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    grant(&server, "fresh", &["contact"], 1).await;
    let w = world(&server, fast_config());

    assert_eq!(visit(&w, "/login").await, CycleOutcome::LoginView);
    w.gate.login(" ana ", "secret").await.unwrap();
    assert_eq!(w.navigator.last(), Some(RoutePath::new("/")));
    assert_eq!(w.kv.get(TOKEN_KEY).unwrap().as_deref(), Some("fresh"));

    w.gate.with_document(|doc| {
        let body = doc.body();
        doc.append(body, Element::new("a").with_attr("href", "/fields/Contact"));
    });
    let outcome = visit(&w, "/fields/Contact").await;
    assert!(matches!(outcome, CycleOutcome::Rendered(_)), "{outcome:?}");
}

#[tokio::test]
async fn revocation_in_another_tab_redirects_immediately() {
    let server = MockServer::start().await;
    grant(&server, "tok", &["account"], 1).await;
    let w = world(&server, fast_config());
    w.gate.sessions().set("tok").unwrap();
    let bus = Arc::new(InMemoryEventBus::<PageEvent>::new());
    let runtime = GateRuntime::start(w.gate.clone(), bus);

    runtime.publisher.navigate(Some("/introduction"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(w.navigator.redirects().is_empty());

    runtime.publisher.storage_changed(TOKEN_KEY, None);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(w.navigator.redirects(), vec![RoutePath::new("/login")]);
    assert!(!w.gate.with_document(|doc| doc.is_authenticated()));
    runtime.shutdown().await;
}
