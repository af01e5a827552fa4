//! Headless gate run: evaluate one route against the live identity service
//! and print which restricted sidebar entries stay visible.
//!
//! Usage: `docgate [config.json]`. Environment: `DOCGATE_STATE` (session
//! file), `DOCGATE_ROUTE`, `DOCGATE_USERNAME` / `DOCGATE_PASSWORD`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;

use docgate_auth::{FileStore, HttpIdentityClient};
use docgate_core::{RoutePath, SystemClock};
use docgate_gate::{AuthGate, CycleOutcome, Document, Element, GateConfig, GateParts, LogNavigator};

const DEFAULT_STATE_PATH: &str = ".docgate/session.json";

/// One sidebar entry per configured route.
fn sidebar(config: &GateConfig) -> Document {
    let mut doc = Document::new();
    let nav = doc.append(doc.body(), Element::new("nav"));
    let list = doc.append(nav, Element::new("ul").with_attr("role", "group"));
    for rule in &config.routes {
        let item = doc.append(list, Element::new("li"));
        doc.append(
            item,
            Element::new("a")
                .with_attr("href", rule.route_pattern.clone())
                .with_text(rule.route_pattern.clone()),
        );
    }
    doc
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = GateConfig::load(config_path.as_deref())?;
    docgate_observability::tracing::init(&config.logging);

    let state_path = std::env::var("DOCGATE_STATE").unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string());
    let identity = HttpIdentityClient::new(config.identity_base_url.clone(), config.fetch_timeout)
        .context("failed to build identity client")?;
    let document = Arc::new(Mutex::new(sidebar(&config)));

    let gate = AuthGate::new(
        config,
        GateParts {
            store: Arc::new(FileStore::new(state_path)),
            clock: Arc::new(SystemClock),
            identity: Arc::new(identity),
            navigator: Arc::new(LogNavigator),
            document: document.clone(),
        },
    );

    if let (Ok(username), Ok(password)) = (
        std::env::var("DOCGATE_USERNAME"),
        std::env::var("DOCGATE_PASSWORD"),
    ) {
        let session = gate.sessions().get();
        if !session.has_token() || gate.sessions().is_expired(&session) {
            gate.login(&username, &password).await.context("login failed")?;
        }
    }

    let route = std::env::var("DOCGATE_ROUTE")
        .map(RoutePath::new)
        .unwrap_or_else(|_| gate.config().home_route());
    gate.set_current_route(route.clone());

    let outcome = gate.run_cycle().await;
    tracing::info!(route = %route, outcome = outcome.label(), "evaluation finished");

    match &outcome {
        CycleOutcome::Redirected { to, cause } => {
            let cause = cause.as_ref().map(ToString::to_string).unwrap_or_default();
            println!("redirect {to} {cause}");
        }
        CycleOutcome::Denied(violation) => println!("denied: {violation}"),
        CycleOutcome::LoginView => println!("login"),
        CycleOutcome::Rendered(_) => {
            let doc = document
                .lock()
                .map_err(|_| anyhow::anyhow!("document lock poisoned"))?;
            for node in doc.visible_nodes() {
                if let Some(href) = doc.element(node).href() {
                    println!("{href}");
                }
            }
        }
    }

    Ok(())
}
