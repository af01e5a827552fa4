//! Static route → capability policy.
//!
//! The table is allow-by-default: a route that is not listed is public, so
//! every protected route has to be enumerated explicitly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use docgate_core::{Capability, GateError, RoutePath};

use crate::PermissionSet;

/// One entry of the policy table. `required_capability = None` means public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAccessRule {
    pub route_pattern: String,
    #[serde(default)]
    pub required_capability: Option<Capability>,
}

impl RouteAccessRule {
    pub fn public(route: impl Into<String>) -> Self {
        Self {
            route_pattern: route.into(),
            required_capability: None,
        }
    }

    pub fn requires(route: impl Into<String>, capability: impl Into<Capability>) -> Self {
        Self {
            route_pattern: route.into(),
            required_capability: Some(capability.into()),
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    /// The route has no required capability.
    Public,
    /// The permission set holds the required capability.
    Granted,
    /// No usable permission set (unresolved, failed, or empty).
    Unresolved,
    /// Permissions are known but lack the capability.
    MissingCapability(Capability),
}

/// Result of [`AccessPolicy::evaluate`]. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// Convert a denial into a [`GateError::PolicyViolation`].
    pub fn into_result(self, route: &RoutePath, required: Option<&Capability>) -> Result<(), GateError> {
        if self.allowed {
            return Ok(());
        }
        let capability = required.map(|c| c.to_string()).unwrap_or_default();
        Err(GateError::policy_violation(route.as_str(), capability))
    }
}

/// Route policy table plus the markers that identify restricted references.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: HashMap<String, Option<Capability>>,
    restricted_prefixes: Vec<String>,
}

impl AccessPolicy {
    /// Build the policy. Later duplicates of a route override earlier ones.
    pub fn new(
        rules: impl IntoIterator<Item = RouteAccessRule>,
        restricted_prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut table = HashMap::new();
        for rule in rules {
            if table
                .insert(rule.route_pattern.clone(), rule.required_capability)
                .is_some()
            {
                tracing::warn!(route = %rule.route_pattern, "duplicate route rule; last entry wins");
            }
        }

        Self {
            rules: table,
            restricted_prefixes: restricted_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact-match lookup; unmapped routes are public.
    pub fn required_capability(&self, route: &RoutePath) -> Option<&Capability> {
        self.rules.get(route.as_str()).and_then(Option::as_ref)
    }

    pub fn evaluate(&self, route: &RoutePath, permissions: Option<&PermissionSet>) -> AccessDecision {
        let Some(required) = self.required_capability(route) else {
            return AccessDecision::allow(DecisionReason::Public);
        };

        match permissions {
            None => AccessDecision::deny(DecisionReason::Unresolved),
            Some(set) if set.is_empty() => AccessDecision::deny(DecisionReason::Unresolved),
            Some(set) if set.contains(required) => AccessDecision::allow(DecisionReason::Granted),
            Some(_) => AccessDecision::deny(DecisionReason::MissingCapability(required.clone())),
        }
    }

    /// Whether an href points into a gated section or at a route the table
    /// gates.
    pub fn is_restricted_reference(&self, href: &str) -> bool {
        if self.restricted_prefixes.iter().any(|p| href.contains(p.as_str())) {
            return true;
        }
        let route = RoutePath::from_href(Some(href), &RoutePath::new(""));
        self.required_capability(&route).is_some()
    }

    pub fn restricted_prefixes(&self) -> &[String] {
        &self.restricted_prefixes
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules, sorted by route for stable output.
    pub fn rules(&self) -> Vec<RouteAccessRule> {
        let mut rules: Vec<RouteAccessRule> = self
            .rules
            .iter()
            .map(|(route, cap)| RouteAccessRule {
                route_pattern: route.clone(),
                required_capability: cap.clone(),
            })
            .collect();
        rules.sort_by(|a, b| a.route_pattern.cmp(&b.route_pattern));
        rules
    }
}

pub const DEFAULT_RESTRICTED_PREFIXES: [&str; 2] = ["/api-reference/endpoint/", "/fields/"];

/// The documentation site's route table.
pub fn default_rules() -> Vec<RouteAccessRule> {
    vec![
        RouteAccessRule::public("/api-reference/endpoint/auth"),
        RouteAccessRule::requires("/api-reference/endpoint/accounts", "account"),
        RouteAccessRule::requires("/api-reference/endpoint/contacts", "contact"),
        RouteAccessRule::requires("/api-reference/endpoint/metro-area", "metro_area__c"),
        RouteAccessRule::requires(
            "/api-reference/endpoint/marketplace-searches",
            "marketplace_searches__c",
        ),
        RouteAccessRule::requires("/api-reference/endpoint/conference", "conference__c"),
        RouteAccessRule::requires("/api-reference/endpoint/investment", "investment__c"),
        RouteAccessRule::requires(
            "/api-reference/endpoint/investment-strategy",
            "investment_strategy__c",
        ),
        RouteAccessRule::requires(
            "/api-reference/endpoint/manager-presentation",
            "manager_presentation__c",
        ),
        RouteAccessRule::requires(
            "/api-reference/endpoint/public-plan-minutes",
            "public_plan_minute__c",
        ),
        RouteAccessRule::requires("/api-reference/endpoint/member-comments", "member_comments__c"),
        RouteAccessRule::requires("/api-reference/endpoint/dakota-content", "dakota_content__c"),
        RouteAccessRule::requires("/api-reference/endpoint/dakota-news", "dakota_news__c"),
        RouteAccessRule::requires("/api-reference/endpoint/updates", "updates"),
        RouteAccessRule::requires(
            "/api-reference/endpoint/custom-account-contact-relation",
            "custom_accountcontactrelation",
        ),
        RouteAccessRule::requires("/fields/Account", "account"),
        RouteAccessRule::requires("/fields/Contact", "contact"),
        RouteAccessRule::requires("/fields/MetroArea", "metro_area__c"),
        RouteAccessRule::requires("/fields/MarketplaceSearches", "marketplace_searches__c"),
        RouteAccessRule::requires("/fields/Investment", "investment__c"),
        RouteAccessRule::requires("/fields/PublicPlanMinutes", "public_plan_minute__c"),
        RouteAccessRule::requires("/fields/Conference", "conference__c"),
        RouteAccessRule::requires("/fields/ManagerPresentation", "manager_presentation__c"),
    ]
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(default_rules(), DEFAULT_RESTRICTED_PREFIXES)
    }
}
