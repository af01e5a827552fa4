//! Hides navigation entries the current permission set does not cover.
//!
//! Reconciliation is a pure function of the document and the permission set:
//! running it twice, or over references in a different order, leaves the same
//! set of visible nodes.

use docgate_auth::{AccessPolicy, PermissionSet};
use docgate_core::RoutePath;

use crate::dom::{Document, Element, NodeId};

/// Levels between a card's link and the card's outer container.
const CARD_DEPTH: usize = 3;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Restricted references seen on the page.
    pub examined: usize,
    /// Containers newly hidden because their reference is denied.
    pub hidden: Vec<NodeId>,
    /// Bare references detached because they had no container.
    pub removed: Vec<NodeId>,
    /// Groups collapsed because nothing visible was left in them.
    pub collapsed: Vec<NodeId>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !(self.hidden.is_empty() && self.removed.is_empty() && self.collapsed.is_empty())
    }
}

fn is_nav_item(el: &Element) -> bool {
    el.is("li")
        || el.role() == Some("menuitem")
        || el.has_class("nav-item")
        || el.attr("data-testid").is_some()
}

fn is_group(el: &Element) -> bool {
    el.role() == Some("group") || el.has_class("nav-group") || el.attr("data-group").is_some()
}

fn is_link(el: &Element) -> bool {
    el.is("a") && el.href().is_some()
}

enum Target {
    Hide(NodeId),
    Detach(NodeId),
}

pub struct DomReconciler<'a> {
    policy: &'a AccessPolicy,
}

impl<'a> DomReconciler<'a> {
    pub fn new(policy: &'a AccessPolicy) -> Self {
        Self { policy }
    }

    /// Whether the page currently shows any reference into a gated section.
    pub fn has_restricted_references(&self, doc: &Document) -> bool {
        !self.references(doc).is_empty()
    }

    pub fn reconcile(&self, doc: &mut Document, permissions: Option<&PermissionSet>) -> ReconcileReport {
        let references = self.references(doc);
        let mut report = ReconcileReport {
            examined: references.len(),
            ..ReconcileReport::default()
        };

        // Resolve every target before mutating so the outcome does not
        // depend on the order references are visited in.
        let mut targets = Vec::new();
        for (node, route) in &references {
            let decision = self.policy.evaluate(route, permissions);
            if decision.allowed {
                continue;
            }
            tracing::trace!(route = %route, reason = ?decision.reason, "hiding restricted reference");
            targets.push(self.target_for(doc, *node));
        }

        for target in targets {
            match target {
                Target::Hide(node) => {
                    if doc.set_hidden(node, true) {
                        report.hidden.push(node);
                    }
                }
                Target::Detach(node) => {
                    if doc.detach(node) {
                        report.removed.push(node);
                    }
                }
            }
        }

        self.collapse_groups(doc, &mut report);

        if report.changed() {
            tracing::debug!(
                examined = report.examined,
                hidden = report.hidden.len(),
                removed = report.removed.len(),
                collapsed = report.collapsed.len(),
                "navigation reconciled"
            );
        }
        report
    }

    fn references(&self, doc: &Document) -> Vec<(NodeId, RoutePath)> {
        doc.query_all(|el| el.href().is_some_and(|h| self.policy.is_restricted_reference(h)))
            .into_iter()
            .filter_map(|node| {
                let href = doc.element(node).href()?;
                let route = RoutePath::from_href(Some(href), &RoutePath::new(href));
                Some((node, route))
            })
            .collect()
    }

    fn target_for(&self, doc: &Document, link: NodeId) -> Target {
        let href = doc.element(link).href();
        let is_card = doc
            .parent(link)
            .and_then(|p| doc.element(p).id())
            .is_some_and(|id| Some(id) == href);
        if is_card {
            if let Some(card) = doc.ancestor(link, CARD_DEPTH).filter(|n| *n != doc.body()) {
                return Target::Hide(card);
            }
        }

        match doc.closest(link, is_nav_item) {
            Some(item) => Target::Hide(item),
            None => Target::Detach(link),
        }
    }

    /// Hide groups that held restricted references and now show no links.
    fn collapse_groups(&self, doc: &mut Document, report: &mut ReconcileReport) {
        let groups = doc.query_all(is_group);
        let mut empty = Vec::new();
        for group in groups {
            if !doc.is_visible(group) {
                continue;
            }
            let subtree = doc.subtree(group);
            let had_restricted = subtree.iter().any(|n| {
                doc.element(*n)
                    .href()
                    .is_some_and(|h| self.policy.is_restricted_reference(h))
            });
            let visible_links = subtree
                .iter()
                .filter(|n| is_link(doc.element(**n)) && doc.is_visible(**n))
                .count();
            if had_restricted && visible_links == 0 {
                empty.push(group);
            }
        }

        for group in empty {
            if doc.set_hidden(group, true) {
                report.collapsed.push(group);
            }
        }
    }
}
