//! Logout controls injected into the host page.

use crate::dom::{Document, Element, NodeId};

pub const LOGOUT_BUTTON_ID: &str = "logout-btn";
pub const INLINE_LOGOUT_ID: &str = "logout-btn-inline";
pub const MORE_ACTIONS_LABEL: &str = "More actions";
/// Hosts route clicks on elements carrying this action to `AuthGate::logout`.
pub const LOGOUT_ACTION: &str = "logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    Inserted(NodeId),
    AlreadyPresent(NodeId),
    /// No navigation region rendered yet; the next cycle retries.
    NoNavigation,
}

/// Candidate navigation regions, most specific first.
fn region_matchers() -> [fn(&Element) -> bool; 5] {
    [
        |el: &Element| el.is("nav"),
        |el: &Element| el.is("header"),
        |el: &Element| el.role() == Some("navigation"),
        |el: &Element| el.has_class("navbar"),
        |el: &Element| el.has_class("nav"),
    ]
}

pub fn navigation_region(doc: &Document) -> Option<NodeId> {
    region_matchers()
        .into_iter()
        .find_map(|matches| doc.query(matches))
}

pub fn is_more_actions(el: &Element) -> bool {
    el.is("button") && el.attr("aria-label") == Some(MORE_ACTIONS_LABEL)
}

fn logout_button(id: &str) -> Element {
    Element::new("button")
        .with_id(id)
        .with_attr("type", "button")
        .with_attr("data-action", LOGOUT_ACTION)
        .with_text("Logout")
}

/// Append the logout button to the primary navigation region, once.
pub fn inject_logout_button(doc: &mut Document) -> Injection {
    if let Some(existing) = doc.find_by_id(LOGOUT_BUTTON_ID) {
        return Injection::AlreadyPresent(existing);
    }
    let Some(region) = navigation_region(doc) else {
        tracing::debug!("no navigation region yet; logout button deferred");
        return Injection::NoNavigation;
    };
    let node = doc.append(region, logout_button(LOGOUT_BUTTON_ID));
    tracing::debug!("logout button injected");
    Injection::Inserted(node)
}

/// Swap every "More actions" menu button for an inline logout button.
pub fn replace_more_actions(doc: &mut Document) -> Vec<NodeId> {
    let targets = doc.query_all(is_more_actions);
    targets
        .into_iter()
        .filter_map(|node| doc.replace(node, logout_button(INLINE_LOGOUT_ID)))
        .collect()
}

/// Remove every logout control (after logout or revocation).
pub fn remove_logout_controls(doc: &mut Document) -> usize {
    let targets = doc.query_all(|el| el.attr("data-action") == Some(LOGOUT_ACTION));
    targets.into_iter().filter(|n| doc.detach(*n)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_button_goes_into_first_region_once() {
        let mut doc = Document::new();
        assert_eq!(inject_logout_button(&mut doc), Injection::NoNavigation);

        let header = doc.append(doc.body(), Element::new("div").with_class("navbar"));
        let nav = doc.append(doc.body(), Element::new("nav"));

        let Injection::Inserted(button) = inject_logout_button(&mut doc) else {
            panic!("expected insertion");
        };
        assert_eq!(doc.parent(button), Some(nav));
        assert_ne!(doc.parent(button), Some(header));
        assert_eq!(inject_logout_button(&mut doc), Injection::AlreadyPresent(button));
    }

    #[test]
    fn more_actions_buttons_are_replaced_in_place() {
        let mut doc = Document::new();
        let bar = doc.append(doc.body(), Element::new("div"));
        doc.append(bar, Element::new("span"));
        doc.append(bar, Element::new("button").with_attr("aria-label", MORE_ACTIONS_LABEL));

        let replaced = replace_more_actions(&mut doc);
        assert_eq!(replaced.len(), 1);
        assert_eq!(doc.children(bar)[1], replaced[0]);
        assert_eq!(doc.element(replaced[0]).id(), Some(INLINE_LOGOUT_ID));
        assert!(replace_more_actions(&mut doc).is_empty());

        assert_eq!(remove_logout_controls(&mut doc), 1);
        assert_eq!(doc.children(bar).len(), 1);
    }
}
