//! Turns document insertions into page events.

use std::sync::Arc;

use docgate_events::{EventBus, PageEvent, PagePublisher};

use crate::affordance::is_more_actions;
use crate::dom::{Document, NodeId, SubtreeObserver};

pub const PORTAL_ROOT_ID: &str = "headlessui-portal-root";
pub const DIALOG_ID_PREFIX: &str = "headlessui-dialog-";

/// Publishes `DialogOpened` for portal dialogs and `SubtreeGrew` for
/// insertions carrying restricted references or menu buttons to replace.
pub struct PageObserver<B> {
    publisher: Arc<PagePublisher<B>>,
    restricted_prefixes: Vec<String>,
}

impl<B> PageObserver<B>
where
    B: EventBus<PageEvent>,
{
    pub fn new(publisher: Arc<PagePublisher<B>>, restricted_prefixes: Vec<String>) -> Self {
        Self {
            publisher,
            restricted_prefixes,
        }
    }

    fn is_portal_dialog(doc: &Document, node: NodeId) -> bool {
        let el = doc.element(node);
        el.role() == Some("dialog")
            && el.id().is_some_and(|id| id.starts_with(DIALOG_ID_PREFIX))
            && doc.closest(node, |e| e.id() == Some(PORTAL_ROOT_ID)).is_some()
    }

    fn is_qualifying(&self, doc: &Document, node: NodeId) -> bool {
        let el = doc.element(node);
        is_more_actions(el)
            || el
                .href()
                .is_some_and(|h| self.restricted_prefixes.iter().any(|p| h.contains(p.as_str())))
    }
}

impl<B> SubtreeObserver for PageObserver<B>
where
    B: EventBus<PageEvent>,
{
    fn inserted(&self, document: &Document, node: NodeId) {
        let subtree = document.subtree(node);
        if subtree.iter().any(|n| Self::is_portal_dialog(document, *n)) {
            tracing::trace!("portal dialog inserted");
            self.publisher.dialog_opened();
            return;
        }

        let added = subtree
            .iter()
            .filter(|n| self.is_qualifying(document, **n))
            .count();
        if added > 0 {
            self.publisher.emit(PageEvent::SubtreeGrew { added });
        }
    }
}
