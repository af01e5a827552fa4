//! Minimal document model the gate reconciles against.
//!
//! Hosts mirror the rendered page into a [`Document`] (or implement their
//! own bridge on top of it). Nodes live in an arena and are never freed;
//! detaching a node only unlinks it from its parent, so stale [`NodeId`]s
//! stay valid and simply stop being reachable from the body.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: Option<String>,
    hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: None,
            hidden: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attr("id", id)
    }

    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with_attr("class", class)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href")
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// Full-page surfaces that replace the application content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The host application's own content.
    App,
    Login,
    AccessDenied,
}

impl Surface {
    fn marker_id(self) -> &'static str {
        match self {
            Surface::App => "app",
            Surface::Login => "login-view",
            Surface::AccessDenied => "access-denied",
        }
    }
}

/// Notified after each insertion into the attached tree.
///
/// Observers get read-only access; they report (e.g. by publishing a
/// page event) rather than mutate.
pub trait SubtreeObserver: Send + Sync {
    fn inserted(&self, document: &Document, node: NodeId);
}

pub struct Document {
    nodes: Vec<Element>,
    body: NodeId,
    surface: Surface,
    authenticated: bool,
    observers: Vec<Arc<dyn SubtreeObserver>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Document {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("surface", &self.surface)
            .field("authenticated", &self.authenticated)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element::new("body")],
            body: NodeId(0),
            surface: Surface::App,
            authenticated: false,
            observers: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn observe(&mut self, observer: Arc<dyn SubtreeObserver>) {
        self.observers.push(observer);
    }

    /// The element behind `node`.
    ///
    /// # Panics
    ///
    /// If `node` was not allocated by this document; use [`Document::get`]
    /// for ids of unknown origin.
    pub fn element(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    pub fn get(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    /// Insert `element` as the last child of `parent` and notify observers.
    ///
    /// # Panics
    ///
    /// If `parent` was not allocated by this document.
    pub fn append(&mut self, parent: NodeId, element: Element) -> NodeId {
        let node = self.alloc(element);
        self.link(parent, node, None);
        self.notify(node);
        node
    }

    /// Replace `old` in its parent with `element`. A detached `old` is left alone.
    pub fn replace(&mut self, old: NodeId, element: Element) -> Option<NodeId> {
        let parent = self.get(old)?.parent?;
        let index = self.nodes[parent.0].children.iter().position(|c| *c == old)?;
        self.unlink(old);
        let node = self.alloc(element);
        self.link(parent, node, Some(index));
        self.notify(node);
        Some(node)
    }

    /// Unlink `node` (and its subtree) from the tree. Idempotent.
    pub fn detach(&mut self, node: NodeId) -> bool {
        if node == self.body || self.parent(node).is_none() {
            return false;
        }
        self.unlink(node);
        true
    }

    /// Set the display-none flag. Returns whether anything changed; unknown
    /// ids change nothing.
    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) -> bool {
        let Some(el) = self.nodes.get_mut(node.0) else {
            return false;
        };
        let changed = el.hidden != hidden;
        el.hidden = hidden;
        changed
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.nodes.get_mut(node.0) {
            el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?.parent
    }

    /// Children in document order; empty for unknown ids.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node).map(|el| el.children.as_slice()).unwrap_or(&[])
    }

    /// `node`'s ancestor `levels` steps up (`0` is the node itself).
    pub fn ancestor(&self, node: NodeId, levels: usize) -> Option<NodeId> {
        let mut current = node;
        for _ in 0..levels {
            current = self.parent(current)?;
        }
        Some(current)
    }

    /// Whether `node` is reachable from the body.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.body {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Attached, and neither the node nor any ancestor is hidden.
    pub fn is_visible(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if self.get(current).is_none_or(|el| el.hidden) {
                return false;
            }
            if current == self.body {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Nearest node (starting with `node` itself, stopping below the body)
    /// that satisfies `pred`.
    pub fn closest(&self, node: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.body {
                return None;
            }
            if self.get(n).is_some_and(&pred) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// `root` and its descendants in document order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Attached nodes matching `pred`, in document order.
    pub fn query_all(&self, pred: impl Fn(&Element) -> bool) -> Vec<NodeId> {
        self.subtree(self.body)
            .into_iter()
            .filter(|n| *n != self.body && pred(&self.nodes[n.0]))
            .collect()
    }

    pub fn query(&self, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.query_all(pred).into_iter().next()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.query(|el| el.id() == Some(id))
    }

    /// Every visible node, in document order.
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        self.subtree(self.body)
            .into_iter()
            .filter(|n| self.is_visible(*n))
            .collect()
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Replace the body content with a full-page surface.
    pub fn render_surface(&mut self, surface: Surface, element: Element) -> NodeId {
        let children = self.nodes[self.body.0].children.clone();
        for child in children {
            self.unlink(child);
        }
        self.surface = surface;
        let element = if element.id().is_none() {
            element.with_id(surface.marker_id())
        } else {
            element
        };
        self.append(self.body, element)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Body-level "authenticated" marker used by host styling.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    fn alloc(&mut self, element: Element) -> NodeId {
        let mut element = element;
        element.parent = None;
        element.children.clear();
        self.nodes.push(element);
        NodeId(self.nodes.len() - 1)
    }

    fn link(&mut self, parent: NodeId, node: NodeId, index: Option<usize>) {
        self.nodes[node.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(i) if i <= children.len() => children.insert(i, node),
            _ => children.push(node),
        }
    }

    fn unlink(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    fn notify(&self, node: NodeId) {
        if self.observers.is_empty() || !self.is_attached(node) {
            return;
        }
        for observer in &self.observers {
            observer.inserted(self, node);
        }
    }
}
