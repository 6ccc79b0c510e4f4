//! Arena-backed document tree.
//!
//! The host page (and each of its frames) is observed through a [`Document`]:
//! an arena of nodes addressed by [`NodeId`]. Ids are never reused, so a node
//! that is removed and replaced by the portal comes back under a fresh id.
//! That property carries the per-entry processed markers used by the listing
//! scanner: removal clears a marker, and nothing else does.

mod parse;
mod selector;

use std::collections::HashSet;

pub use selector::{Selector, SelectorError};

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element name and attributes, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Loading progress of a document, mirroring `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    #[default]
    Loading,
    Interactive,
    Complete,
}

/// Structural changes accumulated since the last [`Document::take_mutations`].
///
/// Only child-list changes on connected nodes are counted; attribute and
/// style writes are not structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationBatch {
    pub added: usize,
    pub removed: usize,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// A document tree with a processed-marker set and a mutation journal.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    ready_state: ReadyState,
    processed: HashSet<NodeId>,
    journal: MutationBatch,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document, still loading.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            ready_state: ReadyState::Loading,
            processed: HashSet::new(),
            journal: MutationBatch::default(),
        }
    }

    /// Parse a complete page. Never fails; malformed markup is recovered.
    ///
    /// The result is `Complete` with an empty mutation journal.
    pub fn parse_html(html: &str) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        parse::parse_into(&mut doc, root, html);
        doc.ready_state = ReadyState::Complete;
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
    }

    /// Whether the document can be scanned: fully loaded and has a `<body>`.
    pub fn is_ready(&self) -> bool {
        self.ready_state == ReadyState::Complete && self.body().is_some()
    }

    // ── Reading ──

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Element children of `id`, in order.
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.element(*c).is_some())
    }

    /// All descendants of `id` in document (pre-)order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Whether `id` is still attached to this document's root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == self.root() {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(value))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.tag_name(*n) == Some("body"))
    }

    /// Concatenated text of `id` and its descendants, untrimmed.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(t)) = self.node(id).map(|n| &n.data) {
            out.push_str(t);
        }
        for d in self.descendants(id) {
            if let Some(NodeData::Text(t)) = self.node(d).map(|n| &n.data) {
                out.push_str(t);
            }
        }
        out
    }

    /// First descendant of `scope` matching `selector`.
    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|n| selector.matches(self, *n))
    }

    /// All descendants of `scope` matching `selector`, in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }

    /// Position of `id` among its parent's element children, starting at 1.
    pub(crate) fn element_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.element_children(parent)
            .position(|c| c == id)
            .map(|i| i + 1)
    }

    // ── Building and mutating ──

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeData::Element(ElementData {
            name: name.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub(crate) fn create_comment(&mut self) -> NodeId {
        self.push(NodeData::Comment)
    }

    /// Link without journalling; used while building trees nobody observes yet.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Append `child` (moving it if already attached) as the last child of `parent`.
    ///
    /// Appending a node under itself or one of its descendants is a no-op.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return;
        }
        if self.is_inclusive_ancestor(child, parent) {
            return;
        }
        if self.nodes[child.0].parent.is_some() {
            self.remove(child);
        }
        self.link(parent, child);
        if self.is_connected(parent) {
            self.journal.added += 1;
        }
    }

    /// Remove `id` from its parent. Processed markers of the whole subtree are dropped.
    pub fn remove(&mut self, id: NodeId) {
        if self.node(id).is_none() || id == self.root() {
            return;
        }
        let was_connected = self.is_connected(id);
        self.detach(id);
        if was_connected {
            self.journal.removed += 1;
        }
        self.processed.remove(&id);
        for d in self.descendants(id) {
            self.processed.remove(&d);
        }
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        let node = self.create_text(text);
        self.append_child(id, node);
    }

    /// Parse `html` as a fragment and append its top-level nodes to `parent`.
    ///
    /// Returns the appended top-level nodes.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let holder = self.create_element("template", &[]);
        parse::parse_into(self, holder, html);
        let top = self.children(holder).to_vec();
        for node in &top {
            self.append_child(parent, *node);
        }
        top
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(Node {
            data: NodeData::Element(el),
            ..
        }) = self.nodes.get_mut(id.0)
        else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match el.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => el.attrs.push((name, value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(Node {
            data: NodeData::Element(el),
            ..
        }) = self.nodes.get_mut(id.0)
        {
            el.attrs.retain(|(k, _)| k != name);
        }
    }

    /// Value of one inline style declaration.
    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        parse_style(self.attr(id, "style")?)
            .into_iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v)
    }

    /// Set one inline style declaration, keeping the others.
    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) {
        let mut decls = self.attr(id, "style").map(parse_style).unwrap_or_default();
        match decls.iter_mut().find(|(k, _)| k == property) {
            Some((_, v)) => *v = value.to_string(),
            None => decls.push((property.to_string(), value.to_string())),
        }
        let style: String = decls.iter().map(|(k, v)| format!("{k}: {v}; ")).collect();
        self.set_attr(id, "style", style.trim_end());
    }

    // ── Markers and journal ──

    /// Mark `id` as processed. Returns `false` if it already was.
    pub fn mark_processed(&mut self, id: NodeId) -> bool {
        self.processed.insert(id)
    }

    pub fn is_processed(&self, id: NodeId) -> bool {
        self.processed.contains(&id)
    }

    /// Drain the structural changes recorded since the last call.
    pub fn take_mutations(&mut self) -> Option<MutationBatch> {
        let batch = std::mem::take(&mut self.journal);
        (!batch.is_empty()).then_some(batch)
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let k = k.trim().to_ascii_lowercase();
            (!k.is_empty()).then(|| (k, v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse_html(
            r#"<html><body><div id="list"><a id="a1"><span class="t">1 | x</span></a></div></body></html>"#,
        )
    }

    #[test]
    fn parsed_document_is_ready_and_quiet() {
        let mut doc = sample();
        assert!(doc.is_ready());
        assert_eq!(doc.take_mutations(), None);
    }

    #[test]
    fn empty_document_is_not_ready() {
        let mut doc = Document::new();
        assert!(!doc.is_ready());
        doc.set_ready_state(ReadyState::Complete);
        assert!(!doc.is_ready(), "no body yet");
    }

    #[test]
    fn append_to_connected_parent_is_journalled() {
        let mut doc = sample();
        let list = doc.get_element_by_id("list").unwrap();
        let a = doc.create_element("a", &[("id", "a2")]);
        doc.append_child(list, a);
        assert_eq!(
            doc.take_mutations(),
            Some(MutationBatch {
                added: 1,
                removed: 0
            })
        );
        assert_eq!(doc.take_mutations(), None);
    }

    #[test]
    fn building_detached_subtrees_is_not_journalled() {
        let mut doc = sample();
        let div = doc.create_element("div", &[]);
        let span = doc.create_element("span", &[]);
        doc.append_child(div, span);
        assert_eq!(doc.take_mutations(), None);
    }

    #[test]
    fn attribute_writes_are_not_structural() {
        let mut doc = sample();
        let a = doc.get_element_by_id("a1").unwrap();
        doc.set_attr(a, "title", "hello");
        doc.set_style_property(a, "color", "red");
        assert_eq!(doc.take_mutations(), None);
    }

    #[test]
    fn removal_clears_markers_of_subtree() {
        let mut doc = sample();
        let list = doc.get_element_by_id("list").unwrap();
        let a = doc.get_element_by_id("a1").unwrap();
        assert!(doc.mark_processed(a));
        assert!(!doc.mark_processed(a));
        doc.remove(list);
        assert!(!doc.is_processed(a));
        assert!(!doc.is_connected(a));
        assert_eq!(doc.get_element_by_id("a1"), None);
    }

    #[test]
    fn replacement_gets_a_fresh_id() {
        let mut doc = sample();
        let list = doc.get_element_by_id("list").unwrap();
        let old = doc.get_element_by_id("a1").unwrap();
        doc.mark_processed(old);
        doc.clear_children(list);
        doc.append_html(list, r#"<a id="a1"><span class="t">1 | x</span></a>"#);
        let new = doc.get_element_by_id("a1").unwrap();
        assert_ne!(old, new);
        assert!(!doc.is_processed(new));
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = Document::parse_html("<p>Bloco <b>A</b> - 101</p>");
        let p = doc.descendants(doc.root())[0];
        assert_eq!(doc.text_content(p), "Bloco A - 101");
    }

    #[test]
    fn style_properties_round_trip() {
        let mut doc = Document::parse_html(r#"<div id="d" style="color: red; padding: 0"></div>"#);
        let d = doc.get_element_by_id("d").unwrap();
        doc.set_style_property(d, "color", "blue");
        doc.set_style_property(d, "border-left", "5px solid #059669");
        assert_eq!(doc.style_property(d, "color").as_deref(), Some("blue"));
        assert_eq!(doc.style_property(d, "padding").as_deref(), Some("0"));
        assert_eq!(
            doc.style_property(d, "border-left").as_deref(),
            Some("5px solid #059669")
        );
    }

    #[test]
    fn appending_under_a_descendant_is_refused() {
        let mut doc = Document::parse_html(r#"<div id="outer"><div id="inner"></div></div>"#);
        let outer = doc.get_element_by_id("outer").unwrap();
        let inner = doc.get_element_by_id("inner").unwrap();
        doc.take_mutations();

        doc.append_child(inner, outer);
        doc.append_child(outer, outer);
        assert_eq!(doc.parent(inner), Some(outer));
        assert!(doc.children(inner).is_empty());
        assert!(doc.is_connected(outer));
        assert!(doc.is_connected(inner));
        assert_eq!(doc.take_mutations(), None);
    }

    #[test]
    fn element_index_counts_elements_only() {
        let doc = Document::parse_html("<div> text <i>1</i> more <i id=\"x\">2</i></div>");
        let x = doc.get_element_by_id("x").unwrap();
        assert_eq!(doc.element_index(x), Some(2));
    }
}
