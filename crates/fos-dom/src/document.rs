//! Document - High-level document API
//!
//! Owns the node arena, the id index and the element factory hook.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{ElementData, Node, NodeData, NodeType};
use crate::operations::{DomError, DomResult};
use crate::{DomTree, NodeId};

/// Presentation state attached to an element at creation time
pub type Presentation = Box<dyn Any + Send + Sync>;

/// Opaque style handle carried by every element
pub type StyleHandle = Arc<dyn Any + Send + Sync>;

/// Document shared between an execution context and host readers
pub type SharedDocument = Arc<Mutex<Document>>;

/// Hook run for every created element
pub trait ElementFactory: Send + Sync {
    /// Presentation state for a new element with this (lower-case) tag
    fn presentation_for(&self, tag: &str) -> Option<Presentation>;
}

/// HTML Document
pub struct Document {
    pub(crate) tree: DomTree,
    url: String,
    html_element: Option<NodeId>,
    head_element: Option<NodeId>,
    body_element: Option<NodeId>,
    /// id attribute value -> element, last write wins
    ids: HashMap<String, NodeId>,
    factory: Option<Arc<dyn ElementFactory>>,
}

impl Document {
    /// Create a document with `html`, `head` and `body`
    pub fn new(url: &str) -> Self {
        Self::with_factory(url, None)
    }

    /// Create a document with `html`, `head` and `body`, running `factory`
    /// for every element including the skeleton
    pub fn with_factory(url: &str, factory: Option<Arc<dyn ElementFactory>>) -> Self {
        let mut doc = Self::empty(url);
        doc.factory = factory;

        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.attach(NodeId::ROOT, html);
        doc.attach(html, head);
        doc.attach(html, body);

        doc.html_element = Some(html);
        doc.head_element = Some(head);
        doc.body_element = Some(body);
        doc
    }

    /// Create an empty document (document node only)
    pub fn empty(url: &str) -> Self {
        Self {
            tree: DomTree::new(),
            url: url.to_string(),
            html_element: None,
            head_element: None,
            body_element: None,
            ids: HashMap::new(),
            factory: None,
        }
    }

    /// Wrap the document for sharing across threads
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_element_factory(&mut self, factory: Arc<dyn ElementFactory>) {
        self.factory = Some(factory);
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.html_element
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head_element
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body_element
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.tree.get(id)?.as_element()
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    /// Create a detached element, attaching factory presentation state
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let mut data = ElementData::new(tag);
        if let Some(factory) = &self.factory {
            data.presentation = factory.presentation_for(&data.local_name);
        }
        let id = self.tree.push(Node::new(NodeData::Element(data)));
        tracing::trace!(node = %id, tag, "created element");
        id
    }

    pub fn create_text_node(&mut self, text: &str) -> NodeId {
        self.tree.push(Node::new(NodeData::Text(text.to_string())))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.tree.push(Node::new(NodeData::Comment(text.to_string())))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.tree.get(id).map(Node::node_type)
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.tree.get(id).map(Node::node_name)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag_name)
    }

    pub fn parent_node(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id)
    }

    /// Children snapshot
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.first_child(id)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.last_child(id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.next_sibling(id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.previous_sibling(id)
    }

    /// True if `node` is `ancestor` or one of its descendants
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.is_inclusive_ancestor(ancestor, node)
    }

    // ------------------------------------------------------------------
    // Attributes and the id index
    // ------------------------------------------------------------------

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attributes.get_attribute(name)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.attributes.has_attribute(name))
    }

    pub fn attribute_names(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|e| e.attributes.names().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Set an attribute; `id` keeps the document index current
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        let element = self.element_mut(id)?;
        let old = element.attributes.set_attribute(name, value);
        if name.eq_ignore_ascii_case("id") {
            if let Some(old) = old {
                self.unregister_id(&old, id);
            }
            if !value.is_empty() {
                self.ids.insert(value.to_string(), id);
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> DomResult<()> {
        let element = self.element_mut(id)?;
        let old = element.attributes.remove_attribute(name);
        if name.eq_ignore_ascii_case("id") {
            if let Some(old) = old {
                self.unregister_id(&old, id);
            }
        }
        Ok(())
    }

    pub fn element_id(&self, id: NodeId) -> &str {
        self.get_attribute(id, "id").unwrap_or("")
    }

    pub fn set_element_id(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        self.set_attribute(id, "id", value)
    }

    pub fn class_name(&self, id: NodeId) -> &str {
        self.get_attribute(id, "class").unwrap_or("")
    }

    pub fn set_class_name(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        self.set_attribute(id, "class", value)
    }

    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.ids.get(value).copied()
    }

    fn unregister_id(&mut self, value: &str, owner: NodeId) {
        if self.ids.get(value) == Some(&owner) {
            self.ids.remove(value);
        }
    }

    // ------------------------------------------------------------------
    // Character data and element state
    // ------------------------------------------------------------------

    /// `textContent`: own data for character nodes, concatenated descendant
    /// text for elements, `None` for the document
    pub fn text_content(&self, id: NodeId) -> Option<String> {
        let node = self.tree.get(id)?;
        match &node.data {
            NodeData::Document => None,
            NodeData::Text(text) | NodeData::Comment(text) => Some(text.clone()),
            NodeData::Element(_) => Some(
                self.tree
                    .descendants(id)
                    .into_iter()
                    .filter_map(|d| match &self.tree.get(d)?.data {
                        NodeData::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }

    /// Replace character data, or replace an element's children with one text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> DomResult<()> {
        let node_type = self.node_type(id).ok_or(DomError::UnknownNode(id))?;
        match node_type {
            NodeType::Text | NodeType::Comment => {
                if let Some(node) = self.tree.get_mut(id) {
                    if let NodeData::Text(data) | NodeData::Comment(data) = &mut node.data {
                        *data = text.to_string();
                    }
                }
                Ok(())
            }
            NodeType::Element => {
                for child in self.tree.children(id) {
                    self.tree.detach(child);
                }
                if !text.is_empty() {
                    let text_node = self.create_text_node(text);
                    self.attach(id, text_node);
                }
                Ok(())
            }
            NodeType::Document => Err(DomError::HierarchyRequest {
                parent: id,
                child: id,
            }),
        }
    }

    pub fn set_style(&mut self, id: NodeId, style: StyleHandle) -> DomResult<()> {
        self.element_mut(id)?.style = Some(style);
        Ok(())
    }

    /// Presentation state of an element, downcast to `T`
    pub fn presentation<T: 'static>(&self, id: NodeId) -> Option<&T> {
        self.element(id)?.presentation::<T>()
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        let node = self.tree.get_mut(id).ok_or(DomError::UnknownNode(id))?;
        node.as_element_mut().ok_or(DomError::NotAnElement(id))
    }

    /// Link a freshly created node; both ids are known valid
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.tree.get_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.tree.get_mut(child) {
            node.parent = Some(parent);
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url)
            .field("nodes", &self.tree.len())
            .field("ids", &self.ids.len())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
