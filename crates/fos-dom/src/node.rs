//! DOM Node
//!
//! Nodes hold a non-owning parent back-reference and an ordered child list.
//! The arena in [`crate::DomTree`] owns every node.

use crate::attributes::NamedNodeMap;
use crate::document::{Presentation, StyleHandle};
use crate::NodeId;

/// DOM node type, numbered as `Node.nodeType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
}

impl NodeType {
    /// Numeric `nodeType` value
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A node in the arena
#[derive(Debug)]
pub struct Node {
    /// Parent node (never owning)
    pub(crate) parent: Option<NodeId>,
    /// Ordered children
    pub(crate) children: Vec<NodeId>,
    /// Node-specific data
    pub(crate) data: NodeData,
}

/// Node payload
#[derive(Debug)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::Document => NodeType::Document,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
        }
    }

    /// `nodeName`: lower-case tag for elements, `#text`/`#comment`/`#document` otherwise
    pub fn node_name(&self) -> &str {
        match &self.data {
            NodeData::Document => "#document",
            NodeData::Element(elem) => &elem.local_name,
            NodeData::Text(_) => "#text",
            NodeData::Comment(_) => "#comment",
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(elem) => Some(elem),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(elem) => Some(elem),
            _ => None,
        }
    }

    /// Character data of text and comment nodes
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text),
            _ => None,
        }
    }

    /// Whether this node may hold children
    pub(crate) fn accepts_children(&self) -> bool {
        matches!(self.data, NodeData::Document | NodeData::Element(_))
    }
}

/// Element payload
pub struct ElementData {
    /// Upper-case tag name (`tagName`)
    pub(crate) tag_name: String,
    /// Lower-case local name (`nodeName`)
    pub(crate) local_name: String,
    pub(crate) attributes: NamedNodeMap,
    pub(crate) style: Option<StyleHandle>,
    pub(crate) presentation: Option<Presentation>,
}

impl ElementData {
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            tag_name: tag.to_ascii_uppercase(),
            local_name: tag.to_ascii_lowercase(),
            attributes: NamedNodeMap::new(),
            style: None,
            presentation: None,
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn attributes(&self) -> &NamedNodeMap {
        &self.attributes
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get_attribute("id")
    }

    pub fn class_name(&self) -> &str {
        self.attributes.get_attribute("class").unwrap_or("")
    }

    /// Presentation state attached by the document's element factory
    pub fn presentation<T: 'static>(&self) -> Option<&T> {
        self.presentation.as_ref()?.downcast_ref::<T>()
    }

    pub fn style(&self) -> Option<&StyleHandle> {
        self.style.as_ref()
    }
}

impl std::fmt::Debug for ElementData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementData")
            .field("tag_name", &self.tag_name)
            .field("attributes", &self.attributes)
            .field("has_style", &self.style.is_some())
            .field("has_presentation", &self.presentation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_names() {
        let node = Node::new(NodeData::Element(ElementData::new("Canvas")));
        assert_eq!(node.node_type(), NodeType::Element);
        assert_eq!(node.node_name(), "canvas");
        assert_eq!(node.as_element().unwrap().tag_name(), "CANVAS");
    }

    #[test]
    fn test_character_nodes() {
        let text = Node::new(NodeData::Text("hi".into()));
        assert_eq!(text.node_name(), "#text");
        assert_eq!(text.as_text(), Some("hi"));
        assert!(!text.accepts_children());
        assert_eq!(NodeType::Comment.code(), 8);
    }
}
