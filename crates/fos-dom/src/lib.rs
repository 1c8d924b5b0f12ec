//! fOS DOM - Document Object Model
//!
//! Engine-agnostic Document/Element/Text tree shared by every execution
//! context. Nodes live in an arena owned by their [`Document`] and are
//! addressed by [`NodeId`].

mod attributes;
mod document;
mod element;
mod node;
mod operations;
mod tree;

pub use attributes::{Attr, NamedNodeMap};
pub use document::{Document, ElementFactory, Presentation, SharedDocument, StyleHandle};
pub use element::class_tokens;
pub use node::{ElementData, Node, NodeData, NodeType};
pub use operations::{DomError, DomResult};
pub use tree::DomTree;

/// Node identifier (index into the document arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The document node of every tree
    pub const ROOT: NodeId = NodeId(0);

    /// Raw arena index, used when handing node references to scripts
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Rebuild an id from [`NodeId::as_u32`]. Unknown ids are rejected by
    /// every document operation.
    #[inline]
    pub fn from_u32(raw: u32) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
