//! DOM Node Operations
//!
//! Core node manipulation: appendChild, removeChild, insertBefore, cloneNode.
//! Misuse is reported synchronously and never corrected.

use crate::node::NodeData;
use crate::{Document, NodeId, StyleHandle};

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors. Every variant is an `InvalidState` condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("invalid state: unknown node {0}")]
    UnknownNode(NodeId),

    #[error("invalid state: node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("invalid state: reference node {reference} is not a child of {parent}")]
    UnknownReference { parent: NodeId, reference: NodeId },

    #[error("hierarchy request: cannot insert {child} into {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("invalid state: node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("invalid state: the document node cannot be cloned")]
    CloneDocument,
}

impl Document {
    /// Append `child` to `parent`, detaching it from any prior parent first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.check_insertion(parent, child)?;
        self.tree.detach(child);
        self.link(parent, child, None);
        Ok(child)
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        if self.tree.parent(child) != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.tree.detach(child);
        Ok(child)
    }

    /// Insert `new_child` before `reference`; `None` appends
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<NodeId> {
        let Some(reference) = reference else {
            return self.append_child(parent, new_child);
        };
        self.check_insertion(parent, new_child)?;
        if self.tree.parent(reference) != Some(parent) {
            return Err(DomError::UnknownReference { parent, reference });
        }
        if reference == new_child {
            return Ok(new_child);
        }
        self.tree.detach(new_child);
        self.link(parent, new_child, Some(reference));
        Ok(new_child)
    }

    /// Copy `node` (and its subtree when `deep`) into a new detached node.
    /// Element copies go through the factory and re-register their id.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        let source = self.tree.get(node).ok_or(DomError::UnknownNode(node))?;
        let template = match &source.data {
            NodeData::Document => return Err(DomError::CloneDocument),
            NodeData::Text(text) => Template::Text(text.clone()),
            NodeData::Comment(text) => Template::Comment(text.clone()),
            NodeData::Element(elem) => Template::Element {
                tag: elem.local_name.clone(),
                attributes: elem
                    .attributes
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect(),
                style: elem.style.clone(),
            },
        };

        let copy = match template {
            Template::Text(text) => self.create_text_node(&text),
            Template::Comment(text) => self.create_comment(&text),
            Template::Element { tag, attributes, style } => {
                let copy = self.create_element(&tag);
                for (name, value) in attributes {
                    self.set_attribute(copy, &name, &value)?;
                }
                self.element_mut(copy)?.style = style;
                copy
            }
        };

        if deep {
            for child in self.tree.children(node) {
                let child_copy = self.clone_node(child, true)?;
                self.link(copy, child_copy, None);
            }
        }
        Ok(copy)
    }

    fn ensure_exists(&self, id: NodeId) -> DomResult<()> {
        if self.tree.contains_id(id) {
            Ok(())
        } else {
            Err(DomError::UnknownNode(id))
        }
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let parent_node = self.tree.get(parent).ok_or(DomError::UnknownNode(parent))?;
        self.ensure_exists(child)?;
        if !parent_node.accepts_children()
            || child == NodeId::ROOT
            || self.tree.is_inclusive_ancestor(child, parent)
        {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Link a detached child under `parent`, before `reference` if given
    fn link(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if let Some(parent_node) = self.tree.get_mut(parent) {
            let index = reference
                .and_then(|r| parent_node.children.iter().position(|&c| c == r))
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(index, child);
        }
        if let Some(child_node) = self.tree.get_mut(child) {
            child_node.parent = Some(parent);
        }
    }
}

/// Owned snapshot of a node being cloned
enum Template {
    Text(String),
    Comment(String),
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        style: Option<StyleHandle>,
    },
}
