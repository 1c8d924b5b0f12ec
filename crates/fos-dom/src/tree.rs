//! DOM Tree - Arena-based tree storage
//!
//! All nodes live in one `Vec`; `NodeId` is the index. Nodes are never
//! freed while the tree lives, removal only detaches them.

use crate::node::{Node, NodeData};
use crate::NodeId;

/// Arena of nodes with structural helpers
#[derive(Debug)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Children snapshot, isolated from later mutation
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.children.last().copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = &self.get(self.parent(id)?)?.children;
        let index = self.position_in(siblings, id)?;
        siblings.get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = &self.get(self.parent(id)?)?.children;
        let index = self.position_in(siblings, id)?;
        index.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }

    /// True if `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Descendants of `root` in tree order, `root` excluded
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.get(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Unlink `child` from its current parent, if any
    pub(crate) fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.retain(|&c| c != child);
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = None;
        }
    }

    fn position_in(&self, siblings: &[NodeId], id: NodeId) -> Option<usize> {
        siblings.iter().position(|&c| c == id)
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ElementData;

    fn element(tree: &mut DomTree, tag: &str) -> NodeId {
        tree.push(Node::new(NodeData::Element(ElementData::new(tag))))
    }

    fn link(tree: &mut DomTree, parent: NodeId, child: NodeId) {
        tree.get_mut(parent).unwrap().children.push(child);
        tree.get_mut(child).unwrap().parent = Some(parent);
    }

    #[test]
    fn test_siblings_and_descendants() {
        let mut tree = DomTree::new();
        let a = element(&mut tree, "a");
        let b = element(&mut tree, "b");
        let c = element(&mut tree, "c");
        link(&mut tree, NodeId::ROOT, a);
        link(&mut tree, a, b);
        link(&mut tree, NodeId::ROOT, c);

        assert_eq!(tree.next_sibling(a), Some(c));
        assert_eq!(tree.previous_sibling(c), Some(a));
        assert_eq!(tree.previous_sibling(a), None);
        assert_eq!(tree.descendants(NodeId::ROOT), vec![a, b, c]);
        assert!(tree.is_inclusive_ancestor(a, b));
        assert!(!tree.is_inclusive_ancestor(b, a));
    }

    #[test]
    fn test_detach() {
        let mut tree = DomTree::new();
        let a = element(&mut tree, "a");
        link(&mut tree, NodeId::ROOT, a);
        tree.detach(a);
        assert!(tree.children(NodeId::ROOT).is_empty());
        assert_eq!(tree.parent(a), None);
    }
}
