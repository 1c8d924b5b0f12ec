//! Element Queries
//!
//! getElementsByTagName / getElementsByClassName over a subtree, in tree order.

use crate::{Document, NodeId};

/// Split a class attribute (or query) into whitespace-separated tokens
pub fn class_tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split_ascii_whitespace()
}

impl Document {
    /// Elements in the whole document matching `tag` (`"*"` matches all)
    pub fn get_elements_by_tag_name(&self, tag: &str) -> Vec<NodeId> {
        self.elements_by_tag_name_in(NodeId::ROOT, tag)
    }

    /// Elements in the whole document carrying every class token of `classes`
    pub fn get_elements_by_class_name(&self, classes: &str) -> Vec<NodeId> {
        self.elements_by_class_name_in(NodeId::ROOT, classes)
    }

    /// Descendants of `root` matching `tag`, case-insensitively
    pub fn elements_by_tag_name_in(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let any = tag == "*";
        self.tree
            .descendants(root)
            .into_iter()
            .filter(|&id| {
                self.element(id)
                    .is_some_and(|e| any || e.tag_name().eq_ignore_ascii_case(tag))
            })
            .collect()
    }

    /// Descendants of `root` whose class list contains every token of `classes`
    pub fn elements_by_class_name_in(&self, root: NodeId, classes: &str) -> Vec<NodeId> {
        let wanted: Vec<&str> = class_tokens(classes).collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.tree
            .descendants(root)
            .into_iter()
            .filter(|&id| {
                self.element(id).is_some_and(|e| {
                    let own: Vec<&str> = class_tokens(e.class_name()).collect();
                    wanted.iter().all(|w| own.contains(w))
                })
            })
            .collect()
    }
}
