//! Tree invariant tests for fos-dom
//!
//! Exercises the public Document API the way script bindings drive it.

use fos_dom::*;

// ============================================================================
// PARENT / CHILD INVARIANTS
// ============================================================================

#[test]
fn test_append_child_single_parent() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let containers: Vec<NodeId> = (0..3).map(|_| doc.create_element("div")).collect();
    for &c in &containers {
        doc.append_child(body, c).unwrap();
    }
    let node = doc.create_element("p");

    for &c in &containers {
        doc.append_child(c, node).unwrap();
        assert_eq!(doc.parent_node(node), Some(c));
        let count = doc.child_nodes(c).iter().filter(|&&n| n == node).count();
        assert_eq!(count, 1);
        for &other in containers.iter().filter(|&&o| o != c) {
            assert!(!doc.child_nodes(other).contains(&node));
        }
    }
}

#[test]
fn test_children_snapshot_is_isolated() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let a = doc.create_element("a");
    doc.append_child(body, a).unwrap();

    let snapshot = doc.child_nodes(body);
    let b = doc.create_element("b");
    doc.append_child(body, b).unwrap();

    assert_eq!(snapshot, vec![a]);
    assert_eq!(doc.child_nodes(body), vec![a, b]);
}

#[test]
fn test_sibling_navigation() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let ids: Vec<NodeId> = ["a", "b", "c"].iter().map(|t| doc.create_element(t)).collect();
    for &id in &ids {
        doc.append_child(body, id).unwrap();
    }
    assert_eq!(doc.first_child(body), Some(ids[0]));
    assert_eq!(doc.last_child(body), Some(ids[2]));
    assert_eq!(doc.next_sibling(ids[0]), Some(ids[1]));
    assert_eq!(doc.previous_sibling(ids[2]), Some(ids[1]));
    assert_eq!(doc.next_sibling(ids[2]), None);

    doc.remove_child(body, ids[1]).unwrap();
    assert_eq!(doc.next_sibling(ids[0]), Some(ids[2]));
    assert_eq!(doc.next_sibling(ids[1]), None);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_invalid_state_errors_leave_tree_unchanged() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let head = doc.head().unwrap();
    let a = doc.create_element("a");
    doc.append_child(body, a).unwrap();

    assert!(doc.remove_child(head, a).is_err());
    assert_eq!(doc.parent_node(a), Some(body));

    let b = doc.create_element("b");
    assert!(doc.insert_before(head, b, Some(a)).is_err());
    assert_eq!(doc.parent_node(b), None);
    assert!(doc.child_nodes(head).is_empty());
}

#[test]
fn test_error_messages() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let stray = doc.create_element("div");
    let err = doc.remove_child(body, stray).unwrap_err();
    assert!(err.to_string().starts_with("invalid state"));
}

// ============================================================================
// ID INDEX
// ============================================================================

#[test]
fn test_id_then_attach() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let div = doc.create_element("div");
    doc.set_element_id(div, "x").unwrap();
    doc.append_child(body, div).unwrap();
    assert_eq!(doc.get_element_by_id("x"), Some(div));
    assert_eq!(doc.element_id(div), "x");

    doc.remove_attribute(div, "id").unwrap();
    assert_eq!(doc.get_element_by_id("x"), None);
    assert_eq!(doc.element_id(div), "");
}

#[test]
fn test_empty_id_is_not_indexed() {
    let mut doc = Document::new("test://tree");
    let div = doc.create_element("div");
    doc.set_element_id(div, "").unwrap();
    assert_eq!(doc.get_element_by_id(""), None);
    assert!(doc.has_attribute(div, "id"));
}

// ============================================================================
// CLONING
// ============================================================================

#[test]
fn test_deep_clone_shares_no_identity() {
    let mut doc = Document::new("test://tree");
    let body = doc.body().unwrap();
    let root = doc.create_element("section");
    doc.append_child(body, root).unwrap();
    for tag in ["h1", "p", "p"] {
        let child = doc.create_element(tag);
        let text = doc.create_text_node(tag);
        doc.append_child(child, text).unwrap();
        doc.append_child(root, child).unwrap();
    }

    let copy = doc.clone_node(root, true).unwrap();
    let original: Vec<NodeId> = doc.tree().descendants(root);
    let cloned: Vec<NodeId> = doc.tree().descendants(copy);
    assert_eq!(original.len(), cloned.len());
    for (o, c) in original.iter().zip(&cloned) {
        assert_ne!(o, c);
        assert_eq!(doc.node_name(*o), doc.node_name(*c));
        assert_eq!(doc.text_content(*o), doc.text_content(*c));
    }
}

#[test]
fn test_style_handle_survives_clone() {
    let mut doc = Document::new("test://tree");
    let div = doc.create_element("div");
    let style: StyleHandle = std::sync::Arc::new(String::from("color: red"));
    doc.set_style(div, style.clone()).unwrap();

    let copy = doc.clone_node(div, false).unwrap();
    for id in [div, copy] {
        assert!(doc.node(id).unwrap().is_element());
        let held = doc.element(id).unwrap().style().unwrap();
        assert!(std::sync::Arc::ptr_eq(held, &style));
        assert_eq!((**held).downcast_ref::<String>().unwrap(), "color: red");
    }

    let text = doc.create_text_node("x");
    assert!(!doc.node(text).unwrap().is_element());
    assert_eq!(doc.set_style(text, style), Err(DomError::NotAnElement(text)));
}
