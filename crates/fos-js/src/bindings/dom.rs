//! DOM bindings
//!
//! Nodes cross into script as numeric ids; the prelude wraps them in
//! `Node`/`Element` objects. Every call locks the context's document for
//! its duration only.

use std::sync::{Arc, Weak};

use fos_dom::{Document, NodeId};

use super::{ids_to_js, opt_id_to_js, unknown_op, upgrade, Args, CanvasPresentation};
use crate::context::ContextShared;
use crate::engine_trait::NativeFunction;
use crate::{JsError, JsValue};

/// `__fos_dom(op, ...)`
pub(super) fn host(shared: &Weak<ContextShared>) -> NativeFunction {
    let shared = shared.clone();
    Arc::new(move |args| {
        let shared = upgrade(&shared)?;
        let mut document = shared.document.lock();
        call(&mut document, &Args(args))
    })
}

fn node(args: &Args<'_>, i: usize) -> Result<NodeId, JsError> {
    args.u32(i).map(NodeId::from_u32)
}

fn opt_node(args: &Args<'_>, i: usize) -> Result<Option<NodeId>, JsError> {
    Ok(args.opt_u32(i)?.map(NodeId::from_u32))
}

fn id(node: NodeId) -> JsValue {
    JsValue::from(node.as_u32())
}

fn opt(node: Option<NodeId>) -> JsValue {
    opt_id_to_js(node.map(NodeId::as_u32))
}

fn list(nodes: Vec<NodeId>) -> JsValue {
    ids_to_js(nodes.into_iter().map(NodeId::as_u32))
}

fn opt_text(text: Option<&str>) -> JsValue {
    text.map(JsValue::from).unwrap_or(JsValue::Null)
}

fn call(doc: &mut Document, args: &Args<'_>) -> Result<JsValue, JsError> {
    let op = args.str(0)?;
    let value = match op {
        "root" => id(NodeId::ROOT),
        "documentElement" => opt(doc.document_element()),
        "head" => opt(doc.head()),
        "body" => opt(doc.body()),

        "create" => id(doc.create_element(&args.text(1))),
        "createText" => id(doc.create_text_node(&args.text(1))),
        "createComment" => id(doc.create_comment(&args.text(1))),

        "byId" => opt(doc.get_element_by_id(&args.text(1))),
        "byTag" => {
            let tag = args.text(2);
            list(match opt_node(args, 1)? {
                Some(root) => doc.elements_by_tag_name_in(root, &tag),
                None => doc.get_elements_by_tag_name(&tag),
            })
        }
        "byClass" => {
            let classes = args.text(2);
            list(match opt_node(args, 1)? {
                Some(root) => doc.elements_by_class_name_in(root, &classes),
                None => doc.get_elements_by_class_name(&classes),
            })
        }

        "append" => id(doc.append_child(node(args, 1)?, node(args, 2)?)?),
        "remove" => id(doc.remove_child(node(args, 1)?, node(args, 2)?)?),
        "insert" => id(doc.insert_before(node(args, 1)?, node(args, 2)?, opt_node(args, 3)?)?),
        "clone" => id(doc.clone_node(node(args, 1)?, args.bool(2))?),
        "contains" => doc.contains(node(args, 1)?, node(args, 2)?).into(),

        "parent" => opt(doc.parent_node(node(args, 1)?)),
        "first" => opt(doc.first_child(node(args, 1)?)),
        "last" => opt(doc.last_child(node(args, 1)?)),
        "next" => opt(doc.next_sibling(node(args, 1)?)),
        "prev" => opt(doc.previous_sibling(node(args, 1)?)),
        "children" => list(doc.child_nodes(node(args, 1)?)),

        "type" => match doc.node_type(node(args, 1)?) {
            Some(kind) => JsValue::from(u32::from(kind.code())),
            None => JsValue::Null,
        },
        "name" => opt_text(doc.node_name(node(args, 1)?)),
        "tag" => opt_text(doc.tag_name(node(args, 1)?)),

        "getAttr" => opt_text(doc.get_attribute(node(args, 1)?, &args.text(2))),
        "hasAttr" => doc.has_attribute(node(args, 1)?, &args.text(2)).into(),
        "setAttr" => {
            doc.set_attribute(node(args, 1)?, &args.text(2), &args.text(3))?;
            JsValue::Undefined
        }
        "removeAttr" => {
            doc.remove_attribute(node(args, 1)?, &args.text(2))?;
            JsValue::Undefined
        }
        "attrNames" => JsValue::Json(doc.attribute_names(node(args, 1)?).into()),

        "getText" => opt_text(doc.text_content(node(args, 1)?).as_deref()),
        "setText" => {
            doc.set_text_content(node(args, 1)?, &args.text(2))?;
            JsValue::Undefined
        }

        "canvas" => opt_id_to_js(
            doc.presentation::<CanvasPresentation>(node(args, 1)?)
                .map(|canvas| canvas.surface_id),
        ),
        op => return Err(unknown_op("dom", op)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_dom::NodeType;

    fn run(doc: &mut Document, values: &[JsValue]) -> JsValue {
        call(doc, &Args(values)).unwrap()
    }

    fn num(value: JsValue) -> u32 {
        value.as_f64().unwrap() as u32
    }

    #[test]
    fn test_create_and_append() {
        let mut doc = Document::new("about:blank");
        let body = num(run(&mut doc, &["body".into()]));
        let div = num(run(&mut doc, &["create".into(), "div".into()]));
        run(&mut doc, &["append".into(), body.into(), div.into()]);
        run(&mut doc, &["setAttr".into(), div.into(), "id".into(), "box".into()]);

        assert_eq!(num(run(&mut doc, &["byId".into(), "box".into()])), div);
        assert_eq!(num(run(&mut doc, &["parent".into(), div.into()])), body);
        assert_eq!(
            run(&mut doc, &["type".into(), div.into()]),
            JsValue::from(u32::from(NodeType::Element.code()))
        );
        assert_eq!(run(&mut doc, &["tag".into(), div.into()]), JsValue::from("DIV"));
    }

    #[test]
    fn test_dom_errors_surface() {
        let mut doc = Document::new("about:blank");
        let text = num(run(&mut doc, &["createText".into(), "hi".into()]));
        let div = num(run(&mut doc, &["create".into(), "div".into()]));
        let err = call(&mut doc, &Args(&["append".into(), text.into(), div.into()])).unwrap_err();
        assert!(matches!(err, JsError::Dom(_)));
        let err = call(&mut doc, &Args(&["explode".into()])).unwrap_err();
        assert!(matches!(err, JsError::TypeError(_)));
    }

    #[test]
    fn test_missing_lookups_are_null() {
        let mut doc = Document::new("about:blank");
        assert_eq!(run(&mut doc, &["byId".into(), "nope".into()]), JsValue::Null);
        assert_eq!(run(&mut doc, &["getAttr".into(), 0u32.into(), "x".into()]), JsValue::Null);
        assert_eq!(run(&mut doc, &["getText".into(), 0u32.into()]), JsValue::Null);
    }
}
