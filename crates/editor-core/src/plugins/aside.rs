use serde_json::json;

use crate::core::{AttrPatch, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::Op;
use crate::plugin::{ChildConstraint, CommandError, CommandSpec, EditorPlugin, ElementSpec};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{arg_str, between_text_blocks, insert_block};

pub const ASIDE_TYPES: [&str; 2] = ["rightside", "factAside"];
pub const DEFAULT_ASIDE_TYPE: &str = "rightside";

pub fn aside_node(kind: &str) -> Node {
    let kind = if ASIDE_TYPES.contains(&kind) { kind } else { DEFAULT_ASIDE_TYPE };
    ElementNode::new("aside")
        .with_data("type", kind)
        .with_children(vec![Node::paragraph("")])
        .into_node()
}

pub fn bodybox_node() -> Node {
    Node::element("bodybox", vec![Node::paragraph("")])
}

pub struct AsidePlugin;

impl EditorPlugin for AsidePlugin {
    fn id(&self) -> &'static str {
        "aside"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(ElementSpec::block("aside", ChildConstraint::BlockOnly))]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        if el.kind != "aside" {
            return None;
        }
        let kind = el.data_str("type").unwrap_or(DEFAULT_ASIDE_TYPE);
        Some(cx.element("aside", el, vec![("type".to_string(), kind.to_string())]))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "aside" {
            return None;
        }
        let kind = el.data_str("type").unwrap_or(DEFAULT_ASIDE_TYPE);
        Some(
            MarkupElement::new("aside")
                .with_attr("data-type", kind)
                .with_children(cx.children(el))
                .into_node(),
        )
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "aside" {
            return None;
        }
        let mut node = ElementNode::new("aside");
        if let Some(kind) = el.attr("data-type") {
            node = node.with_data("type", kind);
        }
        Some(vec![node.with_children(cx.children(el)).into_node()])
    }

    fn normalize_node(&self, el: &ElementNode, path: &[usize], _cx: &NormalizeContext<'_>) -> Option<Vec<Op>> {
        if el.kind != "aside" || el.data_str("type").is_some_and(|t| ASIDE_TYPES.contains(&t)) {
            return None;
        }
        tracing::debug!(target: "ndla_editor::normalize", ?path, "aside without known type");
        Some(vec![Op::SetNodeAttrs {
            path: path.to_vec(),
            patch: AttrPatch::set("type", DEFAULT_ASIDE_TYPE),
        }])
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("aside.insert", "Insert aside", |editor, args| {
                let kind = arg_str(args.as_ref(), "type").unwrap_or(DEFAULT_ASIDE_TYPE);
                if !ASIDE_TYPES.contains(&kind) {
                    return Err(CommandError::new(format!("Unknown aside type: {kind}")));
                }
                insert_block(editor, aside_node(kind), "aside.insert").map(|_| ())
            })
            .description("Insert a fact box or right-side aside after the current block.")
            .keywords(["aside", "factbox", "faktaboks"])
            .args_example(json!({ "type": "factAside" })),
        ]
    }
}

pub struct BodyboxPlugin;

impl EditorPlugin for BodyboxPlugin {
    fn id(&self) -> &'static str {
        "bodybox"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(ElementSpec::block("bodybox", ChildConstraint::BlockOnly))]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "bodybox").then(|| cx.element("div", el, vec![("type".to_string(), "bodybox".to_string())]))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "bodybox").then(|| {
            MarkupElement::new("div")
                .with_attr("data-type", "bodybox")
                .with_children(cx.children(el))
                .into_node()
        })
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        (el.tag == "div" && el.attr("data-type") == Some("bodybox"))
            .then(|| vec![Node::element("bodybox", cx.children(el))])
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("bodybox.insert", "Insert framed box", |editor, _args| {
                insert_block(editor, bodybox_node(), "bodybox.insert").map(|_| ())
            })
            .description("Insert a framed box after the current block.")
            .keywords(["bodybox", "box", "ramme"]),
        ]
    }
}
