use crate::core::{ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::{Op, child_path};
use crate::plugin::{ChildConstraint, CommandSpec, EditorPlugin, ElementSpec};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{between_text_blocks, insert_block};

pub fn details_node() -> Node {
    Node::element(
        "details",
        vec![Node::element("summary", vec![Node::text("")]), Node::paragraph("")],
    )
}

/// A details box holds exactly one leading summary and at least one
/// content block after it.
fn normalize_details(el: &ElementNode, path: &[usize]) -> Option<(&'static str, Vec<Op>)> {
    let summaries: Vec<usize> = el
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_kind("summary"))
        .map(|(ix, _)| ix)
        .collect();

    let Some(&first) = summaries.first() else {
        return Some((
            "details.missing_summary",
            vec![Op::InsertNode {
                path: child_path(path, 0),
                node: Node::element("summary", vec![Node::text("")]),
            }],
        ));
    };
    if first != 0 {
        return Some((
            "details.summary_first",
            vec![Op::MoveNode {
                path: child_path(path, first),
                new_path: child_path(path, 0),
            }],
        ));
    }
    if let Some(&extra) = summaries.get(1) {
        let children = el.children[extra]
            .as_element()
            .map(|s| s.children.clone())
            .unwrap_or_default();
        let at = child_path(path, extra);
        return Some((
            "details.extra_summary",
            vec![
                Op::RemoveNode { path: at.clone() },
                Op::InsertNode {
                    path: at,
                    node: Node::element("paragraph", children),
                },
            ],
        ));
    }
    if el.children.len() == 1 {
        return Some((
            "details.missing_content",
            vec![Op::InsertNode {
                path: child_path(path, 1),
                node: Node::paragraph(""),
            }],
        ));
    }
    None
}

pub struct DetailsPlugin;

impl EditorPlugin for DetailsPlugin {
    fn id(&self) -> &'static str {
        "details"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![
            between_text_blocks(ElementSpec::block("details", ChildConstraint::BlockOnly)),
            ElementSpec::block("summary", ChildConstraint::InlineOnly),
        ]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        match el.kind.as_str() {
            "details" => Some(cx.element("details", el, Vec::new())),
            "summary" => Some(cx.element("summary", el, Vec::new())),
            _ => None,
        }
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        let tag = match el.kind.as_str() {
            "details" => "details",
            "summary" => "summary",
            _ => return None,
        };
        Some(MarkupElement::new(tag).with_children(cx.children(el)).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let kind = match el.tag.as_str() {
            "details" => "details",
            "summary" => "summary",
            _ => return None,
        };
        Some(vec![Node::element(kind, cx.children(el))])
    }

    fn normalize_node(&self, el: &ElementNode, path: &[usize], _cx: &NormalizeContext<'_>) -> Option<Vec<Op>> {
        if el.kind != "details" {
            return None;
        }
        let (rule, ops) = normalize_details(el, path)?;
        tracing::debug!(target: "ndla_editor::normalize", rule, ?path, "details structure");
        Some(ops)
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("details.insert", "Insert expandable box", |editor, _args| {
                insert_block(editor, details_node(), "details.insert").map(|_| ())
            })
            .description("Insert an expandable box and put the cursor in its summary.")
            .keywords(["details", "summary", "ekspanderbar"]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_moved_to_the_front() {
        let el = ElementNode::new("details").with_children(vec![
            Node::paragraph("body"),
            Node::element("summary", vec![Node::text("s")]),
        ]);
        let (rule, ops) = normalize_details(&el, &[0, 1]).unwrap();
        assert_eq!(rule, "details.summary_first");
        assert_eq!(
            ops,
            vec![Op::MoveNode {
                path: vec![0, 1, 1],
                new_path: vec![0, 1, 0],
            }]
        );
    }

    #[test]
    fn second_summary_becomes_a_paragraph() {
        let el = ElementNode::new("details").with_children(vec![
            Node::element("summary", vec![Node::text("a")]),
            Node::element("summary", vec![Node::text("b")]),
        ]);
        let (rule, ops) = normalize_details(&el, &[0, 0]).unwrap();
        assert_eq!(rule, "details.extra_summary");
        assert!(matches!(&ops[1], Op::InsertNode { node, .. } if node.is_kind("paragraph")));
    }

    #[test]
    fn built_node_is_already_valid() {
        let node = details_node();
        assert!(normalize_details(node.as_element().unwrap(), &[0, 0]).is_none());
    }
}
