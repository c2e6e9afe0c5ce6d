use serde_json::Value;

use crate::core::{AttrPatch, Document, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::{Op, Transaction};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, EditorPlugin, ElementSpec, NormalizePass,
    PluginRegistry, QuerySpec,
};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{apply_error, arg_u64, between_text_blocks, current_block_path, insert_block};

pub const DEFAULT_HEADING_LEVEL: u8 = 2;

pub fn divider_node() -> Node {
    Node::void("divider", Default::default())
}

pub struct SectionPlugin;

impl EditorPlugin for SectionPlugin {
    fn id(&self) -> &'static str {
        "section"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![
            ElementSpec::block("section", ChildConstraint::BlockOnly),
            ElementSpec::block("paragraph", ChildConstraint::InlineOnly),
        ]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        match el.kind.as_str() {
            "section" => Some(cx.element("section", el, Vec::new())),
            "paragraph" => Some(cx.element("p", el, Vec::new())),
            _ => None,
        }
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        let tag = match el.kind.as_str() {
            "section" => "section",
            "paragraph" => "p",
            _ => return None,
        };
        Some(MarkupElement::new(tag).with_children(cx.children(el)).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let kind = match el.tag.as_str() {
            "section" => "section",
            "p" => "paragraph",
            _ => return None,
        };
        Some(vec![Node::element(kind, cx.children(el))])
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(EnsureNonEmptyDocument), Box::new(WrapRootInSections)]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "section.non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Option<Vec<Op>> {
        if !doc.children.is_empty() {
            return None;
        }
        Some(vec![Op::InsertNode {
            path: vec![0],
            node: Node::section(vec![Node::paragraph("")]),
        }])
    }
}

/// Root children other than sections are gathered into a section.
struct WrapRootInSections;

impl NormalizePass for WrapRootInSections {
    fn id(&self) -> &'static str {
        "section.wrap_root"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Option<Vec<Op>> {
        let children = &doc.children;
        let start = children.iter().position(|n| !n.is_kind("section"))?;
        let end = children[start..]
            .iter()
            .position(|n| n.is_kind("section"))
            .map_or(children.len(), |len| start + len);

        let mut ops: Vec<Op> = (start..end)
            .rev()
            .map(|ix| Op::RemoveNode { path: vec![ix] })
            .collect();
        ops.push(Op::InsertNode {
            path: vec![start],
            node: Node::section(children[start..end].to_vec()),
        });
        Some(ops)
    }
}

fn heading_level(el: &ElementNode) -> Option<u8> {
    el.data_str("level")?
        .parse::<u8>()
        .ok()
        .filter(|level| (1..=6).contains(level))
}

pub struct HeadingPlugin;

impl EditorPlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![ElementSpec::block("heading", ChildConstraint::InlineOnly)]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        if el.kind != "heading" {
            return None;
        }
        let level = heading_level(el).unwrap_or(DEFAULT_HEADING_LEVEL);
        Some(cx.element(&format!("h{level}"), el, Vec::new()))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "heading" {
            return None;
        }
        let level = heading_level(el).unwrap_or(DEFAULT_HEADING_LEVEL);
        Some(
            MarkupElement::new(format!("h{level}"))
                .with_children(cx.children(el))
                .into_node(),
        )
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let level = el
            .tag
            .strip_prefix('h')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|level| (1..=6).contains(level))?;
        Some(vec![
            ElementNode::new("heading")
                .with_data("level", level.to_string())
                .with_children(cx.children(el))
                .into_node(),
        ])
    }

    fn normalize_node(
        &self,
        el: &ElementNode,
        path: &[usize],
        _cx: &NormalizeContext<'_>,
    ) -> Option<Vec<Op>> {
        if el.kind != "heading" || heading_level(el).is_some() {
            return None;
        }
        let level = el
            .data_str("level")
            .and_then(|s| s.parse::<i64>().ok())
            .map_or(DEFAULT_HEADING_LEVEL, |n| n.clamp(1, 6) as u8);
        Some(vec![Op::SetNodeAttrs {
            path: path.to_vec(),
            patch: AttrPatch::set("level", level.to_string()),
        }])
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("heading.set", "Set heading", |editor, args| {
                let level = arg_u64(args.as_ref(), "level")
                    .unwrap_or(u64::from(DEFAULT_HEADING_LEVEL))
                    .clamp(1, 6);
                let heading = ElementNode::new("heading").with_data("level", level.to_string());
                retype_current_block(editor, &["paragraph", "heading"], heading, "heading.set")
            })
            .description("Turn the current paragraph into a heading.")
            .keywords(["heading", "title", "h2", "h3"])
            .args_example(serde_json::json!({ "level": 2 })),
            CommandSpec::new("heading.unset", "Unset heading", |editor, _args| {
                retype_current_block(
                    editor,
                    &["heading"],
                    ElementNode::new("paragraph"),
                    "heading.unset",
                )
            })
            .description("Turn the current heading back into a paragraph.")
            .keywords(["heading", "paragraph"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("heading.level", |editor, _args| {
            let level = current_block_path(editor)
                .and_then(|path| editor.doc().element(&path))
                .filter(|el| el.kind == "heading")
                .and_then(heading_level);
            Ok(level.map_or(Value::Null, Value::from))
        })]
    }
}

/// Replaces the current block with `target`, keeping its children and the
/// selection.
fn retype_current_block(
    editor: &mut crate::core::Editor,
    from: &[&str],
    target: ElementNode,
    source: &str,
) -> Result<(), CommandError> {
    let path = current_block_path(editor).ok_or_else(|| CommandError::new("No block at the selection"))?;
    let Some(el) = editor.doc().element(&path) else {
        return Err(CommandError::new("No block at the selection"));
    };
    if !from.contains(&el.kind.as_str()) {
        return Ok(());
    }
    let node = target.with_children(el.children.clone()).into_node();
    let mut tx = Transaction::new(vec![
        Op::RemoveNode { path: path.clone() },
        Op::InsertNode { path, node },
    ])
    .source(source);
    if let Some(selection) = editor.selection().cloned() {
        tx = tx.selection_after(selection);
    }
    editor.apply(tx).map_err(|err| apply_error(source, err))
}

pub struct QuotePlugin;

impl EditorPlugin for QuotePlugin {
    fn id(&self) -> &'static str {
        "quote"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![ElementSpec::block("quote", ChildConstraint::BlockOnly)]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "quote").then(|| cx.element("blockquote", el, Vec::new()))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "quote").then(|| {
            MarkupElement::new("blockquote")
                .with_children(cx.children(el))
                .into_node()
        })
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        (el.tag == "blockquote").then(|| vec![Node::element("quote", cx.children(el))])
    }
}

pub struct DividerPlugin;

impl EditorPlugin for DividerPlugin {
    fn id(&self) -> &'static str {
        "divider"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(
            ElementSpec::block("divider", ChildConstraint::None).void(),
        )]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "divider").then(|| cx.element("hr", el, Vec::new()))
    }

    fn serialize(&self, el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "divider").then(|| MarkupElement::new("hr").into_node())
    }

    fn deserialize(&self, el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        (el.tag == "hr").then(|| vec![divider_node()])
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("divider.insert", "Insert divider", |editor, _args| {
                insert_block(editor, divider_node(), "divider.insert").map(|_| ())
            })
            .description("Insert a horizontal rule after the current block.")
            .keywords(["divider", "hr", "rule"]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::child_path;

    #[test]
    fn out_of_range_heading_levels_are_clamped() {
        let registry = PluginRegistry::core();
        let mut doc = Document::new(vec![Node::section(vec![
            ElementNode::new("heading")
                .with_data("level", "9")
                .with_children(vec![Node::text("x")])
                .into_node(),
        ])]);
        crate::normalize::normalize_document(&mut doc, &mut None, &registry, 100).unwrap();
        let heading = doc.element(&[0, 0]).unwrap();
        assert_eq!(heading.data_str("level"), Some("6"));
    }

    #[test]
    fn root_runs_are_wrapped_in_one_section() {
        let doc = Document::new(vec![Node::paragraph("a"), Node::paragraph("b")]);
        let ops = WrapRootInSections.run(&doc, &PluginRegistry::core()).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            &ops[2],
            Op::InsertNode { path, node } if path == &child_path(&[], 0) && node.is_kind("section")
        ));
    }
}
