use serde_json::Value;

use crate::core::{AttrPatch, Editor, ElementNode, Node, Point, Selection};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::{Op, Transaction};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, EditorPlugin, ElementSpec, QuerySpec,
    ancestor_element_path,
};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{apply_error, arg_str, current_block_path};

pub const LIST_TYPES: [&str; 3] = ["numbered-list", "bulleted-list", "letter-list"];
pub const DEFAULT_LIST_TYPE: &str = "bulleted-list";

fn list_type(el: &ElementNode) -> Option<&str> {
    el.data_str("list-type")
        .filter(|t| LIST_TYPES.contains(t))
}

pub struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![
            ElementSpec::block("list", ChildConstraint::BlockOnly).nodes(&["list-item"], "list-item"),
            ElementSpec::block("list-item", ChildConstraint::BlockOnly),
        ]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        match el.kind.as_str() {
            "list" => {
                let kind = list_type(el).unwrap_or(DEFAULT_LIST_TYPE);
                let tag = if kind == "bulleted-list" { "ul" } else { "ol" };
                Some(cx.element(tag, el, vec![("list-type".to_string(), kind.to_string())]))
            }
            "list-item" => Some(cx.element("li", el, Vec::new())),
            _ => None,
        }
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        let out = match el.kind.as_str() {
            "list" => match list_type(el).unwrap_or(DEFAULT_LIST_TYPE) {
                "numbered-list" => MarkupElement::new("ol"),
                "letter-list" => MarkupElement::new("ol").with_attr("data-type", "letters"),
                _ => MarkupElement::new("ul"),
            },
            "list-item" => MarkupElement::new("li"),
            _ => return None,
        };
        Some(out.with_children(cx.children(el)).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let node = match el.tag.as_str() {
            "ul" => ElementNode::new("list").with_data("list-type", "bulleted-list"),
            "ol" if el.attr("data-type") == Some("letters") => {
                ElementNode::new("list").with_data("list-type", "letter-list")
            }
            "ol" => ElementNode::new("list").with_data("list-type", "numbered-list"),
            "li" => ElementNode::new("list-item"),
            _ => return None,
        };
        Some(vec![node.with_children(cx.children(el)).into_node()])
    }

    fn normalize_node(
        &self,
        el: &ElementNode,
        path: &[usize],
        _cx: &NormalizeContext<'_>,
    ) -> Option<Vec<Op>> {
        if el.kind != "list" || list_type(el).is_some() {
            return None;
        }
        tracing::debug!(target: "ndla_editor::normalize", ?path, "list without type");
        Some(vec![Op::SetNodeAttrs {
            path: path.to_vec(),
            patch: AttrPatch::set("list-type", DEFAULT_LIST_TYPE),
        }])
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle", "Toggle list", |editor, args| {
                let kind = arg_str(args.as_ref(), "list-type").unwrap_or(DEFAULT_LIST_TYPE);
                if !LIST_TYPES.contains(&kind) {
                    return Err(CommandError::new(format!("Unknown list type: {kind}")));
                }
                toggle_list(editor, kind)
            })
            .description("Wrap the current paragraph in a list, change the list type, or unwrap the list.")
            .keywords(["list", "bulleted", "numbered", "ol", "ul"])
            .args_example(serde_json::json!({ "list-type": "numbered-list" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("list.active_type", |editor, _args| {
            Ok(active_list_type(editor).map_or(Value::Null, |t| Value::String(t.to_string())))
        })]
    }
}

fn active_list_type(editor: &Editor) -> Option<&str> {
    let point = editor.focus_point()?;
    let path = ancestor_element_path(editor.doc(), &point.path, "list")?;
    list_type(editor.doc().element(&path)?)
}

fn toggle_list(editor: &mut Editor, kind: &str) -> Result<(), CommandError> {
    let Some(point) = editor.focus_point().cloned() else {
        return Ok(());
    };

    if let Some(list_path) = ancestor_element_path(editor.doc(), &point.path, "list") {
        let Some(list) = editor.doc().element(&list_path) else {
            return Ok(());
        };
        if list_type(list) != Some(kind) {
            let op = Op::SetNodeAttrs {
                path: list_path,
                patch: AttrPatch::set("list-type", kind),
            };
            return editor
                .apply(Transaction::new(vec![op]).source("list.toggle"))
                .map_err(|err| apply_error("toggle list", err));
        }
        return unwrap_list(editor, list_path, &point);
    }

    let block = current_block_path(editor).ok_or_else(|| CommandError::new("No block at the selection"))?;
    let Some(el) = editor.doc().element(&block) else {
        return Ok(());
    };
    if el.kind != "paragraph" {
        return Ok(());
    }
    let list = ElementNode::new("list")
        .with_data("list-type", kind)
        .with_children(vec![Node::element("list-item", vec![Node::Element(el.clone())])])
        .into_node();

    // paragraph at P becomes P > list-item 0 > paragraph 0
    let mut inner = block.clone();
    inner.extend([0, 0]);
    inner.extend_from_slice(&point.path[block.len()..]);
    let cursor = Point::new(inner, point.offset);

    let tx = Transaction::new(vec![
        Op::RemoveNode { path: block.clone() },
        Op::InsertNode { path: block, node: list },
    ])
    .selection_after(Selection::collapsed(cursor))
    .source("list.toggle");
    editor.apply(tx).map_err(|err| apply_error("toggle list", err))
}

/// Replaces the list with the blocks of its items.
fn unwrap_list(editor: &mut Editor, list_path: Vec<usize>, point: &Point) -> Result<(), CommandError> {
    let Some(list) = editor.doc().element(&list_path) else {
        return Ok(());
    };
    let blocks: Vec<Node> = list
        .children
        .iter()
        .filter_map(Node::as_element)
        .flat_map(|item| item.children.iter().cloned())
        .collect();

    let depth = list_path.len();
    let cursor = match (point.path.get(depth), point.path.get(depth + 1)) {
        (Some(&item_ix), Some(&block_ix)) => {
            let before: usize = list.children[..item_ix]
                .iter()
                .filter_map(Node::as_element)
                .map(|item| item.children.len())
                .sum();
            let mut path = list_path.clone();
            if let Some(last) = path.last_mut() {
                *last += before + block_ix;
            }
            path.extend_from_slice(&point.path[depth + 2..]);
            Some(Point::new(path, point.offset))
        }
        _ => None,
    };

    let mut ops = vec![Op::RemoveNode {
        path: list_path.clone(),
    }];
    ops.extend(blocks.into_iter().enumerate().map(|(offset, node)| {
        let mut path = list_path.clone();
        if let Some(last) = path.last_mut() {
            *last += offset;
        }
        Op::InsertNode { path, node }
    }));

    let mut tx = Transaction::new(ops).source("list.toggle");
    if let Some(cursor) = cursor {
        tx = tx.selection_after(Selection::collapsed(cursor));
    }
    editor.apply(tx).map_err(|err| apply_error("unwrap list", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;
    use crate::core::Document;

    fn editor(html: &str) -> Editor {
        let mut editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
        editor.focus();
        editor
    }

    #[test]
    fn wire_forms_round_trip() {
        for html in [
            "<section><ul><li><p>a</p></li></ul></section>",
            "<section><ol><li><p>a</p></li></ol></section>",
            r#"<section><ol data-type="letters"><li><p>a</p></li></ol></section>"#,
        ] {
            assert_eq!(editor(html).to_html(), html);
        }
    }

    #[test]
    fn toggle_wraps_changes_and_unwraps() {
        let mut editor = editor("<section><p>a</p></section>");
        let args = |t: &str| Some(serde_json::json!({ "list-type": t }));

        editor.run_command("list.toggle", args("bulleted-list")).unwrap();
        assert_eq!(editor.to_html(), "<section><ul><li><p>a</p></li></ul></section>");
        assert_eq!(editor.run_query::<Option<String>>("list.active_type", None).unwrap().as_deref(), Some("bulleted-list"));

        editor.run_command("list.toggle", args("numbered-list")).unwrap();
        assert_eq!(editor.to_html(), "<section><ol><li><p>a</p></li></ol></section>");

        editor.run_command("list.toggle", args("numbered-list")).unwrap();
        assert_eq!(editor.to_html(), "<section><p>a</p></section>");
    }

    #[test]
    fn untyped_list_defaults_to_bulleted() {
        let doc = Document::new(vec![Node::section(vec![Node::element(
            "list",
            vec![Node::element("list-item", vec![Node::paragraph("x")])],
        )])]);
        let editor = Editor::new(doc, PluginRegistry::learning_resource());
        let list = editor.doc().element(&[0, 0]).unwrap();
        assert_eq!(list.data_str("list-type"), Some(DEFAULT_LIST_TYPE));
    }
}
