use serde_json::{Value, json};

use crate::core::{AttrPatch, Editor, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::{Op, child_path};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, EditorPlugin, ElementSpec, QuerySpec,
    ancestor_element_path,
};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{apply_ops, arg_str, between_text_blocks, data_props, embed_data, insert_block, with_data_attrs};

pub const GRID_COLUMNS: [&str; 3] = ["2", "4", "2x2"];
pub const DEFAULT_GRID_COLUMNS: &str = "2";

/// Number of cells a grid holds for its `columns` setting.
pub fn column_count(columns: Option<&str>) -> usize {
    match columns {
        Some("4") | Some("2x2") => 4,
        _ => 2,
    }
}

fn grid_cell() -> Node {
    Node::element("grid-cell", vec![Node::paragraph("")])
}

pub fn grid_node(columns: &str) -> Node {
    let columns = if GRID_COLUMNS.contains(&columns) { columns } else { DEFAULT_GRID_COLUMNS };
    ElementNode::new("grid")
        .with_data("columns", columns)
        .with_children((0..column_count(Some(columns))).map(|_| grid_cell()).collect())
        .into_node()
}

fn div_data(el: &MarkupElement) -> crate::core::Data {
    let mut data = embed_data(el);
    data.remove("type");
    data
}

pub struct GridPlugin;

impl EditorPlugin for GridPlugin {
    fn id(&self) -> &'static str {
        "grid"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![
            between_text_blocks(
                ElementSpec::block("grid", ChildConstraint::BlockOnly).nodes(&["grid-cell"], "grid-cell"),
            ),
            ElementSpec::block("grid-cell", ChildConstraint::BlockOnly),
        ]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        match el.kind.as_str() {
            "grid" | "grid-cell" => Some(cx.element("div", el, data_props(el))),
            _ => None,
        }
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "grid" && el.kind != "grid-cell" {
            return None;
        }
        let out = MarkupElement::new("div").with_attr("data-type", el.kind.clone());
        Some(
            with_data_attrs(out, &el.data, &[])
                .with_children(cx.children(el))
                .into_node(),
        )
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "div" {
            return None;
        }
        let kind = match el.attr("data-type")? {
            "grid" => "grid",
            "grid-cell" => "grid-cell",
            _ => return None,
        };
        Some(vec![
            ElementNode::new(kind)
                .with_data_map(div_data(el))
                .with_children(cx.children(el))
                .into_node(),
        ])
    }

    fn normalize_node(&self, el: &ElementNode, path: &[usize], _cx: &NormalizeContext<'_>) -> Option<Vec<Op>> {
        if el.kind != "grid" {
            return None;
        }
        let columns = el.data_str("columns");
        if !columns.is_some_and(|c| GRID_COLUMNS.contains(&c)) {
            tracing::debug!(target: "ndla_editor::normalize", ?path, ?columns, "grid without valid columns");
            return Some(vec![Op::SetNodeAttrs {
                path: path.to_vec(),
                patch: AttrPatch::set("columns", DEFAULT_GRID_COLUMNS),
            }]);
        }

        let target = column_count(columns);
        let len = el.children.len();
        if len < target {
            let missing = target - len;
            tracing::debug!(target: "ndla_editor::normalize", ?path, "too few columns, adding {missing} columns");
            return Some(
                (len..target)
                    .map(|ix| Op::InsertNode {
                        path: child_path(path, ix),
                        node: grid_cell(),
                    })
                    .collect(),
            );
        }
        if len > target {
            let extra = len - target;
            tracing::debug!(target: "ndla_editor::normalize", ?path, "too many columns, removing {extra} columns");
            return Some(
                (target..len)
                    .rev()
                    .map(|ix| Op::RemoveNode {
                        path: child_path(path, ix),
                    })
                    .collect(),
            );
        }
        None
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("grid.insert", "Insert grid", |editor, args| {
                let columns = arg_str(args.as_ref(), "columns").unwrap_or(DEFAULT_GRID_COLUMNS);
                insert_block(editor, grid_node(columns), "grid.insert").map(|_| ())
            })
            .description("Insert a grid after the current block.")
            .keywords(["grid", "columns", "rutenett"])
            .args_example(json!({ "columns": "2" })),
            CommandSpec::new("grid.set_columns", "Set grid columns", |editor, args| {
                let columns = arg_str(args.as_ref(), "columns")
                    .ok_or_else(|| CommandError::new("Missing `columns` argument"))?;
                if !GRID_COLUMNS.contains(&columns) {
                    return Err(CommandError::new(format!("Unsupported grid columns: {columns}")));
                }
                let grid = enclosing(editor, "grid").ok_or_else(|| CommandError::new("Not in a grid"))?;
                let op = Op::SetNodeAttrs {
                    path: grid,
                    patch: AttrPatch::set("columns", columns),
                };
                apply_ops(editor, vec![op], "grid.set_columns")
            })
            .description("Change the number of grid columns; cells are added or removed at the end.")
            .keywords(["grid", "columns"])
            .args_example(json!({ "columns": "4" })),
            CommandSpec::new("grid.toggle_parallax", "Toggle parallax cell", |editor, _args| {
                let cell = enclosing(editor, "grid-cell").ok_or_else(|| CommandError::new("Not in a grid cell"))?;
                let on = editor
                    .doc()
                    .element(&cell)
                    .is_some_and(|el| el.data_str("parallax-cell") == Some("true"));
                let op = Op::SetNodeAttrs {
                    path: cell,
                    patch: AttrPatch::set("parallax-cell", if on { "false" } else { "true" }),
                };
                apply_ops(editor, vec![op], "grid.toggle_parallax")
            })
            .description("Toggle the parallax background on the current grid cell.")
            .keywords(["grid", "parallax"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("grid.is_active", |editor, _args| {
            Ok(Value::Bool(enclosing(editor, "grid").is_some()))
        })]
    }
}

fn enclosing(editor: &Editor, kind: &str) -> Option<Vec<usize>> {
    let point = editor.focus_point()?;
    ancestor_element_path(editor.doc(), &point.path, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_settings_map_to_cell_counts() {
        assert_eq!(column_count(Some("2")), 2);
        assert_eq!(column_count(Some("4")), 4);
        assert_eq!(column_count(Some("2x2")), 4);
        assert_eq!(column_count(Some("3")), 2);
        assert_eq!(column_count(None), 2);
    }

    #[test]
    fn unknown_settings_build_a_two_column_grid() {
        let grid = grid_node("7");
        let el = grid.as_element().unwrap();
        assert_eq!(el.data_str("columns"), Some("2"));
        assert_eq!(el.children.len(), 2);
    }
}
