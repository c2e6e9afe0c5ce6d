//! Tables: an optional caption, an optional head and one body, each holding
//! rows of cells. Head rows hold header cells; body rows hold data cells
//! unless a header cell is marked `scope="row"`.

use serde_json::{Value, json};

use crate::core::{Document, Editor, ElementNode, Node, Point, Selection};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::{Op, Path, Transaction, child_path};
use crate::plugin::{ChildConstraint, CommandError, CommandSpec, EditorPlugin, ElementSpec, QuerySpec};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{
    apply_error, arg_bool, arg_u64, attr_data, between_text_blocks, data_props, encode_value, insert_block,
};

const PART_KINDS: [&str; 3] = ["table-caption", "table-head", "table-body"];
const CELL_KINDS: [&str; 2] = ["table-cell", "table-cell-header"];

const TAGS: [(&str, &str); 7] = [
    ("table", "table"),
    ("table-caption", "caption"),
    ("table-head", "thead"),
    ("table-body", "tbody"),
    ("table-row", "tr"),
    ("table-cell", "td"),
    ("table-cell-header", "th"),
];

fn tag_for(kind: &str) -> Option<&'static str> {
    TAGS.iter().find(|(k, _)| *k == kind).map(|(_, tag)| *tag)
}

fn kind_for(tag: &str) -> Option<&'static str> {
    if tag == "tfoot" {
        return Some("table-body");
    }
    TAGS.iter().find(|(_, t)| *t == tag).map(|(kind, _)| *kind)
}

pub fn cell_node(kind: &str) -> Node {
    Node::element(kind, vec![Node::paragraph("")])
}

pub fn row_node(cell_kind: &str, cols: usize) -> Node {
    Node::element("table-row", (0..cols.max(1)).map(|_| cell_node(cell_kind)).collect())
}

/// A table of `rows` rows in total; with `header` the first row is a head row.
pub fn table_node(rows: usize, cols: usize, header: bool) -> Node {
    let mut parts = Vec::new();
    let body_rows = if header {
        parts.push(Node::element("table-head", vec![row_node("table-cell-header", cols)]));
        rows.saturating_sub(1).max(1)
    } else {
        rows.max(1)
    };
    parts.push(Node::element(
        "table-body",
        (0..body_rows).map(|_| row_node("table-cell", cols)).collect(),
    ));
    Node::element("table", parts)
}

/// Widest `colspan` honoured; larger values count as this.
pub const MAX_COLSPAN: usize = 1000;

fn cell_span(node: &Node) -> usize {
    node.as_element()
        .and_then(|el| el.data_str("colspan"))
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_COLSPAN)
}

fn row_width(row: &ElementNode) -> usize {
    row.children
        .iter()
        .filter(|n| n.kind().is_some_and(|k| CELL_KINDS.contains(&k)))
        .map(cell_span)
        .sum()
}

fn is_row_header(el: &ElementNode) -> bool {
    el.data_str("scope") == Some("row")
}

fn positions(table: &ElementNode, kind: &str) -> Vec<usize> {
    table
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_kind(kind))
        .map(|(ix, _)| ix)
        .collect()
}

fn child_len(table: &ElementNode, ix: usize) -> usize {
    table.children[ix].as_element().map_or(0, |el| el.children.len())
}

/// Rows of the head and body with their paths and the cell kind they hold.
fn row_groups<'a>(table: &'a ElementNode, path: &[usize]) -> Vec<(Path, &'a ElementNode, &'static str)> {
    let mut out = Vec::new();
    for (part_ix, part) in table.children.iter().enumerate() {
        let cell_kind = match part.kind() {
            Some("table-head") => "table-cell-header",
            Some("table-body") => "table-cell",
            _ => continue,
        };
        let part_path = child_path(path, part_ix);
        for (row_ix, row) in part.as_element().into_iter().flat_map(|p| p.children.iter()).enumerate() {
            if let Some(row) = row.as_element().filter(|r| r.kind == "table-row") {
                out.push((child_path(&part_path, row_ix), row, cell_kind));
            }
        }
    }
    out
}

fn normalize_table(table: &ElementNode, path: &[usize]) -> Option<(&'static str, Vec<Op>)> {
    let at = |ix: usize| child_path(path, ix);
    let bodies = positions(table, "table-body");

    if let Some(ix) = table
        .children
        .iter()
        .position(|n| !n.kind().is_some_and(|k| PART_KINDS.contains(&k)))
    {
        let ops = match bodies.first() {
            Some(&body) => {
                let body_after_removal = if ix < body { body - 1 } else { body };
                vec![Op::MoveNode {
                    path: at(ix),
                    new_path: child_path(&at(body_after_removal), child_len(table, body)),
                }]
            }
            None => vec![
                Op::RemoveNode { path: at(ix) },
                Op::InsertNode {
                    path: at(ix),
                    node: Node::element("table-body", vec![table.children[ix].clone()]),
                },
            ],
        };
        return Some(("table.stray_child", ops));
    }

    let captions = positions(table, "table-caption");
    if let Some(&extra) = captions.get(1) {
        return Some(("table.extra_caption", vec![Op::RemoveNode { path: at(extra) }]));
    }
    if let Some(&caption) = captions.first()
        && caption != 0
    {
        return Some((
            "table.caption_first",
            vec![Op::MoveNode {
                path: at(caption),
                new_path: at(0),
            }],
        ));
    }

    for kind in ["table-head", "table-body"] {
        let found = positions(table, kind);
        if let [first, extra, ..] = found[..] {
            let first_len = child_len(table, first);
            let mut ops: Vec<Op> = (0..child_len(table, extra))
                .map(|k| Op::MoveNode {
                    path: child_path(&at(extra), 0),
                    new_path: child_path(&at(first), first_len + k),
                })
                .collect();
            ops.push(Op::RemoveNode { path: at(extra) });
            return Some(("table.merge_parts", ops));
        }
    }

    let head = positions(table, "table-head").first().copied();
    let Some(body) = bodies.first().copied() else {
        return Some((
            "table.missing_body",
            vec![Op::InsertNode {
                path: at(table.children.len()),
                node: Node::element("table-body", vec![row_node("table-cell", 1)]),
            }],
        ));
    };
    if let Some(head) = head {
        if head > body {
            return Some((
                "table.head_before_body",
                vec![Op::MoveNode {
                    path: at(head),
                    new_path: at(body),
                }],
            ));
        }
        if child_len(table, head) == 0 {
            return Some(("table.empty_head", vec![Op::RemoveNode { path: at(head) }]));
        }
    }
    if child_len(table, body) == 0 {
        return Some((
            "table.empty_body",
            vec![Op::InsertNode {
                path: child_path(&at(body), 0),
                node: row_node("table-cell", 1),
            }],
        ));
    }

    let rows = row_groups(table, path);
    for (row_path, row, cell_kind) in &rows {
        for (cell_ix, cell) in row.children.iter().enumerate() {
            let Some(cell) = cell.as_element().filter(|c| CELL_KINDS.contains(&c.kind.as_str())) else {
                continue;
            };
            let keep = cell.kind == *cell_kind
                || (*cell_kind == "table-cell" && is_row_header(cell));
            if keep {
                continue;
            }
            let cell_path = child_path(row_path, cell_ix);
            let retyped = ElementNode {
                kind: cell_kind.to_string(),
                ..cell.clone()
            };
            return Some((
                "table.cell_kind",
                vec![
                    Op::RemoveNode {
                        path: cell_path.clone(),
                    },
                    Op::InsertNode {
                        path: cell_path,
                        node: retyped.into_node(),
                    },
                ],
            ));
        }
    }

    let width = rows.iter().map(|(_, row, _)| row_width(row)).max().unwrap_or(1).max(1);
    for (row_path, row, cell_kind) in &rows {
        let missing = width.saturating_sub(row_width(row));
        if missing == 0 {
            continue;
        }
        let len = row.children.len();
        let ops = (0..missing)
            .map(|k| Op::InsertNode {
                path: child_path(row_path, len + k),
                node: cell_node(cell_kind),
            })
            .collect();
        return Some(("table.pad_row", ops));
    }

    None
}

/// Table attributes are stored under their own names.
pub struct TablePlugin;

impl EditorPlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![
            between_text_blocks(ElementSpec::block("table", ChildConstraint::BlockOnly)),
            ElementSpec::block("table-caption", ChildConstraint::InlineOnly),
            ElementSpec::block("table-head", ChildConstraint::BlockOnly).nodes(&["table-row"], "table-row"),
            ElementSpec::block("table-body", ChildConstraint::BlockOnly).nodes(&["table-row"], "table-row"),
            ElementSpec::block("table-row", ChildConstraint::BlockOnly)
                .nodes(&CELL_KINDS, "table-cell"),
            ElementSpec::block("table-cell", ChildConstraint::BlockOnly),
            ElementSpec::block("table-cell-header", ChildConstraint::BlockOnly),
        ]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        let tag = tag_for(&el.kind)?;
        Some(cx.element(tag, el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        let tag = tag_for(&el.kind)?;
        let mut out = MarkupElement::new(tag);
        for (key, value) in &el.data {
            out.set_attr(key.clone(), encode_value(key, value));
        }
        Some(out.with_children(cx.children(el)).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let kind = kind_for(&el.tag)?;
        Some(vec![
            ElementNode::new(kind)
                .with_data_map(attr_data(el))
                .with_children(cx.children(el))
                .into_node(),
        ])
    }

    fn normalize_node(&self, el: &ElementNode, path: &[usize], _cx: &NormalizeContext<'_>) -> Option<Vec<Op>> {
        if el.kind != "table" {
            return None;
        }
        let (rule, ops) = normalize_table(el, path)?;
        tracing::debug!(target: "ndla_editor::normalize", rule, ?path, "table structure");
        Some(ops)
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let rows = arg_u64(args.as_ref(), "rows").unwrap_or(2).clamp(1, 32) as usize;
                let cols = arg_u64(args.as_ref(), "cols").unwrap_or(2).clamp(1, 32) as usize;
                let header = arg_bool(args.as_ref(), "header").unwrap_or(true);
                insert_block(editor, table_node(rows, cols, header), "table.insert").map(|_| ())
            })
            .description("Insert a table after the current block.")
            .keywords(["table", "tabell"])
            .args_example(json!({ "rows": 2, "cols": 3, "header": true })),
            CommandSpec::new("table.insert_row_above", "Insert row above", |editor, _args| {
                insert_row(editor, false)
            })
            .description("Insert a row above the current row.")
            .keywords(["table", "row", "insert"]),
            CommandSpec::new("table.insert_row_below", "Insert row below", |editor, _args| {
                insert_row(editor, true)
            })
            .description("Insert a row below the current row.")
            .keywords(["table", "row", "insert"]),
            CommandSpec::new("table.insert_col_left", "Insert column left", |editor, _args| {
                insert_col(editor, false)
            })
            .description("Insert a column left of the current cell.")
            .keywords(["table", "column", "insert"]),
            CommandSpec::new("table.insert_col_right", "Insert column right", |editor, _args| {
                insert_col(editor, true)
            })
            .description("Insert a column right of the current cell.")
            .keywords(["table", "column", "insert"]),
            CommandSpec::new("table.delete_row", "Delete row", |editor, _args| delete_row(editor))
                .description("Delete the current row.")
                .keywords(["table", "row", "delete"]),
            CommandSpec::new("table.delete_col", "Delete column", |editor, _args| delete_col(editor))
                .description("Delete the current column.")
                .keywords(["table", "column", "delete"]),
            CommandSpec::new("table.delete_table", "Delete table", |editor, _args| {
                let cx = cell_context(editor).ok_or_else(not_in_table)?;
                delete_table(editor, cx.table, "table.delete_table")
            })
            .description("Replace the current table with an empty paragraph.")
            .keywords(["table", "delete", "remove"]),
            CommandSpec::new("table.toggle_header", "Toggle header row", |editor, _args| {
                toggle_header(editor)
            })
            .description("Move the first row into a table head, or the head rows back into the body.")
            .keywords(["table", "header", "thead"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("table.is_active", |editor, _args| {
                Ok(Value::Bool(cell_context(editor).is_some()))
            }),
            QuerySpec::new("table.dimensions", |editor, _args| {
                let Some(cx) = cell_context(editor) else {
                    return Ok(Value::Null);
                };
                let Some(table) = editor.doc().element(&cx.table) else {
                    return Ok(Value::Null);
                };
                let rows = row_groups(table, &cx.table);
                let cols = rows.iter().map(|(_, row, _)| row_width(row)).max().unwrap_or(0);
                Ok(json!({ "rows": rows.len(), "cols": cols }))
            }),
        ]
    }
}

fn not_in_table() -> CommandError {
    CommandError::new("Not in a table")
}

struct CellContext {
    table: Path,
    container: Path,
    row: Path,
    cell: Path,
}

impl CellContext {
    fn col(&self) -> usize {
        self.cell.last().copied().unwrap_or(0)
    }

    fn row_ix(&self) -> usize {
        self.row.last().copied().unwrap_or(0)
    }
}

fn cell_context(editor: &Editor) -> Option<CellContext> {
    let doc = editor.doc();
    let point = editor.focus_point()?;
    let (cell, _) = doc
        .ancestors(&point.path)
        .into_iter()
        .find(|(_, el)| CELL_KINDS.contains(&el.kind.as_str()))?;
    let row = cell[..cell.len() - 1].to_vec();
    let container = row.get(..row.len().checked_sub(1)?)?.to_vec();
    let table = container.get(..container.len().checked_sub(1)?)?.to_vec();
    let is = |path: &[usize], kind: &str| doc.element(path).is_some_and(|el| el.kind == kind);
    if !is(&row, "table-row") || !is(&table, "table") {
        return None;
    }
    Some(CellContext {
        table,
        container,
        row,
        cell,
    })
}

fn part_path(doc: &Document, table: &[usize], kind: &str) -> Option<Path> {
    let el = doc.element(table)?;
    positions(el, kind).first().map(|&ix| child_path(table, ix))
}

fn cursor_in_cell(row: &[usize], col: usize) -> Selection {
    let mut path = child_path(row, col);
    path.extend([0, 0]);
    Selection::collapsed(Point::new(path, 0))
}

fn insert_row(editor: &mut Editor, below: bool) -> Result<(), CommandError> {
    let cx = cell_context(editor).ok_or_else(not_in_table)?;
    let doc = editor.doc();
    let cols = doc.element(&cx.row).map_or(1, |row| row.children.len().max(1));
    let in_head = doc.element(&cx.container).is_some_and(|el| el.kind == "table-head");
    let head_len = doc.element(&cx.container).map_or(0, |el| el.children.len());

    let (container, ix, cell_kind) = match (in_head, below) {
        (true, true) if cx.row_ix() + 1 == head_len => {
            let body = part_path(doc, &cx.table, "table-body").ok_or_else(not_in_table)?;
            (body, 0, "table-cell")
        }
        (true, _) => (cx.container.clone(), cx.row_ix() + usize::from(below), "table-cell-header"),
        (false, _) => (cx.container.clone(), cx.row_ix() + usize::from(below), "table-cell"),
    };
    let row_path = child_path(&container, ix);
    let selection = cursor_in_cell(&row_path, cx.col().min(cols - 1));
    let tx = Transaction::new(vec![Op::InsertNode {
        path: row_path,
        node: row_node(cell_kind, cols),
    }])
    .selection_after(selection)
    .source(if below { "table.insert_row_below" } else { "table.insert_row_above" });
    editor.apply(tx).map_err(|err| apply_error("insert row", err))
}

fn insert_col(editor: &mut Editor, right: bool) -> Result<(), CommandError> {
    let cx = cell_context(editor).ok_or_else(not_in_table)?;
    let col = cx.col() + usize::from(right);
    let table = editor.doc().element(&cx.table).ok_or_else(not_in_table)?;
    let ops = row_groups(table, &cx.table)
        .into_iter()
        .map(|(row_path, row, cell_kind)| Op::InsertNode {
            path: child_path(&row_path, col.min(row.children.len())),
            node: cell_node(cell_kind),
        })
        .collect();
    let tx = Transaction::new(ops)
        .selection_after(cursor_in_cell(&cx.row, col))
        .source(if right { "table.insert_col_right" } else { "table.insert_col_left" });
    editor.apply(tx).map_err(|err| apply_error("insert column", err))
}

/// Deleting the only body row pulls the last head row down into the body;
/// without a head the whole table goes.
fn delete_row(editor: &mut Editor) -> Result<(), CommandError> {
    let cx = cell_context(editor).ok_or_else(not_in_table)?;
    let doc = editor.doc();
    let container = doc.element(&cx.container).ok_or_else(not_in_table)?;
    let in_body = container.kind == "table-body";
    let only_row = container.children.len() == 1;

    let mut ops = vec![Op::RemoveNode { path: cx.row.clone() }];
    if in_body && only_row {
        let Some(head) = part_path(doc, &cx.table, "table-head") else {
            return delete_table(editor, cx.table, "table.delete_row");
        };
        let head_len = doc.element(&head).map_or(0, |el| el.children.len());
        let Some(last) = head_len.checked_sub(1) else {
            return delete_table(editor, cx.table, "table.delete_row");
        };
        ops.push(Op::MoveNode {
            path: child_path(&head, last),
            new_path: child_path(&cx.container, 0),
        });
    } else if !in_body && only_row && part_path(doc, &cx.table, "table-body").is_none() {
        return delete_table(editor, cx.table, "table.delete_row");
    }

    editor
        .apply(Transaction::new(ops).source("table.delete_row"))
        .map_err(|err| apply_error("delete row", err))
}

fn delete_col(editor: &mut Editor) -> Result<(), CommandError> {
    let cx = cell_context(editor).ok_or_else(not_in_table)?;
    let col = cx.col();
    let table = editor.doc().element(&cx.table).ok_or_else(not_in_table)?;
    let rows = row_groups(table, &cx.table);
    let width = rows.iter().map(|(_, row, _)| row.children.len()).max().unwrap_or(0);
    if width <= 1 {
        return delete_table(editor, cx.table, "table.delete_col");
    }
    let ops = rows
        .into_iter()
        .filter(|(_, row, _)| col < row.children.len())
        .map(|(row_path, _, _)| Op::RemoveNode {
            path: child_path(&row_path, col),
        })
        .collect();
    let tx = Transaction::new(ops)
        .selection_after(cursor_in_cell(&cx.row, col.saturating_sub(1)))
        .source("table.delete_col");
    editor.apply(tx).map_err(|err| apply_error("delete column", err))
}

fn delete_table(editor: &mut Editor, table: Path, source: &str) -> Result<(), CommandError> {
    let mut text = table.clone();
    text.push(0);
    let tx = Transaction::new(vec![
        Op::RemoveNode { path: table.clone() },
        Op::InsertNode {
            path: table,
            node: Node::paragraph(""),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(text, 0)))
    .source(source);
    editor.apply(tx).map_err(|err| apply_error("delete table", err))
}

fn toggle_header(editor: &mut Editor) -> Result<(), CommandError> {
    let cx = cell_context(editor).ok_or_else(not_in_table)?;
    let doc = editor.doc();
    let body = part_path(doc, &cx.table, "table-body").ok_or_else(not_in_table)?;

    let ops = match part_path(doc, &cx.table, "table-head") {
        Some(head) => {
            // head rows move to the top of the body, keeping their order
            let head_len = doc.element(&head).map_or(0, |el| el.children.len());
            (0..head_len)
                .rev()
                .map(|ix| Op::MoveNode {
                    path: child_path(&head, ix),
                    new_path: child_path(&body, 0),
                })
                .collect()
        }
        None => {
            let head_ix = usize::from(part_path(doc, &cx.table, "table-caption").is_some());
            let head = child_path(&cx.table, head_ix);
            let body_after_insert = child_path(&cx.table, head_ix + 1);
            vec![
                Op::InsertNode {
                    path: head.clone(),
                    node: Node::element("table-head", Vec::new()),
                },
                Op::MoveNode {
                    path: child_path(&body_after_insert, 0),
                    new_path: child_path(&head, 0),
                },
            ]
        }
    };
    editor
        .apply(Transaction::new(ops).source("table.toggle_header"))
        .map_err(|err| apply_error("toggle header", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;

    fn normalized(table: Node) -> Document {
        let registry = PluginRegistry::learning_resource();
        let mut doc = Document::new(vec![Node::section(vec![Node::paragraph(""), table, Node::paragraph("")])]);
        crate::normalize::normalize_document(&mut doc, &mut None, &registry, 1000).unwrap();
        doc
    }

    #[test]
    fn stray_rows_end_up_in_one_body() {
        let doc = normalized(Node::element(
            "table",
            vec![row_node("table-cell", 2), row_node("table-cell", 2)],
        ));
        let table = doc.element(&[0, 1]).unwrap();
        assert_eq!(table.children.len(), 1);
        let body = table.children[0].as_element().unwrap();
        assert_eq!(body.kind, "table-body");
        assert_eq!(body.children.len(), 2);
    }

    #[test]
    fn short_rows_are_padded_with_matching_cells() {
        let doc = normalized(Node::element(
            "table",
            vec![
                Node::element("table-head", vec![row_node("table-cell", 1)]),
                Node::element("table-body", vec![row_node("table-cell", 3)]),
            ],
        ));
        let head_row = doc.element(&[0, 1, 0, 0]).unwrap();
        assert_eq!(head_row.children.len(), 3);
        assert!(head_row.children.iter().all(|c| c.is_kind("table-cell-header")));
    }

    #[test]
    fn oversized_colspan_is_capped() {
        let markup = r#"<section><p></p><table><tbody><tr><td colspan="200000"><p>x</p></td></tr><tr><td><p>y</p></td></tr></tbody></table><p></p></section>"#;
        let doc = crate::serialize::deserialize(markup, &PluginRegistry::learning_resource()).unwrap();
        let second_row = doc.element(&[0, 1, 0, 1]).unwrap();
        assert_eq!(second_row.children.len(), MAX_COLSPAN);
        let first_row = doc.element(&[0, 1, 0, 0]).unwrap();
        assert_eq!(first_row.children.len(), 1);
        assert_eq!(cell_span(&first_row.children[0]), MAX_COLSPAN);
    }

    #[test]
    fn caption_moves_first_and_head_precedes_body() {
        let doc = normalized(Node::element(
            "table",
            vec![
                Node::element("table-body", vec![row_node("table-cell", 1)]),
                Node::element("table-head", vec![row_node("table-cell-header", 1)]),
                Node::element("table-caption", vec![Node::text("c")]),
            ],
        ));
        let table = doc.element(&[0, 1]).unwrap();
        let kinds: Vec<_> = table.children.iter().filter_map(Node::kind).collect();
        assert_eq!(kinds, ["table-caption", "table-head", "table-body"]);
    }

    #[test]
    fn row_headers_survive_in_the_body() {
        let header = ElementNode::new("table-cell-header")
            .with_data("scope", "row")
            .with_children(vec![Node::paragraph("h")])
            .into_node();
        let doc = normalized(Node::element(
            "table",
            vec![Node::element(
                "table-body",
                vec![Node::element("table-row", vec![header, cell_node("table-cell")])],
            )],
        ));
        assert!(doc.node(&[0, 1, 0, 0, 0]).unwrap().is_kind("table-cell-header"));
    }
}
