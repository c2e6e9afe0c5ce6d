use crate::core::{Editor, MARK_NAMES, Marks, Node, Point, Selection, TextNode};
use crate::markup::MarkupElement;
use crate::ops::{Op, Path, Transaction, child_path};
use crate::plugin::{CommandError, CommandSpec, EditorPlugin, QueryError, QuerySpec};
use crate::serialize::DeserializeContext;

use super::{apply_error, arg_str};

/// Formatting marks on text leaves. Marks have no element kind of their
/// own; the serializer writes them around each text leaf.
pub struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        let mut marks = cx.marks.clone();
        match el.tag.as_str() {
            "strong" | "b" => marks.bold = true,
            "em" | "i" => marks.italic = true,
            "u" => marks.underlined = true,
            "code" => marks.code = true,
            "sup" => marks.sup = true,
            "sub" => marks.sub = true,
            "span" => marks.lang = Some(el.attr("lang")?.to_string()),
            _ => return None,
        }
        Some(cx.with_marks(marks).children(el))
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("marks.toggle", "Toggle mark", |editor, args| {
                let mark = arg_str(args.as_ref(), "mark")
                    .ok_or_else(|| CommandError::new("Missing `mark` argument"))?;
                if !MARK_NAMES.contains(&mark) {
                    return Err(CommandError::new(format!("Unknown mark: {mark}")));
                }
                toggle_mark(editor, mark)
            })
            .description("Toggle a formatting mark on the selected text.")
            .keywords(["bold", "italic", "underline", "code", "sup", "sub"])
            .args_example(serde_json::json!({ "mark": "bold" })),
            CommandSpec::new("marks.set_lang", "Set language", |editor, args| {
                let lang = arg_str(args.as_ref(), "lang")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                restyle_selection(editor, "marks.set_lang", &|marks: &mut Marks| {
                    marks.lang = lang.clone();
                })
            })
            .description("Mark the selected text as written in another language.")
            .keywords(["language", "lang"])
            .args_example(serde_json::json!({ "lang": "en" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("marks.active", |editor, _args| {
            serde_json::to_value(active_marks(editor))
                .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
        })]
    }
}

fn active_marks(editor: &Editor) -> Marks {
    editor
        .focus_point()
        .and_then(|point| editor.doc().node(&point.path))
        .and_then(Node::as_text)
        .map(|t| t.marks.clone())
        .unwrap_or_default()
}

fn toggle_mark(editor: &mut Editor, mark: &str) -> Result<(), CommandError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(());
    };
    let covered = covered_leaves(editor, &selection);
    let all_set = !covered.is_empty()
        && covered
            .iter()
            .all(|leaf| leaf.node.marks.get(mark).unwrap_or(false));
    let mark = mark.to_string();
    restyle_selection(editor, "marks.toggle", &move |marks: &mut Marks| {
        marks.set(&mark, !all_set);
    })
}

struct CoveredLeaf {
    path: Path,
    node: TextNode,
    start: usize,
    end: usize,
}

fn ordered_points(sel: &Selection) -> (&Point, &Point) {
    if (&sel.focus.path, sel.focus.offset) < (&sel.anchor.path, sel.anchor.offset) {
        (&sel.focus, &sel.anchor)
    } else {
        (&sel.anchor, &sel.focus)
    }
}

/// Text leaves under the selection with the covered byte range of each.
fn covered_leaves(editor: &Editor, sel: &Selection) -> Vec<CoveredLeaf> {
    fn walk(nodes: &[Node], parent: &[usize], start: &Point, end: &Point, out: &mut Vec<CoveredLeaf>) {
        for (ix, node) in nodes.iter().enumerate() {
            let path = child_path(parent, ix);
            match node {
                Node::Element(el) => walk(&el.children, &path, start, end, out),
                Node::Text(t) => {
                    if path < start.path || path > end.path {
                        continue;
                    }
                    let from = if path == start.path { start.offset } else { 0 };
                    let to = if path == end.path { end.offset } else { t.text.len() };
                    let (from, to) = (from.min(t.text.len()), to.min(t.text.len()));
                    if from < to && t.text.is_char_boundary(from) && t.text.is_char_boundary(to) {
                        out.push(CoveredLeaf {
                            path,
                            node: t.clone(),
                            start: from,
                            end: to,
                        });
                    }
                }
            }
        }
    }

    let (start, end) = ordered_points(sel);
    let mut out = Vec::new();
    walk(&editor.doc().children, &[], start, end, &mut out);
    out
}

/// Splits the covered leaves at the selection edges and rewrites the marks
/// of the covered parts. A collapsed cursor restyles only an empty leaf.
fn restyle_selection(
    editor: &mut Editor,
    source: &str,
    restyle: &dyn Fn(&mut Marks),
) -> Result<(), CommandError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(());
    };

    if selection.is_collapsed() {
        let Some(Node::Text(leaf)) = editor.doc().node(&selection.focus.path) else {
            return Ok(());
        };
        if !leaf.text.is_empty() {
            return Ok(());
        }
        let mut marks = leaf.marks.clone();
        restyle(&mut marks);
        let op = Op::SetTextMarks {
            path: selection.focus.path.clone(),
            marks,
        };
        return editor
            .apply(Transaction::new(vec![op]).source(source))
            .map_err(|err| apply_error(source, err));
    }

    let leaves = covered_leaves(editor, &selection);
    let (Some(first), Some(last)) = (leaves.first(), leaves.last()) else {
        return Ok(());
    };

    // The first leaf gains a node before the last one when it has a prefix
    // and both share a parent.
    let anchor_path = if first.start > 0 {
        next_index(&first.path)
    } else {
        first.path.clone()
    };
    let start_point = Point::new(anchor_path.clone(), 0);
    let end_point = if first.path == last.path {
        Point::new(anchor_path, last.end - last.start)
    } else {
        let mut path = last.path.clone();
        if first.start > 0 && first.path[..first.path.len() - 1] == last.path[..last.path.len() - 1] {
            path = next_index(&path);
        }
        Point::new(path, last.end)
    };

    let mut ops = Vec::new();
    for leaf in leaves.iter().rev() {
        ops.extend(split_and_restyle(leaf, restyle));
    }
    if ops.is_empty() {
        return Ok(());
    }
    let backwards = ordered_points(&selection).0 == &selection.focus;
    let selection_after = if backwards {
        Selection {
            anchor: end_point,
            focus: start_point,
        }
    } else {
        Selection {
            anchor: start_point,
            focus: end_point,
        }
    };
    editor
        .apply(
            Transaction::new(ops)
                .selection_after(selection_after)
                .source(source),
        )
        .map_err(|err| apply_error(source, err))
}

fn next_index(path: &[usize]) -> Path {
    let mut out = path.to_vec();
    if let Some(last) = out.last_mut() {
        *last += 1;
    }
    out
}

fn split_and_restyle(leaf: &CoveredLeaf, restyle: &dyn Fn(&mut Marks)) -> Vec<Op> {
    let text = &leaf.node.text;
    let mut marks = leaf.node.marks.clone();
    restyle(&mut marks);
    if marks == leaf.node.marks {
        return Vec::new();
    }

    let middle = &text[leaf.start..leaf.end];
    let suffix = &text[leaf.end..];
    let mut ops = Vec::new();

    if leaf.start == 0 {
        if !suffix.is_empty() {
            ops.push(Op::RemoveText {
                path: leaf.path.clone(),
                range: leaf.end..text.len(),
            });
        }
        ops.push(Op::SetTextMarks {
            path: leaf.path.clone(),
            marks,
        });
        if !suffix.is_empty() {
            ops.push(Op::InsertNode {
                path: next_index(&leaf.path),
                node: Node::marked_text(suffix, leaf.node.marks.clone()),
            });
        }
        return ops;
    }

    ops.push(Op::RemoveText {
        path: leaf.path.clone(),
        range: leaf.start..text.len(),
    });
    let middle_path = next_index(&leaf.path);
    ops.push(Op::InsertNode {
        path: middle_path.clone(),
        node: Node::marked_text(middle, marks),
    });
    if !suffix.is_empty() {
        ops.push(Op::InsertNode {
            path: next_index(&middle_path),
            node: Node::marked_text(suffix, leaf.node.marks.clone()),
        });
    }
    ops
}
