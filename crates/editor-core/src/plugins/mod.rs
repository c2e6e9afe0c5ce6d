//! Element plugins and the plugin lists of each authoring context.

use serde_json::Value;

use crate::core::{ApplyError, Data, DataValue, Editor, ElementNode, Node, Point, Selection, first_text_under};
use crate::markup::MarkupElement;
use crate::ops::{Op, Path, Transaction, child_path, next_sibling_path};
use crate::plugin::{CommandError, EditorPlugin, ElementSpec};

pub mod aside;
pub mod details;
pub mod embed;
pub mod footnote;
pub mod grid;
pub mod link;
pub mod list;
pub mod marks;
pub mod related;
pub mod table;
pub mod text;

/// Kinds that count as editable text around structural blocks.
pub const TEXT_BLOCKS: [&str; 4] = ["paragraph", "heading", "list", "quote"];

/// Sections, paragraphs, headings and marks.
pub fn core_plugins() -> Vec<Box<dyn EditorPlugin>> {
    vec![
        Box::new(text::SectionPlugin),
        Box::new(text::HeadingPlugin),
        Box::new(marks::MarksPlugin),
    ]
}

pub fn learning_resource_plugins() -> Vec<Box<dyn EditorPlugin>> {
    let mut plugins = core_plugins();
    plugins.extend::<Vec<Box<dyn EditorPlugin>>>(vec![
        Box::new(text::QuotePlugin),
        Box::new(text::DividerPlugin),
        Box::new(list::ListPlugin),
        Box::new(link::LinkPlugin),
        Box::new(link::ContentLinkPlugin),
        Box::new(footnote::FootnotePlugin),
        Box::new(embed::EmbedPlugin),
        Box::new(embed::CodeBlockPlugin),
        Box::new(table::TablePlugin),
        Box::new(details::DetailsPlugin),
        Box::new(aside::AsidePlugin),
        Box::new(aside::BodyboxPlugin),
        Box::new(grid::GridPlugin),
        Box::new(related::RelatedPlugin),
    ]);
    plugins
}

/// Topic articles carry no grids, boxes, asides or related content.
pub fn topic_article_plugins() -> Vec<Box<dyn EditorPlugin>> {
    let mut plugins = core_plugins();
    plugins.extend::<Vec<Box<dyn EditorPlugin>>>(vec![
        Box::new(text::QuotePlugin),
        Box::new(text::DividerPlugin),
        Box::new(list::ListPlugin),
        Box::new(link::LinkPlugin),
        Box::new(link::ContentLinkPlugin),
        Box::new(footnote::FootnotePlugin),
        Box::new(embed::EmbedPlugin),
        Box::new(embed::CodeBlockPlugin),
        Box::new(table::TablePlugin),
        Box::new(details::DetailsPlugin),
    ]);
    plugins
}

pub fn frontpage_article_plugins() -> Vec<Box<dyn EditorPlugin>> {
    let mut plugins = core_plugins();
    plugins.extend::<Vec<Box<dyn EditorPlugin>>>(vec![
        Box::new(text::DividerPlugin),
        Box::new(list::ListPlugin),
        Box::new(link::LinkPlugin),
        Box::new(embed::EmbedPlugin),
        Box::new(aside::BodyboxPlugin),
        Box::new(grid::GridPlugin),
    ]);
    plugins
}

/// Adds the rule that keeps an editable text block on both sides.
pub(crate) fn between_text_blocks(spec: ElementSpec) -> ElementSpec {
    spec.previous(&TEXT_BLOCKS, "paragraph")
        .next(&TEXT_BLOCKS, "paragraph")
}

pub(crate) fn arg_str<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a str> {
    args?.get(key)?.as_str()
}

pub(crate) fn arg_u64(args: Option<&Value>, key: &str) -> Option<u64> {
    args?.get(key)?.as_u64()
}

pub(crate) fn arg_bool(args: Option<&Value>, key: &str) -> Option<bool> {
    args?.get(key)?.as_bool()
}

/// Data fields from a JSON object; arrays of strings become lists.
pub(crate) fn arg_data(args: Option<&Value>, key: &str) -> Data {
    let Some(Value::Object(map)) = args.and_then(|a| a.get(key)) else {
        return Data::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::String(s) => DataValue::Str(s.clone()),
                Value::Array(items) => DataValue::List(
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                ),
                Value::Number(n) => DataValue::Str(n.to_string()),
                Value::Bool(b) => DataValue::Str(b.to_string()),
                _ => return None,
            };
            Some((k.clone(), value))
        })
        .collect()
}

pub(crate) fn apply_error(action: &str, err: ApplyError) -> CommandError {
    CommandError::new(format!("Failed to {action}: {err}"))
}

pub(crate) fn apply_ops(editor: &mut Editor, ops: Vec<Op>, source: &str) -> Result<(), CommandError> {
    if ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(Transaction::new(ops).source(source))
        .map_err(|err| apply_error(source, err))
}

/// Nearest block element around the cursor.
pub(crate) fn current_block_path(editor: &Editor) -> Option<Path> {
    let point = editor.focus_point()?;
    editor.block_path_at(&point.path)
}

pub(crate) fn is_empty_paragraph(el: &ElementNode) -> bool {
    el.kind == "paragraph" && matches!(el.children.as_slice(), [Node::Text(t)] if t.text.is_empty())
}

pub(crate) fn select_start_of(editor: &mut Editor, path: &[usize]) {
    let point = editor
        .doc()
        .children_at(path)
        .and_then(|children| first_text_under(children, &mut path.to_vec()));
    if let Some(point) = point {
        editor.set_selection(Selection::collapsed(point));
    }
}

/// Inserts a block after the cursor's block, or in place of it when that
/// block is an empty paragraph, and moves the cursor into the new block.
/// Returns the block's path after normalization.
pub(crate) fn insert_block(editor: &mut Editor, node: Node, source: &str) -> Result<Path, CommandError> {
    let block = current_block_path(editor)
        .ok_or_else(|| CommandError::new("No block at the selection"))?;
    let replace = editor.doc().element(&block).is_some_and(is_empty_paragraph);

    let mut ops = Vec::new();
    let at = if replace {
        ops.push(Op::RemoveNode {
            path: block.clone(),
        });
        block
    } else {
        next_sibling_path(&block).ok_or_else(|| CommandError::new("Block has no parent"))?
    };
    ops.push(Op::InsertNode {
        path: at.clone(),
        node,
    });

    let mut guard = editor.pause_normalizing();
    guard
        .apply(Transaction::new(ops).source(source))
        .map_err(|err| apply_error(source, err))?;
    let tracked = guard.path_ref(at);
    guard.finish().map_err(|err| apply_error(source, err))?;

    let path = editor
        .unref(tracked)
        .ok_or_else(|| CommandError::new("Inserted block was normalized away"))?;
    select_start_of(editor, &path);
    Ok(path)
}

/// Splits the text leaf under the cursor and puts `node` between the two
/// halves. The cursor ends up right after the inserted node.
pub(crate) fn insert_inline(editor: &mut Editor, node: Node, source: &str) -> Result<Path, CommandError> {
    let point = editor
        .focus_point()
        .cloned()
        .ok_or_else(|| CommandError::new("No cursor"))?;
    let Some(Node::Text(leaf)) = editor.doc().node(&point.path) else {
        return Err(CommandError::new("Cursor is not in text"));
    };
    let offset = point.offset.min(leaf.text.len());
    if !leaf.text.is_char_boundary(offset) {
        return Err(CommandError::new("Cursor is inside a character"));
    }
    let suffix = Node::marked_text(&leaf.text[offset..], leaf.marks.clone());
    let len = leaf.text.len();

    let at = next_sibling_path(&point.path).ok_or_else(|| CommandError::new("Text has no parent"))?;
    let after = next_sibling_path(&at).ok_or_else(|| CommandError::new("Text has no parent"))?;
    let mut ops = Vec::new();
    if offset < len {
        ops.push(Op::RemoveText {
            path: point.path.clone(),
            range: offset..len,
        });
    }
    ops.push(Op::InsertNode { path: at.clone(), node });
    ops.push(Op::InsertNode {
        path: after.clone(),
        node: suffix,
    });

    let mut guard = editor.pause_normalizing();
    guard
        .apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(Point::new(after, 0)))
                .source(source),
        )
        .map_err(|err| apply_error(source, err))?;
    let tracked = guard.path_ref(at);
    guard.finish().map_err(|err| apply_error(source, err))?;
    editor
        .unref(tracked)
        .ok_or_else(|| CommandError::new("Inserted node was normalized away"))
}

/// Wraps the selected part of a single text leaf in `wrapper` and selects
/// the wrapped text.
pub(crate) fn wrap_selection_inline(
    editor: &mut Editor,
    wrapper: ElementNode,
    source: &str,
) -> Result<(), CommandError> {
    let selection = editor
        .selection()
        .cloned()
        .ok_or_else(|| CommandError::new("No selection"))?;
    if selection.anchor.path != selection.focus.path {
        return Err(CommandError::new("Selection must stay within one text"));
    }
    let path = selection.focus.path.clone();
    let Some(Node::Text(leaf)) = editor.doc().node(&path) else {
        return Err(CommandError::new("Selection is not in text"));
    };
    let len = leaf.text.len();
    let start = selection.anchor.offset.min(selection.focus.offset).min(len);
    let end = selection.anchor.offset.max(selection.focus.offset).min(len);
    if !leaf.text.is_char_boundary(start) || !leaf.text.is_char_boundary(end) {
        return Err(CommandError::new("Selection is inside a character"));
    }
    let middle = &leaf.text[start..end];
    let inner = Node::marked_text(middle, leaf.marks.clone());
    let suffix = Node::marked_text(&leaf.text[end..], leaf.marks.clone());
    let middle_len = middle.len();

    let at = next_sibling_path(&path).ok_or_else(|| CommandError::new("Text has no parent"))?;
    let after = next_sibling_path(&at).ok_or_else(|| CommandError::new("Text has no parent"))?;
    let mut inner_path = at.clone();
    inner_path.push(0);

    let tx = Transaction::new(vec![
        Op::RemoveText {
            path,
            range: start..len,
        },
        Op::InsertNode {
            path: at,
            node: wrapper.with_children(vec![inner]).into_node(),
        },
        Op::InsertNode { path: after, node: suffix },
    ])
    .selection_after(Selection {
        anchor: Point::new(inner_path.clone(), 0),
        focus: Point::new(inner_path, middle_len),
    })
    .source(source);
    editor.apply(tx).map_err(|err| apply_error(source, err))
}

/// Replaces the inline element at `path` with its children, keeping the
/// cursor on the same text.
pub(crate) fn unwrap_inline(editor: &mut Editor, path: Path, source: &str) -> Result<(), CommandError> {
    let Some(el) = editor.doc().element(&path) else {
        return Ok(());
    };
    let children = el.children.clone();
    let Some((&ix, parent)) = path.split_last() else {
        return Ok(());
    };

    let selection_after = editor.focus_point().and_then(|point| {
        let rest = point.path.strip_prefix(path.as_slice())?;
        let (&child, tail) = rest.split_first()?;
        let mut moved = child_path(parent, ix + child);
        moved.extend_from_slice(tail);
        Some(Selection::collapsed(Point::new(moved, point.offset)))
    });

    let mut ops = vec![Op::RemoveNode { path: path.clone() }];
    ops.extend(children.into_iter().enumerate().map(|(offset, node)| Op::InsertNode {
        path: child_path(parent, ix + offset),
        node,
    }));
    let mut tx = Transaction::new(ops).source(source);
    if let Some(selection) = selection_after {
        tx = tx.selection_after(selection);
    }
    editor.apply(tx).map_err(|err| apply_error(source, err))
}

/// Fields written as `;`-separated lists on the wire.
pub(crate) const LIST_FIELDS: [&str; 1] = ["authors"];

/// Attribute text for a data field. Lists outside [`LIST_FIELDS`] are
/// written as JSON arrays, and strings that would read back as something
/// else are written as JSON strings, so [`decode_value`] gets back the
/// exact value.
pub(crate) fn encode_value(key: &str, value: &DataValue) -> String {
    let list_field = LIST_FIELDS.contains(&key);
    match value {
        DataValue::List(items)
            if list_field && !items.is_empty() && items.iter().all(|item| is_plain_list_item(item)) =>
        {
            items.join(";")
        }
        DataValue::List(items) => Value::from(items.clone()).to_string(),
        DataValue::Str(s) if list_field || s.starts_with(['[', '"']) => Value::from(s.as_str()).to_string(),
        DataValue::Str(s) => s.clone(),
    }
}

fn is_plain_list_item(item: &str) -> bool {
    !item.is_empty() && item.trim() == item && !item.contains(';') && !item.starts_with(['[', '"'])
}

pub(crate) fn decode_value(key: &str, raw: &str) -> DataValue {
    if raw.starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<String>>(raw)
    {
        return DataValue::List(items);
    }
    if raw.starts_with('"')
        && let Ok(s) = serde_json::from_str::<String>(raw)
    {
        return DataValue::Str(s);
    }
    if LIST_FIELDS.contains(&key) {
        return DataValue::List(
            raw.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }
    DataValue::Str(raw.to_string())
}

/// Wire form of an embed: `data-resource` first, then `order`, then the
/// remaining fields alphabetically.
pub(crate) fn embed_markup(resource: &str, data: &Data, order: &[&str]) -> MarkupElement {
    let out = MarkupElement::new("embed").with_attr("data-resource", resource);
    let ordered = order.iter().filter_map(|key| data.get_key_value(*key));
    let rest = data
        .iter()
        .filter(|(key, _)| key.as_str() != "resource" && !order.contains(&key.as_str()));
    write_data_attrs(out, ordered.chain(rest))
}

/// `data-*` attributes of `el` with the prefix stripped.
pub(crate) fn embed_data(el: &MarkupElement) -> Data {
    el.attrs
        .iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix("data-")?;
            Some((key.to_string(), decode_value(key, value)))
        })
        .collect()
}

/// Writes every field except `skip` back as a `data-*` attribute.
pub(crate) fn with_data_attrs(out: MarkupElement, data: &Data, skip: &[&str]) -> MarkupElement {
    write_data_attrs(out, data.iter().filter(|(key, _)| !skip.contains(&key.as_str())))
}

fn write_data_attrs<'a>(
    mut out: MarkupElement,
    fields: impl Iterator<Item = (&'a String, &'a DataValue)>,
) -> MarkupElement {
    for (key, value) in fields {
        out.set_attr(format!("data-{key}"), encode_value(key, value));
    }
    out
}

/// Every attribute of `el` as a field, names kept as they are.
pub(crate) fn attr_data(el: &MarkupElement) -> Data {
    el.attrs
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(name, value)))
        .collect()
}

/// Data fields as render props, lists joined with `;`.
pub(crate) fn data_props(el: &ElementNode) -> Vec<(String, String)> {
    el.data
        .iter()
        .map(|(key, value)| {
            let text = match value {
                DataValue::Str(s) => s.clone(),
                DataValue::List(items) => items.join(";"),
            };
            (key.clone(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_attributes_follow_declared_order() {
        let data: Data = [
            ("title", "t"),
            ("alt", "a"),
            ("resource_id", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), DataValue::from(v)))
        .collect();
        let html = embed_markup("image", &data, &["resource_id"]).into_node().to_html();
        assert_eq!(
            html,
            r#"<embed data-resource="image" data-resource_id="1" data-alt="a" data-title="t"/>"#
        );
    }

    #[test]
    fn list_fields_split_on_semicolon() {
        let el = MarkupElement::new("embed").with_attr("data-authors", "Ola; Kari");
        let data = embed_data(&el);
        assert_eq!(
            data.get("authors"),
            Some(&DataValue::List(vec!["Ola".into(), "Kari".into()]))
        );
    }

    #[test]
    fn encoded_values_read_back_unchanged() {
        let cases = [
            ("tags", DataValue::List(vec!["x".into(), "y".into()])),
            ("tags", DataValue::List(Vec::new())),
            ("caption", DataValue::Str("[not a list]".into())),
            ("caption", DataValue::Str(r#"["x"]"#.into())),
            ("caption", DataValue::Str(r#""sitat""#.into())),
            ("caption", DataValue::Str("a;b".into())),
            ("authors", DataValue::List(vec!["Ola".into(), "Kari".into()])),
            ("authors", DataValue::List(vec!["Ola; Kari".into()])),
            ("authors", DataValue::List(Vec::new())),
            ("authors", DataValue::Str("Ola".into())),
        ];
        for (key, value) in cases {
            let raw = encode_value(key, &value);
            assert_eq!(decode_value(key, &raw), value, "{key} as {raw}");
        }
        assert_eq!(
            encode_value("authors", &DataValue::List(vec!["Ola".into(), "Kari".into()])),
            "Ola;Kari"
        );
        assert_eq!(encode_value("tags", &DataValue::List(vec!["x".into()])), r#"["x"]"#);
    }
}
