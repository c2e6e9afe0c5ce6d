use serde_json::{Value, json};

use crate::core::{AttrPatch, Editor, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::ops::{Op, Path};
use crate::plugin::{CommandError, CommandSpec, EditorPlugin, ElementSpec, QuerySpec, Validity};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{
    apply_ops, arg_str, attr_data, data_props, embed_data, embed_markup, encode_value, insert_inline,
    unwrap_inline, wrap_selection_inline,
};

const LINK_KINDS: [&str; 2] = ["link", "content-link"];
const CONTENT_LINK_FIELDS: [&str; 2] = ["content-id", "open-in"];

fn enclosing_link(editor: &Editor) -> Option<(Path, &ElementNode)> {
    let point = editor.focus_point()?;
    editor
        .doc()
        .ancestors(&point.path)
        .into_iter()
        .find(|(_, el)| LINK_KINDS.contains(&el.kind.as_str()))
}

/// Wraps the selection in `link`, inserts it with `text` at a collapsed
/// cursor, or updates the data of the link around the cursor.
fn insert_link(editor: &mut Editor, link: ElementNode, text: &str, source: &str) -> Result<(), CommandError> {
    if let Some((path, current)) = enclosing_link(editor)
        && current.kind == link.kind
    {
        let patch = link
            .data
            .into_iter()
            .fold(AttrPatch::default(), |patch, (key, value)| patch.and_set(key, value));
        return apply_ops(editor, vec![Op::SetNodeAttrs { path, patch }], source);
    }

    let collapsed = editor.selection().is_none_or(|sel| sel.is_collapsed());
    if collapsed {
        let node = link.with_children(vec![Node::text(text)]).into_node();
        return insert_inline(editor, node, source).map(|_| ());
    }
    wrap_selection_inline(editor, link, source)
}

pub struct LinkPlugin;

impl EditorPlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![ElementSpec::inline("link")]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "link").then(|| cx.element("a", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "link" {
            return None;
        }
        let mut out = MarkupElement::new("a");
        let href = el.data.get_key_value("href");
        for (key, value) in href.into_iter().chain(el.data.iter().filter(|(key, _)| key.as_str() != "href")) {
            out.set_attr(key.clone(), encode_value(key, value));
        }
        Some(out.with_children(cx.children(el)).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "a" {
            return None;
        }
        Some(vec![
            ElementNode::new("link")
                .with_data_map(attr_data(el))
                .with_children(cx.children(el))
                .into_node(),
        ])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "link" {
            return None;
        }
        if el.data_str("href").is_some_and(|h| !h.trim().is_empty()) {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid("link is missing href".to_string()))
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("link.insert", "Insert link", |editor, args| {
                let href = arg_str(args.as_ref(), "href")
                    .filter(|h| !h.trim().is_empty())
                    .ok_or_else(|| CommandError::new("Missing `href` argument"))?;
                let mut link = ElementNode::new("link").with_data("href", href);
                for key in ["target", "rel"] {
                    if let Some(value) = arg_str(args.as_ref(), key) {
                        link = link.with_data(key, value);
                    }
                }
                let text = arg_str(args.as_ref(), "text").unwrap_or(href);
                insert_link(editor, link, text, "link.insert")
            })
            .description("Link the selected text, or insert a link at the cursor.")
            .keywords(["link", "lenke", "url", "href"])
            .args_example(json!({ "href": "https://ndla.no", "target": "_blank" })),
            CommandSpec::new("link.unset", "Remove link", |editor, _args| {
                let Some((path, _)) = enclosing_link(editor) else {
                    return Ok(());
                };
                unwrap_inline(editor, path, "link.unset")
            })
            .description("Remove the link around the cursor, keeping its text.")
            .keywords(["link", "unlink"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("link.active", |editor, _args| {
            Ok(enclosing_link(editor).map_or(Value::Null, |(_, el)| json!({ "kind": el.kind, "data": el.data })))
        })]
    }
}

pub struct ContentLinkPlugin;

impl EditorPlugin for ContentLinkPlugin {
    fn id(&self) -> &'static str {
        "content-link"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![ElementSpec::inline("content-link")]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "content-link").then(|| cx.element("a", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "content-link").then(|| {
            embed_markup("content-link", &el.data, &CONTENT_LINK_FIELDS)
                .with_children(cx.children(el))
                .into_node()
        })
    }

    fn deserialize(&self, el: &MarkupElement, cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "embed" || el.attr("data-resource") != Some("content-link") {
            return None;
        }
        let mut data = embed_data(el);
        data.remove("resource");
        Some(vec![
            ElementNode::new("content-link")
                .with_data_map(data)
                .with_children(cx.children(el))
                .into_node(),
        ])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "content-link" {
            return None;
        }
        if el.data_str("content-id").is_some_and(|id| !id.trim().is_empty()) {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid("content link is missing content-id".to_string()))
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("content_link.insert", "Insert content link", |editor, args| {
                let content_id = arg_str(args.as_ref(), "content-id")
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| CommandError::new("Missing `content-id` argument"))?;
                let mut link = ElementNode::new("content-link").with_data("content-id", content_id);
                if let Some(open_in) = arg_str(args.as_ref(), "open-in") {
                    link = link.with_data("open-in", open_in);
                }
                let text = arg_str(args.as_ref(), "text").unwrap_or(content_id);
                insert_link(editor, link, text, "content_link.insert")
            })
            .description("Link the selected text to another NDLA article.")
            .keywords(["link", "article", "innhold"])
            .args_example(json!({ "content-id": "123", "open-in": "new-context" })),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Point, Selection};
    use crate::plugin::PluginRegistry;

    fn editor(html: &str) -> Editor {
        Editor::from_html(html, PluginRegistry::learning_resource()).unwrap()
    }

    #[test]
    fn selected_text_is_wrapped_and_unwrapped() {
        let mut editor = editor("<section><p>les mer her</p></section>");
        editor.set_selection(Selection {
            anchor: Point::new(vec![0, 0, 0], 4),
            focus: Point::new(vec![0, 0, 0], 7),
        });
        editor
            .run_command("link.insert", Some(json!({ "href": "https://ndla.no" })))
            .unwrap();
        assert_eq!(
            editor.to_html(),
            r#"<section><p>les <a href="https://ndla.no">mer</a> her</p></section>"#
        );

        editor.run_command("link.unset", None).unwrap();
        assert_eq!(editor.to_html(), "<section><p>les mer her</p></section>");
    }

    #[test]
    fn content_links_keep_their_text() {
        let html = r#"<section><p>se <embed data-resource="content-link" data-content-id="42" data-open-in="new-context">artikkel</embed></p></section>"#;
        let editor = editor(html);
        let link = editor.doc().element(&[0, 0, 1]).unwrap();
        assert_eq!(link.kind, "content-link");
        assert_eq!(editor.to_html(), html);
    }

    #[test]
    fn collapsed_cursor_inserts_link_text() {
        let mut editor = editor("<section><p>ab</p></section>");
        editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0], 1)));
        editor
            .run_command("link.insert", Some(json!({ "href": "https://ndla.no", "text": "x" })))
            .unwrap();
        assert_eq!(
            editor.to_html(),
            r#"<section><p>a<a href="https://ndla.no">x</a>b</p></section>"#
        );
    }
}
