use serde_json::json;

use crate::core::{Data, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::plugin::{CommandSpec, EditorPlugin, ElementSpec, Validity};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{arg_data, data_props, embed_data, embed_markup, insert_inline};

const FOOTNOTE_FIELDS: [&str; 6] = ["title", "year", "authors", "edition", "publisher", "url"];

pub fn footnote_node(data: Data) -> Node {
    let mut el = ElementNode::new("footnote").with_data_map(data).first_edit();
    el.children = vec![Node::text("")];
    el.into_node()
}

pub struct FootnotePlugin;

impl EditorPlugin for FootnotePlugin {
    fn id(&self) -> &'static str {
        "footnote"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![ElementSpec::inline("footnote").void()]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "footnote").then(|| cx.element("sup", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "footnote").then(|| embed_markup("footnote", &el.data, &FOOTNOTE_FIELDS).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "embed" || el.attr("data-resource") != Some("footnote") {
            return None;
        }
        let mut data = embed_data(el);
        data.remove("resource");
        Some(vec![Node::void("footnote", data)])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "footnote" {
            return None;
        }
        if el.data_str("title").is_some_and(|t| !t.trim().is_empty()) {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid("footnote is missing a title".to_string()))
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("footnote.insert", "Insert footnote", |editor, args| {
                let data = arg_data(args.as_ref(), "data");
                insert_inline(editor, footnote_node(data), "footnote.insert").map(|_| ())
            })
            .description("Insert a footnote at the cursor and open its edit form.")
            .keywords(["footnote", "fotnote", "source", "kilde"])
            .args_example(json!({ "data": { "title": "Tittel", "authors": ["Ola Nordmann"] } })),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Editor, Point, Selection};
    use crate::plugin::PluginRegistry;

    #[test]
    fn authors_round_trip_as_a_list() {
        let html = r#"<section><p>a<embed data-resource="footnote" data-title="Bok" data-year="2020" data-authors="Ola;Kari"/>b</p></section>"#;
        let editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
        let footnote = editor.doc().element(&[0, 0, 1]).unwrap();
        assert_eq!(footnote.data_list("authors"), Some(&["Ola".to_string(), "Kari".to_string()][..]));
        assert_eq!(editor.to_html(), html);
    }

    #[test]
    fn insert_splits_the_text_at_the_cursor() {
        let mut editor = Editor::from_html("<section><p>abcd</p></section>", PluginRegistry::learning_resource()).unwrap();
        editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0], 2)));
        editor
            .run_command("footnote.insert", Some(json!({ "data": { "title": "T" } })))
            .unwrap();
        let paragraph = editor.doc().element(&[0, 0]).unwrap();
        assert_eq!(paragraph.children.len(), 3);
        assert!(paragraph.children[1].is_kind("footnote"));
        assert!(paragraph.children[1].is_first_edit());
        assert_eq!(paragraph.children[2].text_content(), "cd");
    }
}
