use crate::core::{DataValue, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::plugin::{ChildConstraint, CommandSpec, EditorPlugin, ElementSpec, Validity};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{between_text_blocks, data_props, embed_data, insert_block, with_data_attrs};

/// A new related-content block starts empty with its article picker open.
pub fn related_node() -> Node {
    let mut el = ElementNode::new("related")
        .with_data("article-ids", Vec::<String>::new())
        .first_edit();
    el.children = vec![Node::text("")];
    el.into_node()
}

fn article_ids(el: &MarkupElement) -> Vec<String> {
    el.children
        .iter()
        .filter_map(|child| match child {
            MarkupNode::Element(embed) if embed.tag == "embed" => embed.attr("data-article-id"),
            _ => None,
        })
        .map(str::to_string)
        .collect()
}

pub struct RelatedPlugin;

impl EditorPlugin for RelatedPlugin {
    fn id(&self) -> &'static str {
        "related"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(
            ElementSpec::block("related", ChildConstraint::None).void(),
        )]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "related").then(|| cx.element("div", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "related" {
            return None;
        }
        let embeds = el
            .data_list("article-ids")
            .unwrap_or_default()
            .iter()
            .map(|id| {
                MarkupElement::new("embed")
                    .with_attr("data-resource", "related-content")
                    .with_attr("data-article-id", id.clone())
                    .into_node()
            })
            .collect();
        let out = MarkupElement::new("div").with_attr("data-type", "related-content");
        Some(
            with_data_attrs(out, &el.data, &["article-ids"])
                .with_children(embeds)
                .into_node(),
        )
    }

    fn deserialize(&self, el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "div" || el.attr("data-type") != Some("related-content") {
            return None;
        }
        let mut data = embed_data(el);
        data.remove("type");
        data.insert("article-ids".to_string(), DataValue::List(article_ids(el)));
        Some(vec![Node::void("related", data)])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "related" {
            return None;
        }
        if el.data_list("article-ids").is_some_and(|ids| !ids.is_empty()) {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid("related content has no articles".to_string()))
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("related.insert", "Insert related content", |editor, _args| {
                insert_block(editor, related_node(), "related.insert").map(|_| ())
            })
            .description("Insert a related-content block and open its article picker.")
            .keywords(["related", "relatert", "articles"]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Editor;
    use crate::plugin::PluginRegistry;

    #[test]
    fn article_ids_come_from_the_child_embeds() {
        let html = r#"<section><p>a</p><div data-type="related-content"><embed data-resource="related-content" data-article-id="1"/><embed data-resource="related-content" data-article-id="2"/></div><p>b</p></section>"#;
        let editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
        let related = editor.doc().element(&[0, 1]).unwrap();
        assert_eq!(related.data_list("article-ids"), Some(&["1".to_string(), "2".to_string()][..]));
        assert_eq!(editor.to_html(), html);
    }

    #[test]
    fn empty_related_block_is_invalid() {
        let registry = PluginRegistry::learning_resource();
        let mut node = related_node();
        if let Node::Element(el) = &mut node {
            el.is_first_edit = false;
        }
        assert!(!registry.validate(node.as_element().unwrap()).is_valid());
    }
}
