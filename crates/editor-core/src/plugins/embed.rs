//! Media embeds and code blocks. Both are void blocks written as
//! `<embed data-resource=…/>`; the resource decides which fields are
//! required and in what order they are written.

use serde_json::json;

use crate::core::{Data, DataValue, ElementNode, Node};
use crate::markup::{MarkupElement, MarkupNode};
use crate::plugin::{ChildConstraint, CommandSpec, EditorPlugin, ElementSpec, Validity};
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

use super::{arg_data, between_text_blocks, data_props, embed_data, embed_markup, insert_block, with_data_attrs};

pub const EMBED_RESOURCES: [&str; 8] = [
    "image",
    "audio",
    "video",
    "brightcove",
    "h5p",
    "external",
    "iframe",
    "file",
];

/// Embed resources claimed by other plugins.
const RESERVED_RESOURCES: [&str; 4] = ["code-block", "footnote", "content-link", "related-content"];

pub const CODE_BLOCK_FIELDS: [&str; 3] = ["code-content", "code-format", "title"];

fn field_order(resource: &str) -> &'static [&'static str] {
    match resource {
        "image" => &["resource_id", "size", "align", "alt", "caption", "url"],
        "audio" => &["resource_id", "type", "url"],
        "brightcove" => &["videoid", "caption", "account", "player", "title"],
        "video" => &["url", "caption", "title"],
        "h5p" => &["path", "url", "title"],
        "external" | "iframe" => &["url", "type", "width", "height", "title"],
        "file" => &["path", "type", "title", "url"],
        _ => &[],
    }
}

/// Any one of these fields must be present and non-empty.
fn required_fields(resource: &str) -> Option<&'static [&'static str]> {
    match resource {
        "image" | "audio" => Some(&["resource_id"]),
        "brightcove" => Some(&["videoid"]),
        "video" | "external" | "iframe" => Some(&["url"]),
        "h5p" => Some(&["path", "url"]),
        "file" => Some(&["path"]),
        _ => None,
    }
}

fn has_field(el: &ElementNode, key: &str) -> bool {
    match el.data.get(key) {
        Some(DataValue::Str(s)) => !s.trim().is_empty(),
        Some(DataValue::List(items)) => !items.is_empty(),
        None => false,
    }
}

pub fn embed_node(resource: &str, data: Data) -> Node {
    let mut data = data;
    data.insert("resource".to_string(), resource.into());
    Node::void("embed", data)
}

pub struct EmbedPlugin;

impl EditorPlugin for EmbedPlugin {
    fn id(&self) -> &'static str {
        "embed"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(
            ElementSpec::block("embed", ChildConstraint::None).void(),
        )]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "embed").then(|| cx.element("figure", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        if el.kind != "embed" {
            return None;
        }
        let out = match el.data_str("resource") {
            Some(resource) => embed_markup(resource, &el.data, field_order(resource)),
            None => with_data_attrs(MarkupElement::new("embed"), &el.data, &[]),
        };
        Some(out.into_node())
    }

    fn deserialize(&self, el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "embed" {
            return None;
        }
        if el.attr("data-resource").is_some_and(|r| RESERVED_RESOURCES.contains(&r)) {
            return None;
        }
        Some(vec![Node::void("embed", embed_data(el))])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "embed" {
            return None;
        }
        let resource = el.data_str("resource").unwrap_or_default();
        let Some(required) = required_fields(resource) else {
            return Some(Validity::Invalid(format!("unsupported embed resource `{resource}`")));
        };
        if required.iter().any(|key| has_field(el, key)) {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid(format!(
                "{resource} embed is missing {}",
                required.join(" or ")
            )))
        }
    }
}

/// A new code block opens its edit form first.
pub fn code_block_node() -> Node {
    code_block_with(Data::new())
}

fn code_block_with(data: Data) -> Node {
    let mut el = ElementNode::new("code-block")
        .with_data("code-content", "")
        .with_data("code-format", "text")
        .with_data_map(data)
        .first_edit();
    el.children = vec![Node::text("")];
    el.into_node()
}

pub struct CodeBlockPlugin;

impl EditorPlugin for CodeBlockPlugin {
    fn id(&self) -> &'static str {
        "code-block"
    }

    fn element_specs(&self) -> Vec<ElementSpec> {
        vec![between_text_blocks(
            ElementSpec::block("code-block", ChildConstraint::None).void(),
        )]
    }

    fn render(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        (el.kind == "code-block").then(|| cx.element("pre", el, data_props(el)))
    }

    fn serialize(&self, el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        (el.kind == "code-block")
            .then(|| embed_markup("code-block", &el.data, &CODE_BLOCK_FIELDS).into_node())
    }

    fn deserialize(&self, el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        if el.tag != "embed" || el.attr("data-resource") != Some("code-block") {
            return None;
        }
        let mut data = embed_data(el);
        data.remove("resource");
        Some(vec![Node::void("code-block", data)])
    }

    fn validate(&self, el: &ElementNode) -> Option<Validity> {
        if el.kind != "code-block" {
            return None;
        }
        if has_field(el, "code-format") {
            Some(Validity::Valid)
        } else {
            Some(Validity::Invalid("code block is missing code-format".to_string()))
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("code_block.insert", "Insert code block", |editor, args| {
                let data = arg_data(args.as_ref(), "data");
                insert_block(editor, code_block_with(data), "code_block.insert").map(|_| ())
            })
            .description("Insert a code block and open its edit form.")
            .keywords(["code", "kode", "snippet"])
            .args_example(json!({ "data": { "code-format": "python" } })),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;

    #[test]
    fn embeds_are_validated_per_resource() {
        let registry = PluginRegistry::learning_resource();
        let image = embed_node("image", Data::from([("resource_id".to_string(), "12".into())]));
        assert!(registry.validate(image.as_element().unwrap()).is_valid());

        let h5p = embed_node("h5p", Data::from([("url".to_string(), "https://h5p.ndla.no/1".into())]));
        assert!(registry.validate(h5p.as_element().unwrap()).is_valid());

        let bare = embed_node("brightcove", Data::new());
        assert!(!registry.validate(bare.as_element().unwrap()).is_valid());

        let unknown = embed_node("hologram", Data::new());
        assert!(!registry.validate(unknown.as_element().unwrap()).is_valid());
    }

    #[test]
    fn code_block_without_format_is_invalid() {
        let registry = PluginRegistry::learning_resource();
        let mut node = code_block_node();
        if let Node::Element(el) = &mut node {
            el.data.remove("code-format");
        }
        assert!(!registry.validate(node.as_element().unwrap()).is_valid());
    }

    #[test]
    fn new_code_blocks_open_their_form() {
        let node = code_block_node();
        assert!(node.is_first_edit());
        assert_eq!(node.as_element().unwrap().data_str("code-format"), Some("text"));
    }
}
