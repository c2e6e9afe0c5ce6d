use serde::Serialize;
use thiserror::Error;

use crate::config::EditorConfig;
use crate::core::{ApplyError, Document, Editor, ElementNode, Marks, Node, TextNode};
use crate::markup::{MarkupElement, MarkupError, MarkupNode, parse_markup, write_markup};
use crate::normalize::normalize_document;
use crate::ops::Path;
use crate::plugin::{ChildConstraint, PluginRegistry, Validity};

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("deserialized document did not normalize: {0}")]
    Normalize(#[from] ApplyError),
}

/// Tags whose children are kept when no plugin claims the tag.
const UNWRAP_TAGS: [&str; 5] = ["span", "b", "i", "font", "div"];

pub const STRIPPED_LABEL: &str = "will be deleted on save";

pub struct SerializeContext<'a> {
    pub registry: &'a PluginRegistry,
}

impl SerializeContext<'_> {
    pub fn children(&self, el: &ElementNode) -> Vec<MarkupNode> {
        serialize_nodes(&el.children, self)
    }
}

pub struct DeserializeContext<'a> {
    pub registry: &'a PluginRegistry,
    /// Marks inherited from enclosing formatting tags.
    pub marks: Marks,
}

impl<'a> DeserializeContext<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self {
            registry,
            marks: Marks::default(),
        }
    }

    pub fn children(&self, el: &MarkupElement) -> Vec<Node> {
        deserialize_nodes(&el.children, self)
    }

    pub fn with_marks(&self, marks: Marks) -> DeserializeContext<'a> {
        DeserializeContext {
            registry: self.registry,
            marks,
        }
    }
}

pub fn serialize(doc: &Document, registry: &PluginRegistry) -> String {
    let cx = SerializeContext { registry };
    write_markup(&serialize_nodes(&doc.children, &cx))
}

fn serialize_nodes(nodes: &[Node], cx: &SerializeContext<'_>) -> Vec<MarkupNode> {
    nodes
        .iter()
        .filter_map(|node| match node {
            Node::Text(t) => text_markup(t),
            Node::Element(el) => {
                let out = cx.registry.serialize_element(el, cx);
                if out.is_none() {
                    tracing::warn!(
                        target: "ndla_editor::serialize",
                        kind = %el.kind,
                        "no serializer for element, dropping it"
                    );
                }
                out
            }
        })
        .collect()
}

fn text_markup(t: &TextNode) -> Option<MarkupNode> {
    if t.text.is_empty() {
        return None;
    }
    let marks = &t.marks;
    let mut node = MarkupNode::text(t.text.clone());
    let wrappers = [
        (marks.sub, "sub"),
        (marks.sup, "sup"),
        (marks.code, "code"),
        (marks.underlined, "u"),
        (marks.italic, "em"),
        (marks.bold, "strong"),
    ];
    for (on, tag) in wrappers {
        if on {
            node = MarkupElement::new(tag).with_children(vec![node]).into_node();
        }
    }
    if let Some(lang) = &marks.lang {
        node = MarkupElement::new("span")
            .with_attr("lang", lang.clone())
            .with_children(vec![node])
            .into_node();
    }
    Some(node)
}

/// Parses wire markup into a normalized document.
pub fn deserialize(html: &str, registry: &PluginRegistry) -> Result<Document, SerializeError> {
    let markup = parse_markup(html)?;
    let cx = DeserializeContext::new(registry);
    let mut children = deserialize_nodes(&markup, &cx);
    children.retain(|node| !is_whitespace_text(node));

    let mut doc = Document::new(children);
    let max = EditorConfig::default().max_normalize_iterations;
    normalize_document(&mut doc, &mut None, registry, max)?;
    Ok(doc)
}

fn deserialize_nodes(nodes: &[MarkupNode], cx: &DeserializeContext<'_>) -> Vec<Node> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push(Node::marked_text(text.clone(), cx.marks.clone())),
            MarkupNode::Element(el) if el.tag == "ndlaembed" => {
                let mut aliased = el.clone();
                aliased.tag = "embed".to_string();
                out.extend(deserialize_element(&aliased, cx));
            }
            MarkupNode::Element(el) => out.extend(deserialize_element(el, cx)),
        }
    }
    out
}

fn deserialize_element(el: &MarkupElement, cx: &DeserializeContext<'_>) -> Vec<Node> {
    if let Some(mut nodes) = cx.registry.deserialize_element(el, cx) {
        for node in &mut nodes {
            drop_block_whitespace(node, cx.registry);
        }
        return nodes;
    }
    if UNWRAP_TAGS.contains(&el.tag.as_str()) {
        return cx.children(el);
    }
    if el.tag != "br" {
        tracing::warn!(
            target: "ndla_editor::serialize",
            tag = %el.tag,
            "unrecognised tag dropped"
        );
    }
    Vec::new()
}

fn drop_block_whitespace(node: &mut Node, registry: &PluginRegistry) {
    let Node::Element(el) = node else {
        return;
    };
    if registry.child_constraint(&el.kind) == ChildConstraint::BlockOnly {
        el.children.retain(|child| !is_whitespace_text(child));
    }
}

fn is_whitespace_text(node: &Node) -> bool {
    matches!(node, Node::Text(t) if t.text.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrippedElement {
    pub kind: String,
    pub path: Path,
    pub label: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutput {
    pub html: String,
    pub stripped: Vec<StrippedElement>,
}

/// Serializes `doc` for the draft API after removing every element that is
/// still in an error state. Text inside a removed element moves into its
/// parent; the element's data is discarded.
pub fn serialize_for_save(doc: &Document, registry: &PluginRegistry) -> SaveOutput {
    let mut stripped = Vec::new();
    let children = strip_invalid(&doc.children, &mut Vec::new(), registry, &mut stripped);
    for entry in &stripped {
        tracing::warn!(
            target: "ndla_editor::serialize",
            kind = %entry.kind,
            path = ?entry.path,
            reason = %entry.reason,
            "element stripped on save"
        );
    }
    SaveOutput {
        html: serialize(&Document::new(children), registry),
        stripped,
    }
}

fn strip_invalid(
    nodes: &[Node],
    path: &mut Vec<usize>,
    registry: &PluginRegistry,
    stripped: &mut Vec<StrippedElement>,
) -> Vec<Node> {
    let mut out = Vec::new();
    for (ix, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else {
            out.push(node.clone());
            continue;
        };
        path.push(ix);
        let children = strip_invalid(&el.children, path, registry, stripped);
        match registry.validate(el) {
            Validity::Valid => out.push(Node::Element(ElementNode {
                children,
                ..el.clone()
            })),
            Validity::Invalid(reason) => {
                stripped.push(StrippedElement {
                    kind: el.kind.clone(),
                    path: path.clone(),
                    label: STRIPPED_LABEL,
                    reason,
                });
                out.extend(children.into_iter().filter(|child| match child {
                    Node::Text(t) => !t.text.is_empty(),
                    Node::Element(_) => true,
                }));
            }
        }
        path.pop();
    }
    out
}

impl Editor {
    pub fn from_html(html: &str, registry: PluginRegistry) -> Result<Self, SerializeError> {
        let doc = deserialize(html, &registry)?;
        Ok(Editor::new(doc, registry))
    }

    pub fn to_html(&self) -> String {
        serialize(self.doc(), self.registry())
    }

    pub fn save_output(&self) -> SaveOutput {
        serialize_for_save(self.doc(), self.registry())
    }
}
