use serde::Serialize;
use thiserror::Error;

use crate::core::{Editor, ElementNode, Marks, Node};
use crate::ops::{Path, child_path};
use crate::plugin::{PluginRegistry, Validity};
use crate::serialize::STRIPPED_LABEL;

pub const NO_EMBED_MESSAGE: &str = "This element can not be shown in the editor";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("document has pending normalization")]
    NotNormalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderAttributes {
    pub path: Path,
    pub is_void: bool,
    pub is_inline: bool,
    /// The host opens the element's form while this is set.
    pub is_first_edit: bool,
}

/// View tree handed to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderNode {
    Element {
        tag: String,
        attributes: RenderAttributes,
        props: Vec<(String, String)>,
        children: Vec<RenderNode>,
    },
    Leaf {
        text: String,
        marks: Marks,
    },
    Placeholder {
        path: Path,
        kind: String,
        message: String,
        label: &'static str,
        will_be_deleted: bool,
    },
}

impl RenderNode {
    pub fn tag(&self) -> Option<&str> {
        match self {
            RenderNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn prop(&self, name: &str) -> Option<&str> {
        match self {
            RenderNode::Element { props, .. } => props
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

pub struct RenderContext<'a> {
    pub registry: &'a PluginRegistry,
    pub path: Path,
}

impl RenderContext<'_> {
    pub fn children(&self, el: &ElementNode) -> Vec<RenderNode> {
        render_nodes(&el.children, &self.path, self.registry)
    }

    /// Renders `el` as `tag` with its children.
    pub fn element(&self, tag: &str, el: &ElementNode, props: Vec<(String, String)>) -> RenderNode {
        RenderNode::Element {
            tag: tag.to_string(),
            attributes: RenderAttributes {
                path: self.path.clone(),
                is_void: self.registry.is_void(&el.kind),
                is_inline: self.registry.is_inline(&el.kind),
                is_first_edit: el.is_first_edit,
            },
            props,
            children: self.children(el),
        }
    }
}

pub fn render_document(nodes: &[Node], registry: &PluginRegistry) -> Vec<RenderNode> {
    render_nodes(nodes, &[], registry)
}

fn render_nodes(nodes: &[Node], parent: &[usize], registry: &PluginRegistry) -> Vec<RenderNode> {
    nodes
        .iter()
        .enumerate()
        .map(|(ix, node)| render_node(node, child_path(parent, ix), registry))
        .collect()
}

fn render_node(node: &Node, path: Path, registry: &PluginRegistry) -> RenderNode {
    let el = match node {
        Node::Text(t) => {
            return RenderNode::Leaf {
                text: t.text.clone(),
                marks: t.marks.clone(),
            };
        }
        Node::Element(el) => el,
    };

    let placeholder = |path: Path, message: String| RenderNode::Placeholder {
        path,
        kind: el.kind.clone(),
        message,
        label: STRIPPED_LABEL,
        will_be_deleted: true,
    };

    if !registry.is_known_kind(&el.kind) {
        return placeholder(path, NO_EMBED_MESSAGE.to_string());
    }
    if let Validity::Invalid(reason) = registry.validate(el)
        && !el.is_first_edit
    {
        return placeholder(path, reason);
    }

    let cx = RenderContext { registry, path };
    match registry.render_element(el, &cx) {
        Some(rendered) => rendered,
        None => placeholder(cx.path, NO_EMBED_MESSAGE.to_string()),
    }
}

impl Editor {
    /// Renders the current tree. Refuses while normalization is suspended
    /// or has not run since the last mutation.
    pub fn render(&self) -> Result<Vec<RenderNode>, RenderError> {
        if !self.is_normalized() {
            return Err(RenderError::NotNormalized);
        }
        Ok(render_document(&self.doc().children, self.registry()))
    }
}
