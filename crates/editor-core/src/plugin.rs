use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{Document, Editor, ElementNode, Node, Selection};
use crate::markup::{MarkupElement, MarkupNode};
use crate::normalize::NormalizeContext;
use crate::ops::Op;
use crate::plugins;
use crate::render::{RenderContext, RenderNode};
use crate::serialize::{DeserializeContext, SerializeContext};

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate command id: {0}")]
    DuplicateCommand(String),
    #[error("duplicate query id: {0}")]
    DuplicateQuery(String),
}

type CommandHandler = Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;
type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

/// Kinds allowed next to an element, and the kind inserted when a
/// neighbour (or the container boundary) is not one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingRule {
    pub allowed: Vec<String>,
    pub default_type: String,
}

/// Kinds allowed as children. Other children are wrapped in
/// `default_type`, and an empty container gets one `default_type` child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRule {
    pub allowed: Vec<String>,
    pub default_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub previous: Option<SiblingRule>,
    pub next: Option<SiblingRule>,
    pub nodes: Option<ChildRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    pub kind: String,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
    pub normalizer: NormalizerConfig,
}

impl ElementSpec {
    pub fn block(kind: impl Into<String>, children: ChildConstraint) -> Self {
        Self {
            kind: kind.into(),
            role: NodeRole::Block,
            is_void: false,
            children,
            normalizer: NormalizerConfig::default(),
        }
    }

    pub fn inline(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            role: NodeRole::Inline,
            is_void: false,
            children: ChildConstraint::InlineOnly,
            normalizer: NormalizerConfig::default(),
        }
    }

    pub fn void(mut self) -> Self {
        self.is_void = true;
        self.children = ChildConstraint::None;
        self
    }

    pub fn previous(mut self, allowed: &[&str], default_type: &str) -> Self {
        self.normalizer.previous = Some(SiblingRule {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            default_type: default_type.to_string(),
        });
        self
    }

    pub fn next(mut self, allowed: &[&str], default_type: &str) -> Self {
        self.normalizer.next = Some(SiblingRule {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            default_type: default_type.to_string(),
        });
        self
    }

    pub fn nodes(mut self, allowed: &[&str], default_type: &str) -> Self {
        self.normalizer.nodes = Some(ChildRule {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            default_type: default_type.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Document-wide normalization, run before the per-element walk.
pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Option<Vec<Op>>;
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Option<Selection>,
}

/// Every hook except `id` defaults to "not handled", letting dispatch fall
/// through to earlier registered plugins.
pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn element_specs(&self) -> Vec<ElementSpec> {
        Vec::new()
    }
    fn render(&self, _el: &ElementNode, _cx: &RenderContext<'_>) -> Option<RenderNode> {
        None
    }
    fn serialize(&self, _el: &ElementNode, _cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        None
    }
    fn deserialize(&self, _el: &MarkupElement, _cx: &DeserializeContext<'_>) -> Option<Vec<Node>> {
        None
    }
    fn normalize_node(
        &self,
        _el: &ElementNode,
        _path: &[usize],
        _cx: &NormalizeContext<'_>,
    ) -> Option<Vec<Op>> {
        None
    }
    fn validate(&self, _el: &ElementNode) -> Option<Validity> {
        None
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn EditorPlugin>>,
    element_specs: HashMap<String, ElementSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Sections, paragraphs and headings only.
    pub fn core() -> Self {
        Self::new(plugins::core_plugins()).expect("core registry must be valid")
    }

    pub fn learning_resource() -> Self {
        Self::new(plugins::learning_resource_plugins())
            .expect("learning resource registry must be valid")
    }

    pub fn topic_article() -> Self {
        Self::new(plugins::topic_article_plugins()).expect("topic article registry must be valid")
    }

    pub fn frontpage_article() -> Self {
        Self::new(plugins::frontpage_article_plugins())
            .expect("frontpage article registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), RegistryError> {
        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(RegistryError::DuplicateQuery(query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        for spec in plugin.element_specs() {
            if self.element_specs.contains_key(&spec.kind) {
                tracing::debug!(
                    target: "ndla_editor::registry",
                    kind = %spec.kind,
                    plugin = plugin.id(),
                    "element spec overridden"
                );
            }
            self.element_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Plugins in dispatch order: the last registered comes first.
    pub fn dispatch_order(&self) -> impl Iterator<Item = &dyn EditorPlugin> {
        self.plugins.iter().rev().map(|p| p.as_ref())
    }

    pub fn element_spec(&self, kind: &str) -> Option<&ElementSpec> {
        self.element_specs.get(kind)
    }

    pub fn element_specs(&self) -> &HashMap<String, ElementSpec> {
        &self.element_specs
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.element_specs.contains_key(kind)
    }

    pub fn is_void(&self, kind: &str) -> bool {
        self.element_spec(kind).is_some_and(|s| s.is_void)
    }

    pub fn is_inline(&self, kind: &str) -> bool {
        self.element_spec(kind)
            .is_some_and(|s| s.role == NodeRole::Inline)
    }

    pub fn child_constraint(&self, kind: &str) -> ChildConstraint {
        self.element_spec(kind)
            .map(|s| s.children)
            .unwrap_or(ChildConstraint::Any)
    }

    /// Kind of the child an empty container of `kind` receives.
    pub fn default_child_kind(&self, kind: &str) -> Option<&str> {
        let spec = self.element_spec(kind)?;
        if let Some(rule) = &spec.normalizer.nodes {
            return Some(rule.default_type.as_str());
        }
        match spec.children {
            ChildConstraint::BlockOnly => Some("paragraph"),
            _ => None,
        }
    }

    /// Whether `kind` may appear as a child of `parent` (`None` is the
    /// document root, which holds sections only).
    pub fn accepts_child(&self, parent: Option<&str>, kind: &str) -> bool {
        let Some(parent) = parent else {
            return kind == "section";
        };
        let Some(spec) = self.element_spec(parent) else {
            return false;
        };
        if let Some(rule) = &spec.normalizer.nodes {
            return rule.allowed.iter().any(|k| k == kind);
        }
        match spec.children {
            ChildConstraint::BlockOnly => !self.is_inline(kind),
            ChildConstraint::InlineOnly => self.is_inline(kind),
            ChildConstraint::Any => true,
            ChildConstraint::None => false,
        }
    }

    /// An empty element of `kind`; normalization fills in required children.
    pub fn empty_element(&self, kind: &str) -> Node {
        let children = if self.is_void(kind)
            || self.child_constraint(kind) == ChildConstraint::InlineOnly
        {
            vec![Node::text("")]
        } else {
            Vec::new()
        };
        Node::element(kind, children)
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn render_element(&self, el: &ElementNode, cx: &RenderContext<'_>) -> Option<RenderNode> {
        self.dispatch_order().find_map(|p| p.render(el, cx))
    }

    pub fn serialize_element(&self, el: &ElementNode, cx: &SerializeContext<'_>) -> Option<MarkupNode> {
        self.dispatch_order().find_map(|p| p.serialize(el, cx))
    }

    pub fn deserialize_element(
        &self,
        el: &MarkupElement,
        cx: &DeserializeContext<'_>,
    ) -> Option<Vec<Node>> {
        self.dispatch_order().find_map(|p| p.deserialize(el, cx))
    }

    pub fn normalize_element(
        &self,
        el: &ElementNode,
        path: &[usize],
        cx: &NormalizeContext<'_>,
    ) -> Option<(&'static str, Vec<Op>)> {
        self.dispatch_order().find_map(|p| {
            p.normalize_node(el, path, cx)
                .filter(|ops| !ops.is_empty())
                .map(|ops| (p.id(), ops))
        })
    }

    /// Unknown kinds are invalid; a known kind no plugin objects to is valid.
    pub fn validate(&self, el: &ElementNode) -> Validity {
        if !self.is_known_kind(&el.kind) {
            return Validity::Invalid(format!("unknown element kind `{}`", el.kind));
        }
        self.dispatch_order()
            .find_map(|p| p.validate(el))
            .unwrap_or(Validity::Valid)
    }
}

/// Path of the nearest element of `kind` at or above `path`.
pub fn ancestor_element_path(doc: &Document, path: &[usize], kind: &str) -> Option<Vec<usize>> {
    (1..=path.len())
        .rev()
        .map(|depth| &path[..depth])
        .find(|p| doc.element(p).is_some_and(|el| el.kind == kind))
        .map(<[usize]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str);

    impl EditorPlugin for Dummy {
        fn id(&self) -> &'static str {
            self.0
        }

        fn commands(&self) -> Vec<CommandSpec> {
            vec![CommandSpec::new("dummy.run", "Run", |_, _| Ok(()))]
        }
    }

    #[test]
    fn duplicate_command_ids_fail_registration() {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(Dummy("a")), Box::new(Dummy("b"))];
        let Err(err) = PluginRegistry::new(plugins) else {
            panic!("expected duplicate command error");
        };
        assert!(matches!(err, RegistryError::DuplicateCommand(id) if id == "dummy.run"));
    }

    #[test]
    fn document_root_accepts_sections_only() {
        let registry = PluginRegistry::core();
        assert!(registry.accepts_child(None, "section"));
        assert!(!registry.accepts_child(None, "paragraph"));
        assert!(registry.accepts_child(Some("section"), "paragraph"));
    }
}
