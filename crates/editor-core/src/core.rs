use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::EditorConfig;
use crate::normalize::next_fix;
use crate::ops::{Op, Path, Transaction, child_path, shift_for_insert, transform_path};
use crate::plugin::{CommandError, PluginRegistry, QueryError, TransactionPreview};

pub type Data = BTreeMap<String, DataValue>;
pub type ElementKind = String;

/// A data value is either a flat string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Str(String),
    List(Vec<String>),
}

impl DataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Str(s) => Some(s),
            DataValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            DataValue::List(items) => Some(items),
            DataValue::Str(_) => None,
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Str(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Str(value)
    }
}

impl From<Vec<String>> for DataValue {
    fn from(value: Vec<String>) -> Self {
        DataValue::List(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Number of nodes in the tree, text leaves included.
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    Node::Element(el) => 1 + count(&el.children),
                    Node::Text(_) => 1,
                })
                .sum()
        }
        count(&self.children)
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.children.get(first)?;
        for &ix in rest {
            node = match node {
                Node::Element(el) => el.children.get(ix)?,
                Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    pub fn element(&self, path: &[usize]) -> Option<&ElementNode> {
        match self.node(path)? {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// Children of the node at `path`; the empty path names the document.
    pub fn children_at(&self, path: &[usize]) -> Option<&[Node]> {
        if path.is_empty() {
            return Some(&self.children);
        }
        self.element(path).map(|el| el.children.as_slice())
    }

    /// Paths of the element ancestors of `path`, nearest first.
    pub fn ancestors(&self, path: &[usize]) -> Vec<(Path, &ElementNode)> {
        (1..path.len())
            .rev()
            .filter_map(|depth| {
                let ancestor = &path[..depth];
                self.element(ancestor).map(|el| (ancestor.to_vec(), el))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::new(text))
    }

    pub fn marked_text(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    pub fn element(kind: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(ElementNode::new(kind).with_children(children))
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element("paragraph", vec![Node::text(text)])
    }

    pub fn section(children: Vec<Node>) -> Self {
        Node::element("section", children)
    }

    /// A void element already carrying its empty text child.
    pub fn void(kind: impl Into<String>, data: Data) -> Self {
        Node::Element(
            ElementNode::new(kind)
                .with_data_map(data)
                .with_children(vec![Node::text("")]),
        )
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.as_element().map(|el| el.kind.as_str())
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind() == Some(kind)
    }

    pub fn is_first_edit(&self) -> bool {
        self.as_element().is_some_and(|el| el.is_first_edit)
    }

    /// Concatenated text of every leaf under this node.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        fn walk(node: &Node, out: &mut String) {
            match node {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(el) => el.children.iter().for_each(|child| walk(child, out)),
            }
        }
        walk(self, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: Data,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_first_edit: bool,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Data::new(),
            is_first_edit: false,
            children: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_data_map(mut self, data: Data) -> Self {
        self.data.extend(data);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn first_edit(mut self) -> Self {
        self.is_first_edit = true;
        self
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(DataValue::as_str)
    }

    pub fn data_list(&self, key: &str) -> Option<&[String]> {
        self.data.get(key).and_then(DataValue::as_list)
    }

    pub fn into_node(self) -> Node {
        Node::Element(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }
}

pub const MARK_NAMES: [&str; 6] = ["bold", "italic", "underlined", "code", "sup", "sub"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub underlined: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sup: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sub: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        Some(match name {
            "bold" => self.bold,
            "italic" => self.italic,
            "underlined" => self.underlined,
            "code" => self.code,
            "sup" => self.sup,
            "sub" => self.sub,
            _ => return None,
        })
    }

    /// Returns `false` for an unknown mark name.
    pub fn set(&mut self, name: &str, on: bool) -> bool {
        let slot = match name {
            "bold" => &mut self.bold,
            "italic" => &mut self.italic,
            "underlined" => &mut self.underlined,
            "code" => &mut self.code,
            "sup" => &mut self.sup,
            "sub" => &mut self.sub,
            _ => return false,
        };
        *slot = on;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Data,
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_first_edit: Option<bool>,
}

impl AttrPatch {
    pub fn set(key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        let mut patch = Self::default();
        patch.set.insert(key.into(), value.into());
        patch
    }

    pub fn and_set(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            remove: vec![key.into()],
            ..Self::default()
        }
    }

    pub fn first_edit(mut self, is_first_edit: bool) -> Self {
        self.is_first_edit = Some(is_first_edit);
        self
    }
}

#[derive(Debug, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path out of bounds at depth {depth}: {index} >= {len}")]
    OutOfBounds {
        depth: usize,
        index: usize,
        len: usize,
    },
    #[error("non-container node at depth {depth}")]
    NotContainer { depth: usize },
    #[error("expected a text node at {0:?}")]
    NotText(Path),
    #[error("text node at {0:?} has no attributes")]
    NoAttributes(Path),
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("normalization did not converge after {0} fixes")]
    NormalizeDidNotConverge(usize),
    #[error("invalid operation: {0}")]
    InvalidOp(String),
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Option<Selection>,
    pub selection_after: Option<Selection>,
    pub source: Option<String>,
    /// Element inserted in first-edit state by this batch, at its final path.
    pub first_edit: Option<Path>,
}

/// Delivered to `on_change` subscribers once per committed batch.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub ops: Vec<Op>,
    pub source: Option<String>,
    pub selection: Option<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathRef(u64);

#[derive(Debug, Default)]
struct PendingBatch {
    ops: Vec<Op>,
    inverse_ops: Vec<Op>,
    selection_before: Option<Selection>,
    source: Option<String>,
    first_edit: Option<Path>,
}

impl PendingBatch {
    fn record(&mut self, forward: Op, inverse: Op) {
        self.first_edit = match self.first_edit.take() {
            Some(path) => transform_path(&path, &forward),
            None => None,
        };
        if let Op::InsertNode { path, node } = &forward
            && node.is_first_edit()
        {
            self.first_edit = Some(path.clone());
        }
        self.ops.push(forward);
        self.inverse_ops.push(inverse);
    }
}

type ChangeListener = Box<dyn FnMut(&ChangeEvent) + Send>;

pub struct Editor {
    doc: Document,
    selection: Option<Selection>,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    path_refs: HashMap<PathRef, Option<Path>>,
    next_path_ref: u64,
    suspend_depth: usize,
    pending: Option<PendingBatch>,
    dirty: bool,
    listeners: Vec<ChangeListener>,
}

impl Editor {
    pub fn new(doc: Document, registry: PluginRegistry) -> Self {
        Self::with_config(doc, registry, EditorConfig::default())
    }

    pub fn with_config(doc: Document, registry: PluginRegistry, config: EditorConfig) -> Self {
        let mut editor = Self {
            doc,
            selection: None,
            registry,
            config,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            path_refs: HashMap::new(),
            next_path_ref: 0,
            suspend_depth: 0,
            pending: None,
            dirty: true,
            listeners: Vec::new(),
        };
        if let Err(err) = editor.normalize_tracked() {
            tracing::error!(target: "ndla_editor::normalize", %err, "initial document did not normalize");
        }
        editor
    }

    pub fn with_selection(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        let mut editor = Self::new(doc, registry);
        editor.set_selection(selection);
        editor
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn focus_point(&self) -> Option<&Point> {
        self.selection.as_ref().map(|sel| &sel.focus)
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
        self.normalize_selection_in_place();
    }

    pub fn deselect(&mut self) {
        self.selection = None;
    }

    /// Gives the editor a selection, placing the cursor at the first text
    /// point when it had none.
    pub fn focus(&mut self) {
        if self.selection.is_none() {
            self.selection = first_text_point(&self.doc).map(Selection::collapsed);
        }
    }

    pub fn blur(&mut self) {
        self.deselect();
    }

    pub fn on_change(&mut self, listener: impl FnMut(&ChangeEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// True when no normalization is suspended or pending.
    pub fn is_normalized(&self) -> bool {
        self.suspend_depth == 0 && !self.dirty
    }

    pub fn undo(&mut self) -> bool {
        if self.suspend_depth > 0 {
            return false;
        }
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
            source,
            first_edit,
        } = record;

        let redo_ops = self.replay(inverse_ops);
        self.selection = selection_before.clone();
        self.settle("undo");

        self.redo_stack.push(UndoRecord {
            inverse_ops: redo_ops,
            selection_before,
            selection_after,
            source,
            first_edit,
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.suspend_depth > 0 {
            return false;
        }
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
            source,
            first_edit,
        } = record;

        let undo_ops = self.replay(inverse_ops);
        self.selection = selection_after.clone();
        self.settle("redo");

        self.undo_stack.push(UndoRecord {
            inverse_ops: undo_ops,
            selection_before,
            selection_after,
            source,
            first_edit,
        });
        true
    }

    fn replay(&mut self, ops: Vec<Op>) -> Vec<Op> {
        let mut inverses: Vec<Op> = Vec::new();
        let mut forward: Vec<Op> = Vec::new();
        for op in ops {
            let applied = op.clone();
            match self.apply_tracked(op) {
                Ok(inv) => {
                    inverses.push(inv);
                    forward.push(applied);
                }
                // Stop mutating once an inverse no longer fits the tree.
                Err(_) => break,
            }
        }
        inverses.reverse();
        self.notify(ChangeEvent {
            ops: forward,
            source: None,
            selection: None,
        });
        inverses
    }

    fn settle(&mut self, source: &str) {
        if let Err(err) = self.normalize_tracked() {
            tracing::error!(target: "ndla_editor::normalize", %err, source, "document did not settle");
        }
        self.normalize_selection_in_place();
    }

    /// Applies `tx` atomically. Outside a `without_normalizing` scope the
    /// batch is normalized and recorded as one undo entry.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let Transaction {
            ops,
            selection_after,
            meta,
        } = tx;

        if self.pending.is_none() {
            self.pending = Some(PendingBatch {
                selection_before: self.selection.clone(),
                source: meta.source.clone(),
                ..PendingBatch::default()
            });
        }

        let (recorded, first_edit_before) = match &self.pending {
            Some(batch) => (batch.ops.len(), batch.first_edit.clone()),
            None => (0, None),
        };
        let selection_before = self.selection.clone();

        let mut inverses: Vec<Op> = Vec::new();
        for op in ops {
            match self.apply_tracked(op) {
                Ok(inv) => inverses.push(inv),
                Err(err) => {
                    self.rollback(inverses, recorded, first_edit_before, selection_before);
                    return Err(err);
                }
            }
        }

        if let Some(sel) = selection_after {
            self.selection = Some(sel);
        }
        if let (Some(batch), Some(source)) = (self.pending.as_mut(), meta.source)
            && batch.source.is_none()
        {
            batch.source = Some(source);
        }

        if self.suspend_depth == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn rollback(
        &mut self,
        inverses: Vec<Op>,
        recorded: usize,
        first_edit: Option<Path>,
        selection: Option<Selection>,
    ) {
        for inv in inverses.into_iter().rev() {
            let applied = inv.clone();
            if apply_op_to(&mut self.doc, &mut self.selection, inv).is_ok() {
                self.transform_path_refs(&applied);
            }
        }
        self.selection = selection;
        let empty = match self.pending.as_mut() {
            Some(batch) => {
                batch.ops.truncate(recorded);
                batch.inverse_ops.truncate(recorded);
                batch.first_edit = first_edit;
                batch.ops.is_empty()
            }
            None => true,
        };
        if empty && self.suspend_depth == 0 {
            self.pending = None;
        }
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, ApplyError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        for op in tx.ops.iter().cloned() {
            apply_op_to(&mut doc, &mut selection, op)?;
        }
        if let Some(sel) = &tx.selection_after {
            selection = Some(sel.clone());
        }

        crate::normalize::normalize_document(
            &mut doc,
            &mut selection,
            &self.registry,
            self.config.max_normalize_iterations,
        )?;

        let selection = selection.and_then(|sel| normalize_selection(&doc, &sel));
        Ok(TransactionPreview { doc, selection })
    }

    /// Runs normalization now and records any fixes as their own undo entry.
    pub fn normalize(&mut self) -> Result<(), ApplyError> {
        if self.suspend_depth > 0 {
            return Ok(());
        }
        if self.pending.is_none() {
            self.pending = Some(PendingBatch {
                selection_before: self.selection.clone(),
                source: Some("normalize".to_string()),
                ..PendingBatch::default()
            });
        }
        self.flush()
    }

    pub(crate) fn suspend_normalizing(&mut self) {
        self.suspend_depth += 1;
    }

    pub(crate) fn resume_normalizing(&mut self) -> Result<(), ApplyError> {
        self.suspend_depth = self.suspend_depth.saturating_sub(1);
        if self.suspend_depth == 0 {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn last_undo_first_edit(&self) -> Option<&[usize]> {
        self.undo_stack.last()?.first_edit.as_deref()
    }

    pub(crate) fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    fn flush(&mut self) -> Result<(), ApplyError> {
        let result = self.normalize_tracked().map(|_| ());
        self.normalize_selection_in_place();

        let Some(batch) = self.pending.take() else {
            return result;
        };
        if batch.ops.is_empty() {
            return result;
        }

        let PendingBatch {
            ops,
            mut inverse_ops,
            selection_before,
            source,
            first_edit,
        } = batch;
        inverse_ops.reverse();

        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: self.selection.clone(),
            source: source.clone(),
            first_edit,
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }

        self.notify(ChangeEvent {
            ops,
            source,
            selection: self.selection.clone(),
        });
        result
    }

    fn notify(&mut self, event: ChangeEvent) {
        if event.ops.is_empty() {
            return;
        }
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    fn normalize_tracked(&mut self) -> Result<usize, ApplyError> {
        let max = crate::normalize::fix_budget(&self.doc, self.config.max_normalize_iterations);
        for applied in 0..max {
            let Some(fix) = next_fix(&self.doc, &self.registry) else {
                self.dirty = false;
                return Ok(applied);
            };
            tracing::trace!(
                target: "ndla_editor::normalize",
                rule = fix.rule,
                path = ?fix.path,
                ops = fix.ops.len(),
                "applying fix"
            );
            for op in fix.ops {
                self.apply_tracked(op)?;
            }
        }
        tracing::error!(target: "ndla_editor::normalize", max, "normalization did not converge");
        Err(ApplyError::NormalizeDidNotConverge(max))
    }

    fn apply_tracked(&mut self, op: Op) -> Result<Op, ApplyError> {
        let forward = op.clone();
        let inverse = apply_op_to(&mut self.doc, &mut self.selection, op)?;
        self.transform_path_refs(&forward);
        if let Some(batch) = self.pending.as_mut() {
            batch.record(forward, inverse.clone());
        }
        self.dirty = true;
        Ok(inverse)
    }

    fn transform_path_refs(&mut self, op: &Op) {
        if !op.is_structural() {
            return;
        }
        for slot in self.path_refs.values_mut() {
            if let Some(path) = slot.take() {
                *slot = transform_path(&path, op);
            }
        }
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .selection
            .take()
            .and_then(|sel| normalize_selection(&self.doc, &sel));
    }

    /// Tracks `path` through every following operation until `unref`.
    pub fn path_ref(&mut self, path: Path) -> PathRef {
        let id = PathRef(self.next_path_ref);
        self.next_path_ref += 1;
        self.path_refs.insert(id, Some(path));
        id
    }

    /// Current path of a tracked node, `None` once it was removed.
    pub fn path_ref_current(&self, path_ref: PathRef) -> Option<&[usize]> {
        self.path_refs.get(&path_ref)?.as_deref()
    }

    pub fn unref(&mut self, path_ref: PathRef) -> Option<Path> {
        self.path_refs.remove(&path_ref).flatten()
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }
}

pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut Option<Selection>,
    op: Op,
) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            if let Some(sel) = selection {
                transform_selection_insert_text(sel, &path, offset, text.len());
            }
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start = clamp_to_char_boundary(&text_node.text, range.start);
            let end = clamp_to_char_boundary(&text_node.text, range.end);
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            if let Some(sel) = selection {
                transform_selection_remove_text(sel, &path, start..end);
            }
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            if let Some(sel) = selection {
                for point in [&mut sel.anchor, &mut sel.focus] {
                    point.path = shift_for_insert(&point.path, &path);
                }
            }
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            if let Some(sel) = selection {
                let op = Op::RemoveNode { path: path.clone() };
                transform_selection_structural(sel, &op, doc, Some(&removed));
            }
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::MoveNode { path, new_path } => {
            if new_path.starts_with(&path) && new_path.len() > path.len() {
                return Err(ApplyError::InvalidOp(format!(
                    "cannot move {path:?} into its own subtree"
                )));
            }
            let node = remove_node(doc, &path)?;
            if let Err(err) = insert_node(doc, &new_path, node.clone()) {
                insert_node(doc, &path, node)?;
                return Err(err.into());
            }
            if let Some(sel) = selection {
                let op = Op::MoveNode {
                    path: path.clone(),
                    new_path: new_path.clone(),
                };
                transform_selection_structural(sel, &op, doc, None);
            }
            Ok(Op::MoveNode {
                path: new_path,
                new_path: path,
            })
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let Node::Element(el) = node else {
                return Err(PathError::NoAttributes(path).into());
            };
            let old = patch_apply(el, &patch);
            Ok(Op::SetNodeAttrs { path, patch: old })
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
    }
}

fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_structural(
    selection: &mut Selection,
    op: &Op,
    doc_after: &Document,
    removed: Option<&Node>,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if let Some(path) = transform_path(&point.path, op) {
            point.path = path;
            continue;
        }
        let Op::RemoveNode { path } = op else {
            continue;
        };
        let Some((&index, parent)) = path.split_last() else {
            continue;
        };

        // A removed text merged into its left neighbour keeps the cursor
        // at the same character.
        let left = index.checked_sub(1).map(|left_ix| child_path(parent, left_ix));
        if let (Some(Node::Text(removed_text)), Some(left_path)) = (removed, &left)
            && let Some(Node::Text(left_text)) = doc_after.node(left_path)
            && left_text.marks == removed_text.marks
            && left_text.text.ends_with(&removed_text.text)
        {
            let prefix = left_text.text.len() - removed_text.text.len();
            point.path = left_path.clone();
            point.offset = prefix + point.offset.min(removed_text.text.len());
            continue;
        }

        point.path = child_path(parent, index.saturating_sub(1));
        point.offset = 0;
    }
}

fn children_mut<'a>(doc: &'a mut Document, parent: &[usize]) -> Result<&'a mut Vec<Node>, PathError> {
    let mut children = &mut doc.children;
    for (depth, &ix) in parent.iter().enumerate() {
        let len = children.len();
        children = match children.get_mut(ix) {
            Some(Node::Element(el)) => &mut el.children,
            Some(Node::Text(_)) => return Err(PathError::NotContainer { depth }),
            None => return Err(PathError::OutOfBounds { depth, index: ix, len }),
        };
    }
    Ok(children)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let (&index, parent) = path.split_last().ok_or(PathError::Empty)?;
    let children = children_mut(doc, parent)?;
    let len = children.len();
    children.get_mut(index).ok_or(PathError::OutOfBounds {
        depth: parent.len(),
        index,
        len,
    })
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(PathError::NotText(path.to_vec())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let (&index, parent) = path.split_last().ok_or(PathError::Empty)?;
    let children = children_mut(doc, parent)?;
    if index > children.len() {
        return Err(PathError::OutOfBounds {
            depth: parent.len(),
            index,
            len: children.len(),
        });
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let (&index, parent) = path.split_last().ok_or(PathError::Empty)?;
    let children = children_mut(doc, parent)?;
    if index >= children.len() {
        return Err(PathError::OutOfBounds {
            depth: parent.len(),
            index,
            len: children.len(),
        });
    }
    Ok(children.remove(index))
}

fn patch_apply(el: &mut ElementNode, patch: &AttrPatch) -> AttrPatch {
    let mut old = AttrPatch::default();

    for (k, v) in &patch.set {
        match el.data.insert(k.clone(), v.clone()) {
            Some(prev) => {
                old.set.insert(k.clone(), prev);
            }
            None => old.remove.push(k.clone()),
        }
    }
    for key in &patch.remove {
        if let Some(prev) = el.data.remove(key) {
            old.set.insert(key.clone(), prev);
        }
    }
    if let Some(flag) = patch.is_first_edit {
        old.is_first_edit = Some(std::mem::replace(&mut el.is_first_edit, flag));
    }
    old
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    first_text_under(&doc.children, &mut Vec::new())
}

pub(crate) fn first_text_under(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        let found = match node {
            Node::Text(_) => Some(Point::new(path.clone(), 0)),
            Node::Element(el) => first_text_under(&el.children, path),
        };
        path.pop();
        if found.is_some() {
            return found;
        }
    }
    None
}

pub(crate) fn normalize_selection(doc: &Document, selection: &Selection) -> Option<Selection> {
    let anchor = normalize_point_to_existing_text(doc, &selection.anchor)
        .or_else(|| normalize_point_to_existing_text(doc, &selection.focus))
        .or_else(|| first_text_point(doc))?;
    let focus =
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| anchor.clone());
    Some(Selection { anchor, focus })
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    let mut resolved: Path = Vec::new();
    let mut children: &[Node] = &doc.children;
    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                let offset = clamp_to_char_boundary(&t.text, point.offset);
                return Some(Point::new(resolved, offset));
            }
            Node::Element(el) => children = &el.children,
        }
    }

    let el = doc.element(&resolved)?;
    first_text_under(&el.children, &mut resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(vec![Node::section(vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
        ])])
    }

    #[test]
    fn move_node_inverse_restores_tree() {
        let mut d = doc();
        let original = d.clone();
        let mut sel = None;
        let inverse = apply_op_to(
            &mut d,
            &mut sel,
            Op::MoveNode {
                path: vec![0, 0],
                new_path: vec![0, 1],
            },
        )
        .unwrap();
        assert_eq!(d.node(&[0, 1]).map(Node::text_content).as_deref(), Some("one"));
        apply_op_to(&mut d, &mut sel, inverse).unwrap();
        assert_eq!(d, original);
    }

    #[test]
    fn set_attrs_on_text_is_rejected() {
        let mut d = doc();
        let err = apply_op_to(
            &mut d,
            &mut None,
            Op::SetNodeAttrs {
                path: vec![0, 0, 0],
                patch: AttrPatch::set("x", "y"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::InvalidPath(PathError::NoAttributes(_))));
    }

    #[test]
    fn selection_follows_removed_sibling() {
        let mut d = doc();
        let mut sel = Some(Selection::collapsed(Point::new(vec![0, 1, 0], 2)));
        apply_op_to(&mut d, &mut sel, Op::RemoveNode { path: vec![0, 0] }).unwrap();
        assert_eq!(sel.unwrap().focus, Point::new(vec![0, 0, 0], 2));
    }
}
