//! Block insertion menu.
//!
//! The picker offers structural blocks and media when the cursor sits in
//! an empty paragraph inside an allowed area. Media choices move it into a
//! selection sub-state fed by asynchronous search results.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ApplyError, Data, Editor, Node, Selection, first_text_under};
use crate::ops::{Op, Path, Transaction};
use crate::plugins::{aside, details, embed, grid, is_empty_paragraph, related, table, text};

#[derive(Debug, Error)]
pub enum PickerError {
    #[error("block picker is not open")]
    NotOpen,
    #[error("action `{0}` is not offered here")]
    ActionNotOffered(String),
    #[error("no media selection in progress")]
    NotSelectingMedia,
    #[error("no media result at index {0}")]
    ResultOutOfRange(usize),
    #[error("inserted block could not be tracked")]
    LostInsertedNode,
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
    H5p,
}

impl MediaKind {
    /// Embed resource created for a result of this kind.
    pub fn resource(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "brightcove",
            MediaKind::Audio => "audio",
            MediaKind::File => "file",
            MediaKind::H5p => "h5p",
        }
    }
}

pub type NodeBuilder = Arc<dyn Fn() -> Node + Send + Sync>;

#[derive(Clone)]
pub enum BlockActionKind {
    Structural(NodeBuilder),
    Media(MediaKind),
}

impl fmt::Debug for BlockActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockActionKind::Structural(_) => f.write_str("Structural(..)"),
            BlockActionKind::Media(kind) => f.debug_tuple("Media").field(kind).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockAction {
    pub id: String,
    pub label: String,
    pub kind: BlockActionKind,
    pub requires_permission: Option<String>,
}

impl BlockAction {
    pub fn structural(
        id: impl Into<String>,
        label: impl Into<String>,
        build: impl Fn() -> Node + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: BlockActionKind::Structural(Arc::new(build)),
            requires_permission: None,
        }
    }

    pub fn media(id: impl Into<String>, label: impl Into<String>, media: MediaKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: BlockActionKind::Media(media),
            requires_permission: None,
        }
    }

    pub fn requires_permission(mut self, scope: impl Into<String>) -> Self {
        self.requires_permission = Some(scope.into());
        self
    }
}

/// Horizontal shift of the picker anchor per enclosing context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorOffsets {
    pub default: f32,
    pub list_item: f32,
    pub table_cell: f32,
    pub grid_cell: f32,
}

impl Default for AnchorOffsets {
    fn default() -> Self {
        Self {
            default: 78.0,
            list_item: 110.0,
            table_cell: 25.0,
            grid_cell: 40.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockPickerConfig {
    pub actions: Vec<BlockAction>,
    pub allowed_pick_areas: Vec<String>,
    pub illegal_areas: Vec<String>,
    /// Per parent kind, the action ids offered there.
    pub context_actions: HashMap<String, Vec<String>>,
    pub anchor_offsets: AnchorOffsets,
}

impl Default for BlockPickerConfig {
    fn default() -> Self {
        Self {
            actions: default_actions(),
            allowed_pick_areas: ["section", "details", "aside", "bodybox", "grid-cell"]
                .map(String::from)
                .to_vec(),
            illegal_areas: ["summary", "table-head", "table-cell-header"]
                .map(String::from)
                .to_vec(),
            context_actions: HashMap::new(),
            anchor_offsets: AnchorOffsets::default(),
        }
    }
}

fn default_actions() -> Vec<BlockAction> {
    vec![
        BlockAction::media("image", "Image", MediaKind::Image),
        BlockAction::media("video", "Video", MediaKind::Video),
        BlockAction::media("audio", "Audio", MediaKind::Audio),
        BlockAction::media("file", "File", MediaKind::File),
        BlockAction::media("h5p", "H5P", MediaKind::H5p),
        BlockAction::structural("table", "Table", || table::table_node(2, 2, true)),
        BlockAction::structural("details", "Expandable box", details::details_node),
        BlockAction::structural("factAside", "Fact box", || aside::aside_node("factAside")),
        BlockAction::structural("bodybox", "Framed box", aside::bodybox_node),
        BlockAction::structural("grid", "Grid", || grid::grid_node("2")),
        BlockAction::structural("code-block", "Code block", embed::code_block_node),
        BlockAction::structural("related", "Related content", related::related_node),
        BlockAction::structural("divider", "Divider", text::divider_node),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct UserPermissions {
    pub scopes: HashSet<String>,
}

impl UserPermissions {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Host UI geometry lookup.
pub trait ElementRects {
    fn rect(&self, path: &[usize]) -> Option<Rect>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickerAnchor {
    pub path: Path,
    pub left: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequest {
    pub id: u64,
    pub media: MediaKind,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaResult {
    pub resource: String,
    #[serde(default)]
    pub data: Data,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerState {
    Closed,
    Open {
        at: Path,
        anchor: PickerAnchor,
        actions: Vec<String>,
    },
    SelectingVisualElement {
        at: Path,
        media: MediaKind,
        request: MediaRequest,
        results: Vec<MediaResult>,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerOutcome {
    Inserted(Path),
    MediaRequested(MediaRequest),
}

/// Always resolvable, so a context can offer a plain paragraph without
/// listing it among the global actions.
pub const TEXT_ACTION_ID: &str = "text";

fn text_action() -> BlockAction {
    BlockAction::structural(TEXT_ACTION_ID, "Text", || Node::paragraph(""))
}

pub struct BlockPicker {
    config: BlockPickerConfig,
    permissions: UserPermissions,
    text_action: BlockAction,
    state: PickerState,
    next_request: u64,
    dismissed_at: Option<Path>,
}

impl BlockPicker {
    pub fn new(config: BlockPickerConfig, permissions: UserPermissions) -> Self {
        Self {
            config,
            permissions,
            text_action: text_action(),
            state: PickerState::Closed,
            next_request: 0,
            dismissed_at: None,
        }
    }

    pub fn state(&self) -> &PickerState {
        &self.state
    }

    pub fn config(&self) -> &BlockPickerConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PickerState::Open { .. })
    }

    /// Path of the empty paragraph the picker may insert at, if the current
    /// selection allows it.
    pub fn eligible_target(&self, editor: &Editor) -> Option<Path> {
        let selection = editor.selection()?;
        if !selection.is_collapsed() {
            return None;
        }
        let (_, paragraph_path) = selection.focus.path.split_last()?;
        let paragraph = editor.doc().element(paragraph_path)?;
        if !is_empty_paragraph(paragraph) {
            return None;
        }

        let ancestors = editor.doc().ancestors(&selection.focus.path);
        let mut block_ancestors = ancestors.iter().skip(1);
        let (_, area) = block_ancestors.next()?;
        if ancestors
            .iter()
            .any(|(_, el)| self.config.illegal_areas.contains(&el.kind))
        {
            return None;
        }
        if !self.config.allowed_pick_areas.contains(&area.kind) {
            return None;
        }
        Some(paragraph_path.to_vec())
    }

    /// Re-evaluates the picker against the current selection. Call on every
    /// selection change.
    pub fn refresh(&mut self, editor: &Editor, rects: &dyn ElementRects) {
        if matches!(self.state, PickerState::SelectingVisualElement { .. }) {
            return;
        }
        let Some(at) = self.eligible_target(editor) else {
            self.dismissed_at = None;
            if self.is_open() {
                tracing::debug!(target: "ndla_editor::picker", "target gone, closing");
            }
            self.state = PickerState::Closed;
            return;
        };
        if self.dismissed_at.as_ref() == Some(&at) {
            return;
        }
        self.dismissed_at = None;

        let actions = self.offered_actions(editor, &at);
        let anchor = self.anchor(editor, &at, rects);
        self.state = PickerState::Open {
            at,
            anchor,
            actions,
        };
    }

    fn offered_actions(&self, editor: &Editor, at: &[usize]) -> Vec<String> {
        let parent_kind = at
            .split_last()
            .and_then(|(_, parent)| editor.doc().element(parent))
            .map(|el| el.kind.as_str());
        let candidates: Vec<&BlockAction> =
            match parent_kind.and_then(|kind| self.config.context_actions.get(kind)) {
                Some(ids) => ids.iter().filter_map(|id| self.action(id)).collect(),
                None => self.config.actions.iter().collect(),
            };

        candidates
            .into_iter()
            .filter(|action| {
                action
                    .requires_permission
                    .as_deref()
                    .is_none_or(|scope| self.permissions.allows(scope))
            })
            .map(|action| action.id.clone())
            .collect()
    }

    fn anchor(&self, editor: &Editor, at: &[usize], rects: &dyn ElementRects) -> PickerAnchor {
        let offsets = &self.config.anchor_offsets;
        let offset = editor
            .doc()
            .ancestors(&child_of(at))
            .iter()
            .find_map(|(_, el)| match el.kind.as_str() {
                "list-item" => Some(offsets.list_item),
                "table-cell" | "table-cell-header" => Some(offsets.table_cell),
                "grid-cell" => Some(offsets.grid_cell),
                _ => None,
            })
            .unwrap_or(offsets.default);
        let rect = rects.rect(at).unwrap_or_default();
        PickerAnchor {
            path: at.to_vec(),
            left: rect.x - offset,
            top: rect.y,
        }
    }

    fn action(&self, id: &str) -> Option<&BlockAction> {
        self.config
            .actions
            .iter()
            .find(|a| a.id == id)
            .or_else(|| (id == TEXT_ACTION_ID).then_some(&self.text_action))
    }

    pub fn choose(&mut self, editor: &mut Editor, id: &str) -> Result<PickerOutcome, PickerError> {
        let PickerState::Open { at, actions, .. } = &self.state else {
            return Err(PickerError::NotOpen);
        };
        if !actions.iter().any(|a| a == id) {
            return Err(PickerError::ActionNotOffered(id.to_string()));
        }
        let at = at.clone();
        let kind = self
            .action(id)
            .map(|a| a.kind.clone())
            .ok_or_else(|| PickerError::ActionNotOffered(id.to_string()))?;

        match kind {
            BlockActionKind::Structural(build) => {
                let path = insert_and_focus(editor, at, build(), id)?;
                self.state = PickerState::Closed;
                Ok(PickerOutcome::Inserted(path))
            }
            BlockActionKind::Media(media) => {
                let request = self.issue_request(media, String::new());
                tracing::debug!(target: "ndla_editor::picker", id = request.id, ?media, "media selection started");
                self.state = PickerState::SelectingVisualElement {
                    at,
                    media,
                    request: request.clone(),
                    results: Vec::new(),
                    error: None,
                };
                Ok(PickerOutcome::MediaRequested(request))
            }
        }
    }

    fn issue_request(&mut self, media: MediaKind, query: String) -> MediaRequest {
        self.next_request += 1;
        MediaRequest {
            id: self.next_request,
            media,
            query,
        }
    }

    /// Starts a new search, superseding any request in flight.
    pub fn search(&mut self, query: impl Into<String>) -> Result<MediaRequest, PickerError> {
        let PickerState::SelectingVisualElement { media, .. } = &self.state else {
            return Err(PickerError::NotSelectingMedia);
        };
        let request = self.issue_request(*media, query.into());
        if let PickerState::SelectingVisualElement {
            request: current,
            error,
            results,
            ..
        } = &mut self.state
        {
            *current = request.clone();
            *error = None;
            results.clear();
        }
        Ok(request)
    }

    fn is_current(&self, request_id: u64) -> bool {
        let current = matches!(
            &self.state,
            PickerState::SelectingVisualElement { request, .. } if request.id == request_id
        );
        if !current {
            tracing::debug!(target: "ndla_editor::picker", request_id, "discarding stale media response");
        }
        current
    }

    pub fn deliver_search_results(&mut self, request_id: u64, found: Vec<MediaResult>) -> bool {
        if !self.is_current(request_id) {
            return false;
        }
        if let PickerState::SelectingVisualElement { results, error, .. } = &mut self.state {
            *results = found;
            *error = None;
        }
        true
    }

    /// Records a failed lookup. The sub-state stays open so the user can
    /// search again.
    pub fn media_failed(&mut self, request_id: u64, message: impl Into<String>) -> bool {
        if !self.is_current(request_id) {
            return false;
        }
        let message = message.into();
        tracing::warn!(target: "ndla_editor::picker", request_id, %message, "media lookup failed");
        if let PickerState::SelectingVisualElement { error, .. } = &mut self.state {
            *error = Some(message);
        }
        true
    }

    /// Inserts an embed for `result` and closes. Returns `Ok(None)` when the
    /// response belongs to a stale request or the picker was closed.
    pub fn deliver_media(
        &mut self,
        editor: &mut Editor,
        request_id: u64,
        result: MediaResult,
    ) -> Result<Option<Path>, PickerError> {
        if !self.is_current(request_id) {
            return Ok(None);
        }
        let PickerState::SelectingVisualElement { at, .. } = &self.state else {
            return Ok(None);
        };
        let at = at.clone();
        let mut data = result.data;
        data.insert("resource".to_string(), result.resource.into());
        let path = insert_and_focus(editor, at, Node::void("embed", data), "media")?;
        self.state = PickerState::Closed;
        Ok(Some(path))
    }

    pub fn confirm_media(&mut self, editor: &mut Editor, index: usize) -> Result<Path, PickerError> {
        let PickerState::SelectingVisualElement {
            request, results, ..
        } = &self.state
        else {
            return Err(PickerError::NotSelectingMedia);
        };
        let result = results
            .get(index)
            .cloned()
            .ok_or(PickerError::ResultOutOfRange(index))?;
        let request_id = request.id;
        self.deliver_media(editor, request_id, result)?
            .ok_or(PickerError::NotSelectingMedia)
    }

    /// Click-away or escape. Leaves the document untouched.
    pub fn close(&mut self) {
        self.dismissed_at = match &self.state {
            PickerState::Open { at, .. } | PickerState::SelectingVisualElement { at, .. } => {
                Some(at.clone())
            }
            PickerState::Closed => None,
        };
        self.state = PickerState::Closed;
    }
}

fn child_of(path: &[usize]) -> Path {
    let mut out = path.to_vec();
    out.push(0);
    out
}

/// Inserts `node` at `at`, follows it through normalization and puts the
/// cursor in its first text.
fn insert_and_focus(
    editor: &mut Editor,
    at: Path,
    node: Node,
    source: &str,
) -> Result<Path, PickerError> {
    let mut guard = editor.pause_normalizing();
    guard.apply(
        Transaction::new(vec![Op::InsertNode {
            path: at.clone(),
            node,
        }])
        .source(format!("picker:{source}")),
    )?;
    let tracked = guard.path_ref(at);
    guard.finish()?;

    let path = editor.unref(tracked).ok_or(PickerError::LostInsertedNode)?;
    let point = editor
        .doc()
        .children_at(&path)
        .and_then(|children| first_text_under(children, &mut path.clone()));
    if let Some(point) = point {
        editor.set_selection(Selection::collapsed(point));
    }
    tracing::debug!(target: "ndla_editor::picker", ?path, source, "block inserted");
    Ok(path)
}
