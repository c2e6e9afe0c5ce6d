use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::core::{ApplyError, AttrPatch, Document, Editor, Node, Point, Selection, first_text_under};
use crate::ops::{Op, Path, Transaction, child_path, compare_paths, is_ancestor_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Path(Path),
    Point(Point),
    Range(Selection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Anchor,
    Focus,
    Start,
    End,
}

/// Keeps normalization suspended until dropped or finished. The last guard
/// to go runs one normalization pass over everything applied meanwhile.
pub struct NormalizeGuard<'a> {
    editor: &'a mut Editor,
    finished: bool,
}

impl NormalizeGuard<'_> {
    pub fn finish(mut self) -> Result<(), ApplyError> {
        self.finished = true;
        self.editor.resume_normalizing()
    }
}

impl Deref for NormalizeGuard<'_> {
    type Target = Editor;

    fn deref(&self) -> &Editor {
        self.editor
    }
}

impl DerefMut for NormalizeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Editor {
        self.editor
    }
}

impl Drop for NormalizeGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.editor.resume_normalizing() {
            tracing::error!(target: "ndla_editor::normalize", %err, "normalization after suspended batch failed");
        }
    }
}

fn cmp_points(a: &Point, b: &Point) -> Ordering {
    a.path.cmp(&b.path).then(a.offset.cmp(&b.offset))
}

fn ordered(sel: &Selection) -> (&Point, &Point) {
    if cmp_points(&sel.anchor, &sel.focus) == Ordering::Greater {
        (&sel.focus, &sel.anchor)
    } else {
        (&sel.anchor, &sel.focus)
    }
}

fn in_location(path: &[usize], at: &Location) -> bool {
    match at {
        Location::Path(p) => path.starts_with(p),
        Location::Point(point) => point.path.starts_with(path),
        Location::Range(sel) => {
            let (start, end) = ordered(sel);
            compare_paths(path, &start.path) != Ordering::Less
                && compare_paths(path, &end.path) != Ordering::Greater
        }
    }
}

fn collect_nodes<'a>(
    nodes: &'a [Node],
    parent: &[usize],
    at: &Location,
    out: &mut Vec<(Path, &'a Node)>,
) {
    for (ix, node) in nodes.iter().enumerate() {
        let path = child_path(parent, ix);
        if !in_location(&path, at) {
            continue;
        }
        if let Node::Element(el) = node {
            out.push((path.clone(), node));
            collect_nodes(&el.children, &path, at, out);
        } else {
            out.push((path, node));
        }
    }
}

/// Nodes within `at` in document order.
pub fn nodes_in<'a>(doc: &'a Document, at: &Location) -> Vec<(Path, &'a Node)> {
    let mut out = Vec::new();
    collect_nodes(&doc.children, &[], at, &mut out);
    out
}

impl Editor {
    /// Suspends normalization until the returned guard is finished or dropped.
    pub fn pause_normalizing(&mut self) -> NormalizeGuard<'_> {
        self.suspend_normalizing();
        NormalizeGuard {
            editor: self,
            finished: false,
        }
    }

    /// Runs `f` with normalization suspended, then normalizes once.
    pub fn without_normalizing<R>(&mut self, f: impl FnOnce(&mut Editor) -> R) -> Result<R, ApplyError> {
        let mut guard = self.pause_normalizing();
        let out = f(&mut guard);
        guard.finish()?;
        Ok(out)
    }

    fn resolve_insert_path(&self, at: &Location) -> Option<Path> {
        let point = match at {
            Location::Path(path) => {
                let (&ix, parent) = path.split_last()?;
                let len = self.doc().children_at(parent)?.len();
                return (ix <= len).then(|| path.clone());
            }
            Location::Point(point) => point,
            Location::Range(sel) => &sel.focus,
        };
        // Points insert after the block holding them.
        let block = self.block_path_at(&point.path)?;
        let (&ix, parent) = block.split_last()?;
        Some(child_path(parent, ix + 1))
    }

    /// Nearest block element at or above `path`.
    pub fn block_path_at(&self, path: &[usize]) -> Option<Path> {
        (1..=path.len())
            .rev()
            .map(|depth| &path[..depth])
            .find(|p| {
                self.doc()
                    .element(p)
                    .is_some_and(|el| !self.registry().is_inline(&el.kind))
            })
            .map(<[usize]>::to_vec)
    }

    /// Inserts `nodes` as consecutive siblings. Returns `false` without
    /// touching the document when `at` does not resolve.
    pub fn insert_nodes(&mut self, nodes: Vec<Node>, at: Location) -> bool {
        let Some(path) = self.resolve_insert_path(&at) else {
            return false;
        };
        let Some((&ix, parent)) = path.split_last() else {
            return false;
        };
        let ops = nodes
            .into_iter()
            .enumerate()
            .map(|(offset, node)| Op::InsertNode {
                path: child_path(parent, ix + offset),
                node,
            })
            .collect();
        self.apply(Transaction::new(ops).source("insert_nodes")).is_ok()
    }

    /// Removes the top-most nodes matching `matches` within `at`, or within
    /// the selection when `at` is `None`. Returns the number removed.
    pub fn remove_nodes(
        &mut self,
        matches: impl Fn(&Node, &[usize]) -> bool,
        at: Option<Location>,
    ) -> usize {
        let Some(at) = at.or_else(|| self.selection().cloned().map(Location::Range)) else {
            return 0;
        };
        let mut targets: Vec<Path> = Vec::new();
        for (path, node) in nodes_in(self.doc(), &at) {
            if targets.iter().any(|t| is_ancestor_path(t, &path)) {
                continue;
            }
            if matches(node, &path) {
                targets.push(path);
            }
        }
        let count = targets.len();
        let ops = targets
            .into_iter()
            .rev()
            .map(|path| Op::RemoveNode { path })
            .collect();
        match self.apply(Transaction::new(ops).source("remove_nodes")) {
            Ok(()) => count,
            Err(_) => 0,
        }
    }

    /// Shallow-merges `patch` into every matching element within `at`.
    pub fn set_nodes(
        &mut self,
        patch: AttrPatch,
        matches: impl Fn(&Node, &[usize]) -> bool,
        at: Option<Location>,
    ) -> usize {
        let Some(at) = at.or_else(|| self.selection().cloned().map(Location::Range)) else {
            return 0;
        };
        let ops: Vec<Op> = nodes_in(self.doc(), &at)
            .into_iter()
            .filter(|(path, node)| matches!(node, Node::Element(_)) && matches(node, path))
            .map(|(path, _)| Op::SetNodeAttrs {
                path,
                patch: patch.clone(),
            })
            .collect();
        let count = ops.len();
        match self.apply(Transaction::new(ops).source("set_nodes")) {
            Ok(()) => count,
            Err(_) => 0,
        }
    }

    pub fn select(&mut self, at: Location) {
        let selection = match at {
            Location::Point(point) => Selection::collapsed(point),
            Location::Range(sel) => sel,
            Location::Path(path) => {
                let Some(node) = self.doc().node(&path) else {
                    return;
                };
                let (first, last) = text_edges(node, &path);
                match (first, last) {
                    (Some(anchor), Some(focus)) => Selection { anchor, focus },
                    _ => return,
                }
            }
        };
        self.set_selection(selection);
    }

    pub fn collapse(&mut self, edge: Edge) {
        let Some(sel) = self.selection().cloned() else {
            return;
        };
        let (start, end) = ordered(&sel);
        let point = match edge {
            Edge::Anchor => sel.anchor.clone(),
            Edge::Focus => sel.focus.clone(),
            Edge::Start => start.clone(),
            Edge::End => end.clone(),
        };
        self.set_selection(Selection::collapsed(point));
    }
}

/// First and last text points under `node`.
fn text_edges(node: &Node, path: &[usize]) -> (Option<Point>, Option<Point>) {
    match node {
        Node::Text(t) => (
            Some(Point::new(path.to_vec(), 0)),
            Some(Point::new(path.to_vec(), t.text.len())),
        ),
        Node::Element(el) => {
            let first = first_text_under(&el.children, &mut path.to_vec());
            let last = el
                .children
                .iter()
                .enumerate()
                .rev()
                .find_map(|(ix, child)| text_edges(child, &child_path(path, ix)).1);
            (first, last)
        }
    }
}
