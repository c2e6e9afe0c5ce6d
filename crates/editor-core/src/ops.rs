use std::cmp::Ordering;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{AttrPatch, Marks, Node, Selection};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    /// Moves the node at `path` to `new_path`. `new_path` is resolved in the
    /// tree after the node has been removed.
    MoveNode {
        #[serde(default)]
        path: Path,
        new_path: Path,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::MoveNode { path, .. }
            | Op::SetNodeAttrs { path, .. }
            | Op::SetTextMarks { path, .. } => path,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Op::InsertNode { .. } | Op::RemoveNode { .. } | Op::MoveNode { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

/// Document-order comparison where an ancestor compares equal to its
/// descendants.
pub fn compare_paths(a: &[usize], b: &[usize]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn is_ancestor_path(ancestor: &[usize], path: &[usize]) -> bool {
    ancestor.len() < path.len() && path.starts_with(ancestor)
}

pub fn parent_path(path: &[usize]) -> Option<&[usize]> {
    path.split_last().map(|(_, parent)| parent)
}

pub fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

pub fn next_sibling_path(path: &[usize]) -> Option<Path> {
    let (&ix, parent) = path.split_last()?;
    Some(child_path(parent, ix + 1))
}

/// Maps `path` through `op`. Returns `None` when the node the path pointed
/// at was removed.
pub fn transform_path(path: &[usize], op: &Op) -> Option<Path> {
    match op {
        Op::InsertNode { path: at, .. } => Some(shift_for_insert(path, at)),
        Op::RemoveNode { path: at } => shift_for_remove(path, at),
        Op::MoveNode {
            path: from,
            new_path: to,
        } => {
            if path.starts_with(from) {
                let mut moved = to.clone();
                moved.extend_from_slice(&path[from.len()..]);
                return Some(moved);
            }
            let removed = shift_for_remove(path, from)?;
            Some(shift_for_insert(&removed, to))
        }
        Op::InsertText { .. }
        | Op::RemoveText { .. }
        | Op::SetNodeAttrs { .. }
        | Op::SetTextMarks { .. } => Some(path.to_vec()),
    }
}

pub(crate) fn shift_for_insert(path: &[usize], at: &[usize]) -> Path {
    let mut out = path.to_vec();
    if let Some((&ix, parent)) = at.split_last() {
        let depth = parent.len();
        if path.len() > depth && path.starts_with(parent) && path[depth] >= ix {
            out[depth] += 1;
        }
    }
    out
}

fn shift_for_remove(path: &[usize], at: &[usize]) -> Option<Path> {
    let Some((&ix, parent)) = at.split_last() else {
        return Some(path.to_vec());
    };
    if path.starts_with(at) {
        return None;
    }
    let depth = parent.len();
    let mut out = path.to_vec();
    if path.len() > depth && path.starts_with(parent) && path[depth] > ix {
        out[depth] -= 1;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_path_follows_inserts_and_removes() {
        let insert = Op::InsertNode {
            path: vec![0, 1],
            node: Node::paragraph(""),
        };
        assert_eq!(transform_path(&[0, 1, 0], &insert), Some(vec![0, 2, 0]));
        assert_eq!(transform_path(&[0, 0, 3], &insert), Some(vec![0, 0, 3]));
        assert_eq!(transform_path(&[1], &insert), Some(vec![1]));

        let remove = Op::RemoveNode { path: vec![0, 1] };
        assert_eq!(transform_path(&[0, 1, 2], &remove), None);
        assert_eq!(transform_path(&[0, 3], &remove), Some(vec![0, 2]));
    }

    #[test]
    fn transform_path_relocates_moved_subtree() {
        let mv = Op::MoveNode {
            path: vec![0, 0],
            new_path: vec![1, 2],
        };
        assert_eq!(transform_path(&[0, 0, 1], &mv), Some(vec![1, 2, 1]));
        assert_eq!(transform_path(&[0, 1], &mv), Some(vec![0, 0]));
    }

    #[test]
    fn compare_paths_treats_ancestors_as_equal() {
        assert_eq!(compare_paths(&[0, 1], &[0, 1, 4]), Ordering::Equal);
        assert_eq!(compare_paths(&[0, 1], &[0, 2]), Ordering::Less);
        assert_eq!(compare_paths(&[2], &[0, 9]), Ordering::Greater);
    }
}
