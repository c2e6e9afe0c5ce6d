//! Structural normalization.
//!
//! [`next_fix`] finds the first violation in the tree and returns the ops
//! that repair it. Callers apply the fix and ask again until the tree is
//! clean. Document passes run first, then elements are visited bottom-up,
//! each element trying its plugin normalizers, the core structural rules,
//! and finally the declarative [`NormalizerConfig`](crate::NormalizerConfig)
//! of its kind.

use crate::core::{ApplyError, Document, ElementNode, Node, Selection, apply_op_to};
use crate::ops::{Op, Path, child_path};
use crate::plugin::{ChildConstraint, PluginRegistry};

pub struct NormalizeContext<'a> {
    pub doc: &'a Document,
    pub registry: &'a PluginRegistry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeFix {
    pub rule: &'static str,
    pub path: Path,
    pub ops: Vec<Op>,
}

pub fn next_fix(doc: &Document, registry: &PluginRegistry) -> Option<NormalizeFix> {
    for pass in registry.normalize_passes() {
        if let Some(ops) = pass.run(doc, registry).filter(|ops| !ops.is_empty()) {
            return Some(NormalizeFix {
                rule: pass.id(),
                path: Vec::new(),
                ops,
            });
        }
    }
    let cx = NormalizeContext { doc, registry };
    walk(&doc.children, None, &mut Vec::new(), &cx)
}

pub fn is_normalized(doc: &Document, registry: &PluginRegistry) -> bool {
    next_fix(doc, registry).is_none()
}

/// Fixes a single node may need while its subtree settles.
const FIXES_PER_NODE: usize = 8;

/// Fix limit for one normalization run over `doc`: `base` plus an allowance
/// per node in the tree.
pub fn fix_budget(doc: &Document, base: usize) -> usize {
    base.saturating_add(doc.node_count().saturating_mul(FIXES_PER_NODE))
}

/// Applies fixes to `doc` until it is clean. Returns the number of fixes.
/// `max_iterations` is the base of the [`fix_budget`].
pub fn normalize_document(
    doc: &mut Document,
    selection: &mut Option<Selection>,
    registry: &PluginRegistry,
    max_iterations: usize,
) -> Result<usize, ApplyError> {
    let budget = fix_budget(doc, max_iterations);
    for applied in 0..budget {
        let Some(fix) = next_fix(doc, registry) else {
            return Ok(applied);
        };
        for op in fix.ops {
            apply_op_to(doc, selection, op)?;
        }
    }
    tracing::error!(
        target: "ndla_editor::normalize",
        budget,
        "normalization did not converge"
    );
    Err(ApplyError::NormalizeDidNotConverge(budget))
}

fn walk(
    children: &[Node],
    parent: Option<&ElementNode>,
    path: &mut Path,
    cx: &NormalizeContext<'_>,
) -> Option<NormalizeFix> {
    for (ix, node) in children.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(ix);
        let fix = walk(&el.children, Some(el), path, cx)
            .or_else(|| check_element(el, children, parent, path, cx));
        path.pop();
        if fix.is_some() {
            return fix;
        }
    }
    None
}

fn check_element(
    el: &ElementNode,
    siblings: &[Node],
    parent: Option<&ElementNode>,
    path: &[usize],
    cx: &NormalizeContext<'_>,
) -> Option<NormalizeFix> {
    let fix = |rule: &'static str, ops: Vec<Op>| NormalizeFix {
        rule,
        path: path.to_vec(),
        ops,
    };

    if let Some((rule, ops)) = cx.registry.normalize_element(el, path, cx) {
        return Some(fix(rule, ops));
    }
    if let Some((rule, ops)) = core_rules(el, path, cx.registry) {
        return Some(fix(rule, ops));
    }
    declarative_rules(el, siblings, parent, path, cx.registry).map(|(rule, ops)| fix(rule, ops))
}

fn core_rules(
    el: &ElementNode,
    path: &[usize],
    registry: &PluginRegistry,
) -> Option<(&'static str, Vec<Op>)> {
    if registry.is_void(&el.kind) {
        return void_children(el, path).map(|ops| ("core.void_children", ops));
    }
    match registry.child_constraint(&el.kind) {
        ChildConstraint::InlineOnly => inline_rules(el, path, registry),
        ChildConstraint::BlockOnly => block_rules(el, path, registry),
        ChildConstraint::Any | ChildConstraint::None => None,
    }
}

fn void_children(el: &ElementNode, path: &[usize]) -> Option<Vec<Op>> {
    let clean = matches!(
        el.children.as_slice(),
        [Node::Text(t)] if t.text.is_empty() && t.marks.is_plain()
    );
    if clean {
        return None;
    }
    let mut ops: Vec<Op> = (0..el.children.len())
        .rev()
        .map(|ix| Op::RemoveNode {
            path: child_path(path, ix),
        })
        .collect();
    ops.push(Op::InsertNode {
        path: child_path(path, 0),
        node: Node::text(""),
    });
    Some(ops)
}

fn is_inline_node(node: &Node, registry: &PluginRegistry) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Element(el) => registry.is_inline(&el.kind),
    }
}

fn is_inline_element(node: &Node, registry: &PluginRegistry) -> bool {
    matches!(node, Node::Element(el) if registry.is_inline(&el.kind))
}

fn inline_rules(
    el: &ElementNode,
    path: &[usize],
    registry: &PluginRegistry,
) -> Option<(&'static str, Vec<Op>)> {
    let children = &el.children;

    if let Some((ix, Node::Element(block))) = children
        .iter()
        .enumerate()
        .find(|(_, node)| !is_inline_node(node, registry))
    {
        let at = child_path(path, ix);
        let mut ops = vec![Op::RemoveNode { path: at }];
        ops.extend(block.children.iter().enumerate().map(|(offset, child)| Op::InsertNode {
            path: child_path(path, ix + offset),
            node: child.clone(),
        }));
        return Some(("core.unwrap_block_in_inline", ops));
    }

    if children.is_empty() {
        return Some((
            "core.text_leaf",
            vec![Op::InsertNode {
                path: child_path(path, 0),
                node: Node::text(""),
            }],
        ));
    }

    // Inline elements always have a text leaf on both sides.
    for ix in 0..=children.len() {
        let before = ix.checked_sub(1).and_then(|i| children.get(i));
        let after = children.get(ix);
        let needs_spacer = match (before, after) {
            (None, Some(node)) | (Some(node), None) => is_inline_element(node, registry),
            (Some(a), Some(b)) => is_inline_element(a, registry) && is_inline_element(b, registry),
            (None, None) => false,
        };
        if needs_spacer {
            return Some((
                "core.inline_spacing",
                vec![Op::InsertNode {
                    path: child_path(path, ix),
                    node: Node::text(""),
                }],
            ));
        }
    }

    for (ix, pair) in children.windows(2).enumerate() {
        let [Node::Text(left), Node::Text(right)] = pair else {
            continue;
        };
        if left.marks != right.marks {
            continue;
        }
        let mut ops = Vec::new();
        if !right.text.is_empty() {
            ops.push(Op::InsertText {
                path: child_path(path, ix),
                offset: left.text.len(),
                text: right.text.clone(),
            });
        }
        ops.push(Op::RemoveNode {
            path: child_path(path, ix + 1),
        });
        return Some(("core.merge_text", ops));
    }

    if children.len() > 1 {
        for (ix, node) in children.iter().enumerate() {
            let Node::Text(t) = node else {
                continue;
            };
            if !t.text.is_empty() {
                continue;
            }
            let before_is_text = ix == 0 || matches!(children[ix - 1], Node::Text(_));
            let after_is_text = children.get(ix + 1).is_none_or(|n| matches!(n, Node::Text(_)));
            if before_is_text && after_is_text {
                return Some((
                    "core.remove_empty_text",
                    vec![Op::RemoveNode {
                        path: child_path(path, ix),
                    }],
                ));
            }
        }
    }

    None
}

fn block_rules(
    el: &ElementNode,
    path: &[usize],
    registry: &PluginRegistry,
) -> Option<(&'static str, Vec<Op>)> {
    let children = &el.children;

    if let Some(start) = children.iter().position(|n| is_inline_node(n, registry)) {
        let end = children[start..]
            .iter()
            .position(|n| !is_inline_node(n, registry))
            .map_or(children.len(), |len| start + len);
        let mut ops: Vec<Op> = (start..end)
            .rev()
            .map(|ix| Op::RemoveNode {
                path: child_path(path, ix),
            })
            .collect();
        ops.push(Op::InsertNode {
            path: child_path(path, start),
            node: Node::element("paragraph", children[start..end].to_vec()),
        });
        return Some(("core.wrap_inline_run", ops));
    }

    if children.is_empty() {
        let kind = registry.default_child_kind(&el.kind)?;
        return Some((
            "core.default_child",
            vec![Op::InsertNode {
                path: child_path(path, 0),
                node: registry.empty_element(kind),
            }],
        ));
    }

    None
}

fn declarative_rules(
    el: &ElementNode,
    siblings: &[Node],
    parent: Option<&ElementNode>,
    path: &[usize],
    registry: &PluginRegistry,
) -> Option<(&'static str, Vec<Op>)> {
    let spec = registry.element_spec(&el.kind)?;
    let config = &spec.normalizer;

    if let Some(rule) = &config.nodes {
        let stray = el.children.iter().position(|child| match child {
            Node::Element(child) => !rule.allowed.contains(&child.kind),
            Node::Text(_) => false,
        });
        if let Some(ix) = stray {
            let at = child_path(path, ix);
            let mut wrapper = ElementNode::new(rule.default_type.clone());
            wrapper.children.push(el.children[ix].clone());
            return Some((
                "config.wrap_child",
                vec![
                    Op::RemoveNode { path: at.clone() },
                    Op::InsertNode {
                        path: at,
                        node: Node::Element(wrapper),
                    },
                ],
            ));
        }
        if el.children.is_empty() {
            return Some((
                "config.default_child",
                vec![Op::InsertNode {
                    path: child_path(path, 0),
                    node: registry.empty_element(&rule.default_type),
                }],
            ));
        }
    }

    let (&ix, _) = path.split_last()?;
    let parent_kind = parent.map(|p| p.kind.as_str());
    let parent_is_block_container = parent_kind
        .is_some_and(|kind| registry.child_constraint(kind) == ChildConstraint::BlockOnly);

    let sibling_rules = [
        (&config.previous, ix.checked_sub(1), ix, "config.previous_sibling"),
        (&config.next, Some(ix + 1), ix + 1, "config.next_sibling"),
    ];
    for (rule, neighbour_ix, insert_ix, name) in sibling_rules {
        let Some(rule) = rule else {
            continue;
        };
        if !parent_is_block_container || !registry.accepts_child(parent_kind, &rule.default_type) {
            continue;
        }
        let neighbour = neighbour_ix.and_then(|i| siblings.get(i));
        let allowed = neighbour
            .and_then(Node::kind)
            .is_some_and(|kind| rule.allowed.iter().any(|k| k == kind));
        if !allowed {
            let parent_path = &path[..path.len() - 1];
            return Some((
                name,
                vec![Op::InsertNode {
                    path: child_path(parent_path, insert_ix),
                    node: registry.empty_element(&rule.default_type),
                }],
            ));
        }
    }

    None
}
