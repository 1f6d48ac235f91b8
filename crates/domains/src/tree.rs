//! # Forest structure
//!
//! Categories and comments are stored as nested sets. Every node carries a
//! [`TreePosition`]: `tree_id` orders the roots, and `lft`/`rght` bound the
//! node's subtree inside its tree. A node `d` is a descendant of `a` exactly
//! when both share `tree_id` and `a.lft < d.lft < a.rght`, so subtree,
//! ancestor and sibling questions are range queries rather than walks.
//!
//! This module holds the pure part of the scheme: where a node goes among
//! its siblings, and how a depth-first listing folds back into nested nodes.
//! The storage adapter applies the boundary arithmetic inside a transaction.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Category, Comment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TreePosition {
    pub tree_id: i64,
    pub lft: i64,
    pub rght: i64,
    /// Depth; roots are level 0.
    pub level: i64,
}

impl TreePosition {
    /// Position of a lone root in tree `tree_id`.
    pub fn root(tree_id: i64) -> Self {
        Self {
            tree_id,
            lft: 1,
            rght: 2,
            level: 0,
        }
    }

    /// Number of boundary slots the subtree occupies.
    pub fn width(&self) -> i64 {
        self.rght - self.lft + 1
    }

    /// True when `other` is this node or lies in its subtree.
    pub fn contains(&self, other: &TreePosition) -> bool {
        self.tree_id == other.tree_id && self.lft <= other.lft && other.rght <= self.rght
    }
}

/// Anything stored as a forest node.
pub trait TreeItem {
    type Key: Ord;

    fn node_id(&self) -> Uuid;
    fn position(&self) -> &TreePosition;
    /// Sibling ordering key; smaller keys come first.
    fn sort_key(&self) -> Self::Key;
}

/// Categories sort by title, case-insensitively first so "apple" and
/// "Apple" end up next to each other, then by exact title.
pub fn category_key(title: &str, id: Uuid) -> (String, String, Uuid) {
    (title.to_lowercase(), title.to_owned(), id)
}

/// Comments sort newest first.
pub fn comment_key(created_at: DateTime<Utc>, id: Uuid) -> Reverse<(DateTime<Utc>, Uuid)> {
    Reverse((created_at, id))
}

impl TreeItem for Category {
    type Key = (String, String, Uuid);

    fn node_id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> &TreePosition {
        &self.position
    }

    fn sort_key(&self) -> Self::Key {
        category_key(&self.title, self.id)
    }
}

impl TreeItem for Comment {
    type Key = Reverse<(DateTime<Utc>, Uuid)>;

    fn node_id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> &TreePosition {
        &self.position
    }

    fn sort_key(&self) -> Self::Key {
        comment_key(self.created_at, self.id)
    }
}

/// Where a (parked) subtree gets attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Take the slot of this sibling, shifting it and everything after it.
    Before(TreePosition),
    /// Become the last child of this parent.
    LastChildOf(TreePosition),
    /// Become a root ordered just before tree `tree_id`.
    RootBefore(i64),
    /// Become the last root.
    RootLast,
}

/// Picks the slot for a node with `key` among `siblings`, which must be in
/// stored order (by `lft` for children, by `tree_id` for roots) and must not
/// include the node itself. `parent` is `None` for roots.
pub fn placement_among<T: TreeItem>(
    siblings: &[T],
    key: &T::Key,
    parent: Option<TreePosition>,
) -> Placement {
    let next = siblings
        .iter()
        .find(|sibling| sibling.sort_key().cmp(key) == Ordering::Greater);

    match (next, parent) {
        (Some(sibling), Some(_)) => Placement::Before(*sibling.position()),
        (Some(sibling), None) => Placement::RootBefore(sibling.position().tree_id),
        (None, Some(parent)) => Placement::LastChildOf(parent),
        (None, None) => Placement::RootLast,
    }
}

/// A node together with its ordered children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub children: Vec<TreeNode<T>>,
}

/// Folds a depth-first listing (ordered by `tree_id`, then `lft`) into
/// nested nodes in one pass. Nodes whose ancestors are missing from the
/// listing become roots of the result.
pub fn build_forest<T: TreeItem>(items: Vec<T>) -> Vec<TreeNode<T>> {
    let mut roots: Vec<TreeNode<T>> = Vec::new();
    // Open ancestors, innermost last.
    let mut stack: Vec<TreeNode<T>> = Vec::new();

    for item in items {
        while let Some(top) = stack.last() {
            if top.item.position().contains(item.position()) {
                break;
            }
            close_top(&mut stack, &mut roots);
        }
        stack.push(TreeNode {
            item,
            children: Vec::new(),
        });
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }
    roots
}

fn close_top<T>(stack: &mut Vec<TreeNode<T>>, roots: &mut Vec<TreeNode<T>>) {
    if let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

/// Drops every node that fails `keep`, together with its whole subtree.
/// Expects the same depth-first order as [`build_forest`].
pub fn prune_subtrees<T: TreeItem>(items: Vec<T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut hidden: Option<TreePosition> = None;
    items
        .into_iter()
        .filter(|item| {
            if let Some(cut) = hidden {
                if cut.contains(item.position()) {
                    return false;
                }
                hidden = None;
            }
            if keep(item) {
                true
            } else {
                hidden = Some(*item.position());
                false
            }
        })
        .collect()
}

/// Checks the nested-set invariants of a depth-first listing of one whole
/// forest: proper nesting, contiguous boundaries per tree and levels that
/// match the nesting depth. Returns a description of the first violation.
pub fn verify_forest<T: TreeItem>(items: &[T]) -> Result<(), String> {
    let mut open: Vec<(Uuid, TreePosition)> = Vec::new();
    let mut next_boundary = 1;
    let mut current_tree = None;

    for item in items {
        let pos = *item.position();
        if pos.lft >= pos.rght {
            return Err(format!("{}: lft {} >= rght {}", item.node_id(), pos.lft, pos.rght));
        }
        if current_tree != Some(pos.tree_id) {
            close_until(&mut open, &mut next_boundary, None)?;
            current_tree = Some(pos.tree_id);
            next_boundary = 1;
        }
        close_until(&mut open, &mut next_boundary, Some(&pos))?;
        if pos.lft != next_boundary {
            return Err(format!(
                "{}: expected lft {}, found {}",
                item.node_id(),
                next_boundary,
                pos.lft
            ));
        }
        if pos.level != open.len() as i64 {
            return Err(format!(
                "{}: level {} at depth {}",
                item.node_id(),
                pos.level,
                open.len()
            ));
        }
        next_boundary = pos.lft + 1;
        open.push((item.node_id(), pos));
    }
    close_until(&mut open, &mut next_boundary, None)
}

/// Closes open nodes until the innermost one contains `pos` (or all of them
/// when `pos` is `None`), checking each closes right after its last child.
fn close_until(
    open: &mut Vec<(Uuid, TreePosition)>,
    next_boundary: &mut i64,
    pos: Option<&TreePosition>,
) -> Result<(), String> {
    while let Some((id, top)) = open.last().copied() {
        if pos.is_some_and(|pos| top.contains(pos)) {
            break;
        }
        if top.rght != *next_boundary {
            return Err(format!("{id}: expected rght {}, found {}", next_boundary, top.rght));
        }
        *next_boundary = top.rght + 1;
        open.pop();
    }
    Ok(())
}
