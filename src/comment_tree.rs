//! Threaded comment layout
//!
//! Rebuilds the reply tree of a thread from its flat comment rows. Roots are
//! comments without a parent or whose parent is not in the set (deleted, or
//! from another thread). Siblings sort by score descending, then creation
//! time and id ascending. Building never mutates anything and can be redone
//! on every read.

use crate::orm::dialogue_comments;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// What the tree needs to know about a comment.
pub trait TreeNode {
    fn node_id(&self) -> i32;
    fn parent_id(&self) -> Option<i32>;
    fn score(&self) -> i32;
    fn created_at(&self) -> NaiveDateTime;
}

impl TreeNode for dialogue_comments::Model {
    fn node_id(&self) -> i32 {
        self.id
    }

    fn parent_id(&self) -> Option<i32> {
        self.parent_id
    }

    fn score(&self) -> i32 {
        self.score
    }

    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }
}

fn sibling_order<T: TreeNode>(a: &T, b: &T) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.node_id().cmp(&b.node_id()))
}

/// One entry of a depth-first rendering.
#[derive(Debug, Clone, Serialize)]
pub struct FlatEntry<'a, T> {
    pub depth: usize,
    pub comment: &'a T,
}

#[derive(Debug)]
pub struct CommentTree<T> {
    nodes: Vec<T>,
    roots: Vec<usize>,
    children: HashMap<i32, Vec<usize>>,
}

impl<T: TreeNode> CommentTree<T> {
    pub fn build(nodes: Vec<T>) -> Self {
        let index: HashMap<i32, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id(), i))
            .collect();

        let mut roots = Vec::new();
        let mut children: HashMap<i32, Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.parent_id() {
                Some(parent) if parent != node.node_id() && index.contains_key(&parent) => {
                    children.entry(parent).or_default().push(i);
                }
                _ => roots.push(i),
            }
        }

        // Comments on a parent cycle never reach a root; promote one
        // member of each such cycle so every comment is reachable.
        let mut reachable: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = roots.clone();
        while let Some(i) = stack.pop() {
            if reachable.insert(i) {
                if let Some(kids) = children.get(&nodes[i].node_id()) {
                    stack.extend(kids.iter().copied());
                }
            }
        }
        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by(|&a, &b| sibling_order(&nodes[a], &nodes[b]));
        for i in order {
            if reachable.contains(&i) {
                continue;
            }
            log::warn!(
                "Comment {} is part of a reply cycle, showing it as a root",
                nodes[i].node_id()
            );
            if let Some(parent) = nodes[i].parent_id() {
                if let Some(siblings) = children.get_mut(&parent) {
                    siblings.retain(|&c| c != i);
                }
            }
            roots.push(i);
            let mut stack = vec![i];
            while let Some(j) = stack.pop() {
                if reachable.insert(j) {
                    if let Some(kids) = children.get(&nodes[j].node_id()) {
                        stack.extend(kids.iter().copied());
                    }
                }
            }
        }

        roots.sort_by(|&a, &b| sibling_order(&nodes[a], &nodes[b]));
        for kids in children.values_mut() {
            kids.sort_by(|&a, &b| sibling_order(&nodes[a], &nodes[b]));
        }

        Self {
            nodes,
            roots,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top level comments in display order.
    pub fn roots(&self) -> Vec<&T> {
        self.roots.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Direct replies to `id` in display order.
    pub fn children_of(&self, id: i32) -> Vec<&T> {
        self.children
            .get(&id)
            .map(|kids| kids.iter().map(|&i| &self.nodes[i]).collect())
            .unwrap_or_default()
    }

    /// Depth-first, pre-order listing with nesting depth.
    pub fn flatten(&self) -> Vec<FlatEntry<'_, T>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&i| (i, 0)).collect();
        let mut visited: HashSet<usize> = HashSet::new();

        while let Some((i, depth)) = stack.pop() {
            if !visited.insert(i) {
                continue;
            }
            let node = &self.nodes[i];
            out.push(FlatEntry {
                depth,
                comment: node,
            });
            if let Some(kids) = self.children.get(&node.node_id()) {
                stack.extend(kids.iter().rev().map(|&k| (k, depth + 1)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Debug, Clone)]
    struct C {
        id: i32,
        parent: Option<i32>,
        score: i32,
        minute: u32,
    }

    impl TreeNode for C {
        fn node_id(&self) -> i32 {
            self.id
        }
        fn parent_id(&self) -> Option<i32> {
            self.parent
        }
        fn score(&self) -> i32 {
            self.score
        }
        fn created_at(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, self.minute, 0)
                .unwrap()
        }
    }

    fn c(id: i32, parent: Option<i32>, score: i32, minute: u32) -> C {
        C {
            id,
            parent,
            score,
            minute,
        }
    }

    fn ids(nodes: Vec<&C>) -> Vec<i32> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_roots_sorted_by_score_then_age() {
        let tree = CommentTree::build(vec![
            c(1, None, 0, 1),
            c(2, None, 5, 2),
            c(3, None, 0, 0),
            c(4, Some(2), 9, 3),
        ]);
        assert_eq!(ids(tree.roots()), vec![2, 3, 1]);
        assert_eq!(ids(tree.children_of(2)), vec![4]);
        assert!(tree.children_of(1).is_empty());
    }

    #[test]
    fn test_dangling_parent_becomes_root() {
        let tree = CommentTree::build(vec![c(1, None, 0, 0), c(2, Some(99), 3, 1)]);
        assert_eq!(ids(tree.roots()), vec![2, 1]);
    }

    #[test]
    fn test_children_sorted() {
        let tree = CommentTree::build(vec![
            c(1, None, 0, 0),
            c(2, Some(1), -1, 1),
            c(3, Some(1), 2, 2),
            c(4, Some(1), 2, 1),
        ]);
        assert_eq!(ids(tree.children_of(1)), vec![4, 3, 2]);
    }

    #[test]
    fn test_flatten_depths() {
        let tree = CommentTree::build(vec![
            c(1, None, 1, 0),
            c(2, Some(1), 0, 1),
            c(3, Some(2), 0, 2),
            c(4, None, 0, 3),
        ]);
        let flat: Vec<(i32, usize)> = tree
            .flatten()
            .iter()
            .map(|e| (e.comment.id, e.depth))
            .collect();
        assert_eq!(flat, vec![(1, 0), (2, 1), (3, 2), (4, 0)]);
    }

    #[test]
    fn test_cycle_is_promoted() {
        let tree = CommentTree::build(vec![
            c(1, Some(2), 0, 0),
            c(2, Some(1), 0, 1),
            c(3, Some(3), 0, 2),
        ]);
        // self-parented comment is a root, and one member of the 1<->2 cycle
        let roots = ids(tree.roots());
        assert_eq!(roots.len(), 2);
        assert!(roots.contains(&3));
        assert_eq!(tree.flatten().len(), 3);
    }

    #[test]
    fn test_empty() {
        let tree: CommentTree<C> = CommentTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert!(tree.flatten().is_empty());
    }
}
