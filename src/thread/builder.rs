//! Render tree construction.
//!
//! Walks a [`ThreadNode`] tree depth first, children in epoch order, and
//! produces a [`RenderTree`]: one render node (with its own placeholder slot)
//! per visited node, plus one [`FetchRequest`] per unique message id in
//! post-order.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{Layout, ThreadNode};
use crate::config::THREAD_PALETTE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderNode {
    pub id: String,
    /// Placeholder index, unique per render node
    pub slot: usize,
    /// 1 for the root
    pub depth: usize,
    /// Indented with a coloured border; false once past the nesting cap
    pub nested: bool,
    /// Hex colour without the leading `#`
    pub color: &'static str,
    pub scroll_into_view: bool,
    pub epoch: i64,
    /// The id already appears on the path above; children were not visited
    pub cycle: bool,
    pub children: Vec<RenderNode>,
}

/// One email to fetch, and the first slot that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub id: String,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct RenderTree {
    pub root: RenderNode,
    pub fetches: Vec<FetchRequest>,
    slots: HashMap<String, Vec<usize>>,
    node_count: usize,
}

impl RenderTree {
    /// Every slot rendering `id`.
    pub fn slots_for(&self, id: &str) -> &[usize] {
        self.slots.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }
}

pub struct ThreadBuilder {
    max_nesting: usize,
}

impl ThreadBuilder {
    pub fn new(layout: &Layout) -> Self {
        Self {
            max_nesting: layout.effective_max_nesting(),
        }
    }

    pub fn build(&self, root: &ThreadNode) -> RenderTree {
        let mut walk = Walk {
            max_nesting: self.max_nesting,
            visited: 0,
            fetched: HashSet::new(),
            path: HashSet::new(),
            fetches: Vec::new(),
            slots: HashMap::new(),
        };
        let root = walk.visit(root, 1);
        tracing::debug!(
            nodes = walk.visited,
            fetches = walk.fetches.len(),
            max_nesting = self.max_nesting,
            "Built render tree"
        );
        RenderTree {
            root,
            fetches: walk.fetches,
            slots: walk.slots,
            node_count: walk.visited,
        }
    }
}

/// State of a single build.
struct Walk<'a> {
    max_nesting: usize,
    visited: usize,
    fetched: HashSet<&'a str>,
    path: HashSet<&'a str>,
    fetches: Vec<FetchRequest>,
    slots: HashMap<String, Vec<usize>>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, node: &'a ThreadNode, depth: usize) -> RenderNode {
        let slot = self.visited;
        self.visited += 1;
        let color = THREAD_PALETTE[self.visited % THREAD_PALETTE.len()];
        self.slots.entry(node.id.clone()).or_default().push(slot);

        let id = node.id.as_str();
        let cycle = !id.is_empty() && self.path.contains(id);
        let mut children = Vec::new();
        if cycle {
            tracing::warn!(%id, depth, "Thread contains a reply cycle, not descending");
        } else {
            if !id.is_empty() {
                self.path.insert(id);
            }
            let mut ordered: Vec<&'a ThreadNode> = node.children.iter().collect();
            ordered.sort_by_key(|child| child.epoch);
            for child in ordered {
                children.push(self.visit(child, depth + 1));
            }
            self.path.remove(id);
        }

        if !id.is_empty() && self.fetched.insert(id) {
            self.fetches.push(FetchRequest {
                id: id.to_string(),
                slot,
            });
        }

        RenderNode {
            id: node.id.clone(),
            slot,
            depth,
            nested: depth <= self.max_nesting,
            color,
            scroll_into_view: slot == 0,
            epoch: node.epoch,
            cycle,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(root: &ThreadNode) -> RenderTree {
        ThreadBuilder::new(&Layout::new(1200, 10)).build(root)
    }

    fn flatten(node: &RenderNode, out: &mut Vec<RenderNode>) {
        out.push(node.clone());
        for child in &node.children {
            flatten(child, out);
        }
    }

    fn chain(len: usize) -> ThreadNode {
        let mut node = ThreadNode::new(format!("m{}", len - 1), (len - 1) as i64);
        for i in (0..len - 1).rev() {
            node = ThreadNode::new(format!("m{}", i), i as i64).with_children(vec![node]);
        }
        node
    }

    #[test]
    fn test_duplicate_ids_fetched_once() {
        let root = ThreadNode::new("A", 1).with_children(vec![
            ThreadNode::new("B", 2),
            ThreadNode::new("B", 3),
        ]);
        let tree = build(&root);

        let ids: Vec<&str> = tree.fetches.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(tree.slots_for("B").len(), 2);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_children_sorted_by_epoch() {
        let root = ThreadNode::new("root", 0).with_children(vec![
            ThreadNode::new("late", 300),
            ThreadNode::new("early", 100),
            ThreadNode::new("middle", 200),
        ]);
        let tree = build(&root);
        let order: Vec<&str> = tree.root.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_epoch_ties_keep_input_order() {
        let root = ThreadNode::new("root", 0).with_children(vec![
            ThreadNode::new("first", 5),
            ThreadNode::new("second", 5),
        ]);
        let tree = build(&root);
        assert_eq!(tree.root.children[0].id, "first");
        assert_eq!(tree.root.children[1].id, "second");
    }

    #[test]
    fn test_fetches_are_post_order() {
        let root = ThreadNode::new("r", 0).with_children(vec![
            ThreadNode::new("a", 1).with_children(vec![ThreadNode::new("a1", 2)]),
            ThreadNode::new("b", 3),
        ]);
        let tree = build(&root);
        let ids: Vec<&str> = tree.fetches.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a", "b", "r"]);
    }

    #[test]
    fn test_only_root_scrolls() {
        let tree = build(&chain(4));
        let mut nodes = Vec::new();
        flatten(&tree.root, &mut nodes);
        assert!(nodes[0].scroll_into_view);
        assert!(nodes[1..].iter().all(|n| !n.scroll_into_view));
    }

    #[test]
    fn test_colours_follow_visitation_order() {
        let root = ThreadNode::new("r", 0).with_children(vec![
            ThreadNode::new("a", 1).with_children(vec![ThreadNode::new("a1", 2)]),
            ThreadNode::new("b", 3),
        ]);
        let tree = build(&root);
        let mut nodes = Vec::new();
        flatten(&tree.root, &mut nodes);
        let colours: Vec<&str> = nodes.iter().map(|n| n.color).collect();
        // Visit order r, a, a1, b; the counter is bumped before it is read.
        assert_eq!(colours, vec!["ccab0a", "c04331", "169e4e", "6d4ca5"]);
    }

    #[test]
    fn test_palette_wraps() {
        let tree = build(&chain(6));
        let mut nodes = Vec::new();
        flatten(&tree.root, &mut nodes);
        assert_eq!(nodes[4].color, "286090");
        assert_eq!(nodes[5].color, "ccab0a");
    }

    #[test]
    fn test_nesting_cap() {
        let n = 3;
        let builder = ThreadBuilder::new(&Layout::new(1200, n));
        let tree = builder.build(&chain(n + 5));
        let mut nodes = Vec::new();
        flatten(&tree.root, &mut nodes);

        for node in &nodes {
            assert_eq!(node.nested, node.depth <= n, "depth {}", node.depth);
        }
        assert_eq!(nodes.iter().filter(|n| n.nested).count(), n);
        assert_eq!(nodes.last().unwrap().depth, n + 5);
    }

    #[test]
    fn test_narrow_width_caps_nesting() {
        let builder = ThreadBuilder::new(&Layout::new(500, 10));
        let tree = builder.build(&chain(5));
        let mut nodes = Vec::new();
        flatten(&tree.root, &mut nodes);
        assert_eq!(nodes.iter().filter(|n| n.nested).count(), 2);
    }

    #[test]
    fn test_cycle_is_cut() {
        let root = ThreadNode::new("a", 0).with_children(vec![ThreadNode::new("b", 1)
            .with_children(vec![ThreadNode::new("a", 2).with_children(vec![
                ThreadNode::new("c", 3),
            ])])]);
        let tree = build(&root);

        let looped = &tree.root.children[0].children[0];
        assert!(looped.cycle);
        assert!(looped.children.is_empty());
        assert_eq!(tree.slots_for("a").len(), 2);
        assert!(tree.slots_for("c").is_empty());
        let ids: Vec<&str> = tree.fetches.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_id_is_rendered_not_fetched() {
        let root = ThreadNode::new("r", 0).with_children(vec![ThreadNode::new("", 1)]);
        let tree = build(&root);
        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.fetches.len(), 1);
    }

    #[test]
    fn test_each_build_has_fresh_state() {
        let builder = ThreadBuilder::new(&Layout::new(1200, 10));
        let root = ThreadNode::new("r", 0);
        let first = builder.build(&root);
        let second = builder.build(&root);
        assert_eq!(first.fetches, second.fetches);
        assert_eq!(first.root.color, second.root.color);
    }
}
