//! Signal hierarchy built from dot-delimited names.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`]. Node 0 is
//! an unnamed root. Visibility is stored per node; for interior nodes it is
//! derived from the direct children and re-derived before any mutation returns.
//! A signal whose name is also a scope (`top.a` next to `top.a.b`) keeps its
//! own flag, which counts as one more child of that node.

use crate::dataflow::{EventBus, ViewerEvent};
use indexmap::IndexMap;
use shared::Signal;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    Hidden,
    /// Some, but not all, direct children are visible.
    Mixed,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Visibility::Visible
    }

    fn from_children(children: impl Iterator<Item = Visibility>) -> Option<Visibility> {
        let mut any_visible = false;
        let mut any_hidden = false;
        let mut any = false;
        for child in children {
            any = true;
            match child {
                Visibility::Visible => any_visible = true,
                Visibility::Hidden => any_hidden = true,
                Visibility::Mixed => return Some(Visibility::Mixed),
            }
        }
        if !any {
            return None;
        }
        Some(match (any_visible, any_hidden) {
            (true, false) => Visibility::Visible,
            (false, _) => Visibility::Hidden,
            (true, true) => Visibility::Mixed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub segment: String,
    /// Full dot-delimited path; empty for the root.
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: IndexMap<String, NodeId>,
    pub signal: Option<Rc<Signal>>,
    /// Render-eligibility of `signal` itself.
    pub signal_visible: bool,
    pub expanded: bool,
    pub visibility: Visibility,
}

impl HierarchyNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Row of the hierarchy panel: a node and its depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow {
    pub node: NodeId,
    pub depth: usize,
}

#[derive(Debug)]
pub struct HierarchyTree {
    nodes: Vec<HierarchyNode>,
    bus: EventBus,
}

impl HierarchyTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new(bus: EventBus) -> Self {
        Self {
            nodes: vec![HierarchyNode {
                segment: String::new(),
                path: String::new(),
                parent: None,
                children: IndexMap::new(),
                signal: None,
                signal_visible: true,
                expanded: true,
                visibility: Visibility::Visible,
            }],
            bus,
        }
    }

    /// Rebuilds the tree from `signals`, in their order. Everything starts visible and collapsed.
    pub fn build(&mut self, signals: &[Rc<Signal>]) {
        self.nodes.truncate(1);
        self.nodes[0].children.clear();
        self.nodes[0].visibility = Visibility::Visible;

        for signal in signals {
            let mut current = Self::ROOT;
            let mut segments = signal.name.split('.').filter(|segment| !segment.is_empty()).peekable();
            while let Some(segment) = segments.next() {
                current = self.child_or_insert(current, segment);
                if segments.peek().is_none() {
                    self.nodes[current.0].signal = Some(signal.clone());
                }
            }
        }
        log::debug!("Built hierarchy with {} nodes", self.nodes.len());
    }

    fn child_or_insert(&mut self, parent: NodeId, segment: &str) -> NodeId {
        if let Some(&id) = self.nodes[parent.0].children.get(segment) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        let parent_path = &self.nodes[parent.0].path;
        let path = if parent_path.is_empty() {
            segment.to_string()
        } else {
            format!("{parent_path}.{segment}")
        };
        self.nodes.push(HierarchyNode {
            segment: segment.to_string(),
            path,
            parent: Some(parent),
            children: IndexMap::new(),
            signal: None,
            signal_visible: true,
            expanded: false,
            visibility: Visibility::Visible,
        });
        self.nodes[parent.0].children.insert(segment.to_string(), id);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(Self::ROOT, |current, segment| {
                self.nodes[current.0].children.get(segment).copied()
            })
    }

    pub fn visibility(&self, id: NodeId) -> Option<Visibility> {
        self.node(id).map(|node| node.visibility)
    }

    /// Sets `id` and all descendants, then re-derives every ancestor.
    /// Returns false for unknown nodes and when nothing changed.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> bool {
        let Some(node) = self.nodes.get(id.0) else {
            return false;
        };
        let target = if visible {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };

        let mut changed = node.visibility != target;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            if node.visibility != target {
                node.visibility = target;
                changed = true;
            }
            node.signal_visible = visible;
            stack.extend(node.children.values().copied());
        }

        let mut ancestor = self.nodes[id.0].parent;
        while let Some(current) = ancestor {
            if let Some(derived) = self.derive(current) {
                self.nodes[current.0].visibility = derived;
            }
            ancestor = self.nodes[current.0].parent;
        }

        if changed {
            let node = &self.nodes[id.0];
            self.bus.publish(ViewerEvent::VisibilityChanged {
                node: id,
                path: node.path.clone(),
                visibility: node.visibility,
            });
        }
        changed
    }

    fn derive(&self, id: NodeId) -> Option<Visibility> {
        let node = &self.nodes[id.0];
        let own = node.signal.as_ref().map(|_| {
            if node.signal_visible {
                Visibility::Visible
            } else {
                Visibility::Hidden
            }
        });
        Visibility::from_children(
            node.children
                .values()
                .map(|child| self.nodes[child.0].visibility)
                .chain(own),
        )
    }

    pub fn toggle_visible(&mut self, id: NodeId) -> bool {
        match self.visibility(id) {
            Some(visibility) => self.set_visible(id, !visibility.is_visible()),
            None => false,
        }
    }

    pub fn show_all(&mut self) -> bool {
        self.set_visible(Self::ROOT, true)
    }

    pub fn hide_all(&mut self) -> bool {
        self.set_visible(Self::ROOT, false)
    }

    /// Leaf signals under `id` whose own node and ancestors are render-eligible,
    /// in pre-order. Hidden subtrees are skipped without being walked.
    pub fn collect_visible(&self, id: NodeId) -> Vec<Rc<Signal>> {
        let mut signals = Vec::new();
        if self.nodes.get(id.0).is_none() || !self.ancestors_allow(id) {
            return signals;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if node.visibility == Visibility::Hidden {
                continue;
            }
            if let Some(signal) = &node.signal {
                if node.signal_visible {
                    signals.push(signal.clone());
                }
            }
            stack.extend(node.children.values().rev().copied());
        }
        signals
    }

    fn ancestors_allow(&self, id: NodeId) -> bool {
        let mut ancestor = self.nodes[id.0].parent;
        while let Some(current) = ancestor {
            if self.nodes[current.0].visibility == Visibility::Hidden {
                return false;
            }
            ancestor = self.nodes[current.0].parent;
        }
        true
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(node) if node.expanded != expanded => {
                node.expanded = expanded;
                true
            }
            _ => false,
        }
    }

    pub fn toggle_expanded(&mut self, id: NodeId) -> bool {
        match self.nodes.get(id.0).map(|node| node.expanded) {
            Some(expanded) => self.set_expanded(id, !expanded),
            None => false,
        }
    }

    /// Rows of the hierarchy panel: every node reachable through expanded parents.
    pub fn expanded_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        let mut stack: Vec<TreeRow> = self.nodes[0]
            .children
            .values()
            .rev()
            .map(|&node| TreeRow { node, depth: 0 })
            .collect();
        while let Some(row) = stack.pop() {
            rows.push(row);
            let node = &self.nodes[row.node.0];
            if node.expanded {
                stack.extend(node.children.values().rev().map(|&child| TreeRow {
                    node: child,
                    depth: row.depth + 1,
                }));
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::EventKind;
    use std::cell::Cell;

    fn signals(names: &[&str]) -> Vec<Rc<Signal>> {
        names
            .iter()
            .map(|name| Rc::new(Signal::new(*name, Vec::new())))
            .collect()
    }

    fn tree(names: &[&str]) -> HierarchyTree {
        let mut tree = HierarchyTree::new(EventBus::new());
        tree.build(&signals(names));
        tree
    }

    fn names(signals: Vec<Rc<Signal>>) -> Vec<String> {
        signals.iter().map(|signal| signal.name.clone()).collect()
    }

    const NAMES: [&str; 4] = ["top.cpu.clk", "top.cpu.pc", "top.mem.addr", "top.rst"];

    #[test]
    fn builds_shared_prefixes_once() {
        let tree = tree(&NAMES);
        // root, top, cpu, clk, pc, mem, addr, rst
        assert_eq!(tree.len(), 8);
        let cpu = tree.find("top.cpu").unwrap();
        assert_eq!(tree.node(cpu).unwrap().children.len(), 2);
        assert!(tree.node(tree.find("top.rst").unwrap()).unwrap().signal.is_some());
        assert_eq!(tree.find("top.gpu"), None);
    }

    #[test]
    fn hiding_root_hides_everything() {
        let mut tree = tree(&NAMES);
        tree.set_visible(HierarchyTree::ROOT, false);
        assert!(tree.collect_visible(HierarchyTree::ROOT).is_empty());

        tree.set_visible(HierarchyTree::ROOT, true);
        assert_eq!(names(tree.collect_visible(HierarchyTree::ROOT)), NAMES);
    }

    #[test]
    fn ancestors_track_tri_state() {
        let mut tree = tree(&NAMES);
        let top = tree.find("top").unwrap();
        let cpu = tree.find("top.cpu").unwrap();
        let clk = tree.find("top.cpu.clk").unwrap();

        tree.set_visible(clk, false);
        assert_eq!(tree.visibility(cpu), Some(Visibility::Mixed));
        assert_eq!(tree.visibility(top), Some(Visibility::Mixed));
        assert_eq!(
            names(tree.collect_visible(HierarchyTree::ROOT)),
            ["top.cpu.pc", "top.mem.addr", "top.rst"]
        );

        tree.set_visible(clk, true);
        assert_eq!(tree.visibility(cpu), Some(Visibility::Visible));
        assert_eq!(tree.visibility(top), Some(Visibility::Visible));
        assert_eq!(tree.visibility(HierarchyTree::ROOT), Some(Visibility::Visible));
    }

    #[test]
    fn all_children_hidden_hides_parent() {
        let mut tree = tree(&NAMES);
        let cpu = tree.find("top.cpu").unwrap();
        tree.set_visible(tree.find("top.cpu.clk").unwrap(), false);
        tree.set_visible(tree.find("top.cpu.pc").unwrap(), false);
        assert_eq!(tree.visibility(cpu), Some(Visibility::Hidden));
    }

    #[test]
    fn hidden_subtree_is_pruned() {
        let mut tree = tree(&NAMES);
        let cpu = tree.find("top.cpu").unwrap();
        tree.set_visible(cpu, false);
        assert!(tree.collect_visible(cpu).is_empty());
        assert_eq!(
            names(tree.collect_visible(HierarchyTree::ROOT)),
            ["top.mem.addr", "top.rst"]
        );
    }

    #[test]
    fn signal_named_like_a_scope_keeps_its_own_visibility() {
        let mut tree = tree(&["top.a", "top.a.b"]);
        let a = tree.find("top.a").unwrap();
        let b = tree.find("top.a.b").unwrap();
        assert_eq!(names(tree.collect_visible(HierarchyTree::ROOT)), ["top.a", "top.a.b"]);

        tree.set_visible(b, false);
        assert_eq!(tree.visibility(a), Some(Visibility::Mixed));
        assert_eq!(names(tree.collect_visible(HierarchyTree::ROOT)), ["top.a"]);

        tree.set_visible(b, true);
        assert_eq!(tree.visibility(a), Some(Visibility::Visible));
        tree.set_visible(a, false);
        assert!(tree.collect_visible(HierarchyTree::ROOT).is_empty());
        assert_eq!(tree.visibility(HierarchyTree::ROOT), Some(Visibility::Hidden));
    }

    #[test]
    fn visibility_change_is_published_once() {
        let bus = EventBus::new();
        let events = Rc::new(Cell::new(0));
        let seen = events.clone();
        bus.subscribe(EventKind::VisibilityChanged, move |_| {
            seen.set(seen.get() + 1);
            Ok(())
        });
        let mut tree = HierarchyTree::new(bus);
        tree.build(&signals(&NAMES));

        let top = tree.find("top").unwrap();
        assert!(tree.set_visible(top, false));
        assert!(!tree.set_visible(top, false));
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn expanded_rows_follow_fold_state() {
        let mut tree = tree(&NAMES);
        assert_eq!(tree.expanded_rows().len(), 1);

        let top = tree.find("top").unwrap();
        tree.toggle_expanded(top);
        let rows: Vec<String> = tree
            .expanded_rows()
            .iter()
            .map(|row| tree.node(row.node).unwrap().path.clone())
            .collect();
        assert_eq!(rows, ["top", "top.cpu", "top.mem", "top.rst"]);
    }
}
