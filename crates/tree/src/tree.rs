//! The expression tree: arena-allocated nodes with append-only growth.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; child slots live in a
//! second arena so a node's slot block can be swapped for a bigger one
//! without moving the node. A tree is released wholesale by dropping it.
//! Fallible edits stage their allocations first and attach last, so a
//! failed edit leaves the reachable tree unchanged; [`Tree::checkpoint`]
//! rewinds staged allocations.

use crate::node::{ChildRange, Node, NodeId, OpArg, OpClass};
use crate::TreeError;

/// Extra null slots kept after the requested children so a sibling can be
/// appended without an immediate reallocation.
const CHILD_SLACK: usize = 2;

/// Snapshot of the arena high-water marks, used to rewind staged
/// allocations on a failed edit.
#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    nodes: usize,
    slots: usize,
    root: Option<NodeId>,
}

/// Occurrence index for a caller-chosen set of variables, filled while a
/// tree is copied.
#[derive(Clone, Debug, Default)]
pub struct VarTree {
    entries: Vec<(u32, Vec<NodeId>)>,
}

impl VarTree {
    /// Creates an empty index over the given variable ids.
    ///
    /// The ids are kept sorted; a repeated id is a
    /// [`TreeError::DuplicateVar`].
    pub fn new(vars: &[u32]) -> Result<Self, TreeError> {
        let mut entries: Vec<(u32, Vec<NodeId>)> = Vec::with_capacity(vars.len());
        for &var in vars {
            match entries.binary_search_by_key(&var, |e| e.0) {
                Ok(_) => return Err(TreeError::DuplicateVar { var }),
                Err(at) => entries.insert(at, (var, Vec::new())),
            }
        }
        Ok(Self { entries })
    }

    /// Nodes where `var` occurs, if `var` is part of the index.
    pub fn nodes_of(&self, var: u32) -> Result<&[NodeId], TreeError> {
        self.entries
            .binary_search_by_key(&var, |e| e.0)
            .map(|at| self.entries[at].1.as_slice())
            .map_err(|_| TreeError::VarNotFound { var })
    }

    fn record(&mut self, var: u32, node: NodeId) {
        if let Ok(at) = self.entries.binary_search_by_key(&var, |e| e.0) {
            self.entries[at].1.push(node);
        }
    }
}

/// An expression tree owned by one equation.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    slots: Vec<Option<NodeId>>,
    root: Option<NodeId>,
    equ_idx: Option<i32>,
    /// Variables touched by copy and append edits since the last reset.
    v_list: Vec<u32>,
    vt: Option<VarTree>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tree with arenas pre-sized for an estimated number
    /// of nodes.
    pub fn with_capacity(n_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(n_nodes),
            slots: Vec::with_capacity(2 * n_nodes),
            ..Self::default()
        }
    }

    /// Creates a tree for an equation with an `ADD` root pre-sized for
    /// `n_children` operands.
    pub fn bootstrap(equ_idx: i32, n_nodes: usize, n_children: usize) -> Self {
        let mut tree = Self::with_capacity(n_nodes.max(n_children));
        tree.equ_idx = Some(equ_idx);
        let root = tree.alloc_node(OpClass::Add, n_children);
        tree.root = Some(root);
        tree
    }

    /// The root node, `None` for an empty tree.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Replaces the root.
    pub fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// The 1-based equation index this tree belongs to.
    pub fn equ_idx(&self) -> Option<i32> {
        self.equ_idx
    }

    /// Sets the owning equation index.
    pub fn set_equ_idx(&mut self, equ_idx: i32) {
        self.equ_idx = Some(equ_idx);
    }

    /// Number of allocated nodes, unreachable ones included.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Immutable node access.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutable node access.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// The child slots of a node; unoccupied slots are `None`.
    pub fn children(&self, id: NodeId) -> &[Option<NodeId>] {
        let range = self.nodes[id.index()].children;
        &self.slots[range.offset as usize..(range.offset + range.cap) as usize]
    }

    /// Iterates over the occupied child slots of a node.
    pub fn child_ids(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().filter_map(|c| *c)
    }

    /// The child at `idx`.
    pub fn child(&self, id: NodeId, idx: usize) -> Option<NodeId> {
        self.children(id)[idx]
    }

    /// Writes the child slot `idx` of `id`.
    pub fn set_child(&mut self, id: NodeId, idx: usize, child: Option<NodeId>) {
        let range = self.nodes[id.index()].children;
        assert!(idx < range.cap as usize, "child index out of range");
        self.slots[range.offset as usize + idx] = child;
    }

    /// Allocates a node with `len` child slots plus slack for cheap
    /// sibling insertion.
    pub fn alloc_node(&mut self, op: OpClass, len: usize) -> NodeId {
        self.alloc_with(op, len, len + CHILD_SLACK)
    }

    /// Allocates a node with exactly `len` child slots.
    pub fn alloc_fixed(&mut self, op: OpClass, len: usize) -> NodeId {
        self.alloc_with(op, len, len)
    }

    /// Allocates a childless leaf.
    pub fn alloc_leaf(&mut self, op: OpClass, value: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::leaf(op, value));
        if op == OpClass::Var {
            self.touch_var(value, id);
        }
        id
    }

    fn alloc_with(&mut self, op: OpClass, len: usize, cap: usize) -> NodeId {
        debug_assert!(len <= cap);
        let offset = self.slots.len() as u32;
        self.slots.extend(std::iter::repeat_n(None, cap));
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            op,
            arg: OpArg::Unset,
            value: 0,
            children: ChildRange {
                offset,
                cap: cap as u32,
            },
        });
        id
    }

    /// Ensures at least `extra` additional child slots on `id`, moving the
    /// slot block if needed. Existing children keep their positions.
    pub fn reserve(&mut self, id: NodeId, extra: usize) {
        let old = self.nodes[id.index()].children;
        let new_cap = old.cap as usize + extra;
        let offset = self.slots.len() as u32;

        let (lo, hi) = (old.offset as usize, (old.offset + old.cap) as usize);
        // The old block stays behind in the arena; blocks are only
        // reclaimed when the tree is dropped or rolled back.
        let copied: Vec<Option<NodeId>> = self.slots[lo..hi].to_vec();
        self.slots.extend(copied);
        self.slots
            .extend(std::iter::repeat_n(None, new_cap - old.cap as usize));

        self.nodes[id.index()].children = ChildRange {
            offset,
            cap: new_cap as u32,
        };
    }

    /// Index of the first free child slot, growing the node so that at
    /// least `need` slots are free from there.
    pub fn find_free_child(&mut self, id: NodeId, need: usize) -> usize {
        let children = self.children(id);
        let first_free = children
            .iter()
            .position(|c| c.is_none())
            .unwrap_or(children.len());

        let free = self.nodes[id.index()].children.cap as usize - first_free;
        if free < need {
            self.reserve(id, need - free);
        }

        first_free
    }

    /// Appends `child` in the first free slot of `id`.
    pub fn append_child(&mut self, id: NodeId, child: NodeId) {
        let at = self.find_free_child(id, 1);
        self.set_child(id, at, Some(child));
    }

    /// Takes a snapshot of the arena state.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            slots: self.slots.len(),
            root: self.root,
        }
    }

    /// Rewinds every allocation made after `cp` and restores the root.
    ///
    /// The caller must not have attached post-checkpoint nodes below
    /// pre-checkpoint ones; staged-then-attach edits satisfy this by
    /// construction.
    pub fn rollback(&mut self, cp: Checkpoint) {
        self.nodes.truncate(cp.nodes);
        self.slots.truncate(cp.slots);
        self.root = cp.root;
    }

    /// Clears the list of variables recorded by copy and append edits.
    pub fn reset_var_list(&mut self) {
        self.v_list.clear();
    }

    /// Variables recorded since the last [`reset_var_list`](Self::reset_var_list).
    pub fn touched_vars(&self) -> &[u32] {
        &self.v_list
    }

    /// Installs a variables-of-interest index; occurrences are recorded by
    /// subsequent copies into this tree.
    pub fn set_var_index(&mut self, vt: VarTree) {
        self.vt = Some(vt);
    }

    /// The occurrence index, if one was installed.
    pub fn var_index(&self) -> Option<&VarTree> {
        self.vt.as_ref()
    }

    pub(crate) fn touch_var(&mut self, var: u32, node: NodeId) {
        self.v_list.push(var);
        if let Some(vt) = self.vt.as_mut() {
            vt.record(var, node);
        }
    }

    /// Deep-copies a subtree of `src` into this tree's arenas.
    pub fn copy_from(&mut self, src: &Tree, src_id: NodeId) -> NodeId {
        let node = *src.node(src_id);
        match node.op {
            OpClass::Cst | OpClass::Var => self.alloc_leaf(node.op, node.value),
            _ => {
                let cap = node.children.cap as usize;
                let id = self.alloc_fixed(node.op, cap);
                {
                    let dst = self.node_mut(id);
                    dst.arg = node.arg;
                    dst.value = node.value;
                }
                if let OpArg::Var(vi) = node.arg {
                    self.touch_var(vi, id);
                }
                for idx in 0..cap {
                    if let Some(src_child) = src.child(src_id, idx) {
                        let child = self.copy_from(src, src_child);
                        self.set_child(id, idx, Some(child));
                    }
                }
                id
            }
        }
    }

    /// Deep-copies one of this tree's own subtrees.
    pub fn copy_within(&mut self, src_id: NodeId) -> NodeId {
        let node = *self.node(src_id);
        match node.op {
            OpClass::Cst | OpClass::Var => self.alloc_leaf(node.op, node.value),
            _ => {
                let cap = node.children.cap as usize;
                let id = self.alloc_fixed(node.op, cap);
                {
                    let dst = self.node_mut(id);
                    dst.arg = node.arg;
                    dst.value = node.value;
                }
                for idx in 0..cap {
                    if let Some(src_child) = self.child(src_id, idx) {
                        let child = self.copy_within(src_child);
                        self.set_child(id, idx, Some(child));
                    }
                }
                id
            }
        }
    }

    /// Deep-copies a subtree of `src` while renaming variables through
    /// `rosetta`.
    ///
    /// `rosetta[old - 1]` is the new 1-based id of variable `old`; an entry
    /// of `0` marks the variable invalid, collapsing the whole subtree to
    /// the constant zero.
    pub fn copy_rosetta_from(&mut self, src: &Tree, src_id: NodeId, rosetta: &[u32]) -> NodeId {
        if !subtree_vars_valid(src, src_id, rosetta) {
            return self.alloc_leaf(OpClass::Cst, opcode::nlconst::ZERO);
        }
        self.copy_rosetta_valid(src, src_id, rosetta)
    }

    fn copy_rosetta_valid(&mut self, src: &Tree, src_id: NodeId, rosetta: &[u32]) -> NodeId {
        let node = *src.node(src_id);
        match node.op {
            OpClass::Cst => self.alloc_leaf(OpClass::Cst, node.value),
            OpClass::Var => self.alloc_leaf(OpClass::Var, rosetta[node.value as usize - 1]),
            _ => {
                let cap = node.children.cap as usize;
                let id = self.alloc_fixed(node.op, cap);
                let arg = match node.arg {
                    OpArg::Var(vi) => OpArg::Var(rosetta[vi as usize - 1]),
                    other => other,
                };
                {
                    let dst = self.node_mut(id);
                    dst.arg = arg;
                    dst.value = node.value;
                }
                if let OpArg::Var(vi) = arg {
                    self.touch_var(vi, id);
                }
                for idx in 0..cap {
                    if let Some(src_child) = src.child(src_id, idx) {
                        let child = self.copy_rosetta_valid(src, src_child, rosetta);
                        self.set_child(id, idx, Some(child));
                    }
                }
                id
            }
        }
    }

    /// Clones the tree into fresh arenas.
    pub fn dup(&self) -> Tree {
        let mut copy = Tree::with_capacity(self.nodes.len());
        copy.equ_idx = self.equ_idx;
        if let Some(root) = self.root {
            let new_root = copy.copy_from(self, root);
            copy.root = Some(new_root);
        }
        copy
    }

    /// Clones the tree and builds an occurrence index for `vars` on the
    /// copy.
    pub fn dup_with_index(&self, vars: &[u32]) -> Result<Tree, TreeError> {
        let mut copy = Tree::with_capacity(self.nodes.len());
        copy.equ_idx = self.equ_idx;
        copy.set_var_index(VarTree::new(vars)?);
        if let Some(root) = self.root {
            let new_root = copy.copy_from(self, root);
            copy.root = Some(new_root);
        }
        Ok(copy)
    }

    /// Clones the tree while renaming variables through `rosetta`; see
    /// [`copy_rosetta_from`](Self::copy_rosetta_from).
    pub fn dup_rosetta(&self, rosetta: &[u32]) -> Tree {
        let mut copy = Tree::with_capacity(self.nodes.len());
        copy.equ_idx = self.equ_idx;
        copy.reset_var_list();
        if let Some(root) = self.root {
            let new_root = copy.copy_rosetta_from(self, root, rosetta);
            copy.root = Some(new_root);
        }
        copy
    }

    /// Replaces every occurrence of variable `vi`, folded op-args
    /// included, with the pool constant at `pool_idx`.
    pub fn replace_var_by_cst(&mut self, vi: u32, pool_idx: u32) {
        let Some(root) = self.root else { return };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = *self.node(id);
            match node.op {
                OpClass::Var if node.value == vi => {
                    let n = self.node_mut(id);
                    n.op = OpClass::Cst;
                    n.value = pool_idx;
                }
                OpClass::Cst | OpClass::Var => {}
                _ => {
                    if node.arg == OpArg::Var(vi) {
                        self.node_mut(id).arg = OpArg::Cst(pool_idx);
                    }
                    stack.extend(self.child_ids(id));
                }
            }
        }
    }

    /// Substitutes every occurrence of variable `vi` by a deep copy of
    /// `subtree`.
    ///
    /// A folded `Var` op-arg carrying `vi` is first expanded into an
    /// explicit child so the substitution can attach a whole subtree
    /// there.
    pub fn replace_var_by_tree(&mut self, vi: u32, subtree: &Tree) -> Result<(), TreeError> {
        let Some(sub_root) = subtree.root() else {
            return Ok(());
        };
        let Some(root) = self.root else {
            return Ok(());
        };

        if self.node(root).op == OpClass::Var && self.node(root).value == vi {
            let new_root = self.copy_from(subtree, sub_root);
            self.root = Some(new_root);
            return Ok(());
        }

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            // Snapshot the original children: the walk must not descend
            // into freshly substituted copies.
            let cap = self.node(id).children.cap as usize;
            let original: Vec<(usize, NodeId)> = (0..cap)
                .filter_map(|idx| self.child(id, idx).map(|c| (idx, c)))
                .collect();

            if self.node(id).arg.as_var() == Some(vi) {
                let copy = self.copy_from(subtree, sub_root);
                self.append_child(id, copy);
                self.node_mut(id).arg = OpArg::Unset;
            }

            for (idx, child) in original {
                let child_node = *self.node(child);
                match child_node.op {
                    OpClass::Var if child_node.value == vi => {
                        let copy = self.copy_from(subtree, sub_root);
                        self.set_child(id, idx, Some(copy));
                    }
                    OpClass::Var | OpClass::Cst => {}
                    _ => stack.push(child),
                }
            }
        }

        Ok(())
    }

    /// Renumbers every variable reference in place through `rosetta`
    /// (`rosetta[old - 1]`, `0` invalid).
    pub fn apply_rosetta(&mut self, rosetta: &[u32]) -> Result<(), TreeError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        self.reset_var_list();

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = *self.node(id);
            match node.op {
                OpClass::Var => {
                    let new = remap(node.value, rosetta)?;
                    self.node_mut(id).value = new;
                    self.touch_var(new, id);
                }
                OpClass::Cst => {}
                _ => {
                    if let OpArg::Var(vi) = node.arg {
                        let new = remap(vi, rosetta)?;
                        self.node_mut(id).arg = OpArg::Var(new);
                        self.touch_var(new, id);
                    }
                    stack.extend(self.child_ids(id));
                }
            }
        }

        Ok(())
    }
}

fn remap(var: u32, rosetta: &[u32]) -> Result<u32, TreeError> {
    match var
        .checked_sub(1)
        .and_then(|at| rosetta.get(at as usize))
    {
        Some(&new) if new != 0 => Ok(new),
        _ => Err(TreeError::VarNotFound { var }),
    }
}

fn subtree_vars_valid(src: &Tree, id: NodeId, rosetta: &[u32]) -> bool {
    let node = src.node(id);
    let var_ok = |vi: u32| remap(vi, rosetta).is_ok();

    match node.op {
        OpClass::Cst => true,
        OpClass::Var => var_ok(node.value),
        _ => {
            if let OpArg::Var(vi) = node.arg {
                if !var_ok(vi) {
                    return false;
                }
            }
            src.child_ids(id).all(|c| subtree_vars_valid(src, c, rosetta))
        }
    }
}
