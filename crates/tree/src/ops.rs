//! Editing operations on expression trees.
//!
//! Every "append a term" entry point funnels through
//! [`Tree::find_add_node`], which walks from the root folding top-level
//! unary minus and constant multipliers into the caller's coefficient until
//! it reaches (or installs) an `ADD` node. A coefficient of `NaN` disables
//! that folding. After bulk edits, [`Tree::check_add`] normalises
//! degenerate single-operand `ADD` nodes.

use crate::node::{ChildRange, NodeId, OpArg, OpClass};
use crate::{Tree, TreeError};
use primitives::Pool;

/// Address of a place a node can be attached to: the tree root or a child
/// slot of an existing node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// The tree root.
    Root,
    /// Child slot `1` of node `0`.
    Child(NodeId, usize),
}

impl Tree {
    /// The node currently occupying `slot`.
    pub fn slot_get(&self, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Root => self.root(),
            Slot::Child(id, idx) => self.child(id, idx),
        }
    }

    /// Puts `id` into `slot`.
    pub fn slot_set(&mut self, slot: Slot, id: NodeId) {
        match slot {
            Slot::Root => self.set_root(Some(id)),
            Slot::Child(parent, idx) => self.set_child(parent, idx, Some(id)),
        }
    }

    /// Installs a unary minus in the empty `slot`; returns the slot of its
    /// operand.
    pub fn umin_at(&mut self, slot: Slot) -> Slot {
        debug_assert!(self.slot_get(slot).is_none());
        let node = self.alloc_fixed(OpClass::Umin, 1);
        self.slot_set(slot, node);
        Slot::Child(node, 0)
    }

    /// Installs a multiplication by `coeff` in the empty `slot`, returning
    /// the slot of the operand and whether a node was created.
    ///
    /// `coeff == 1` installs nothing; `coeff == -1` installs a unary minus
    /// instead of a pool lookup.
    pub fn mul_cst_at(&mut self, slot: Slot, pool: &mut Pool, coeff: f64) -> (Slot, bool) {
        debug_assert!(self.slot_get(slot).is_none());
        debug_assert!(coeff.is_finite());

        if (coeff - 1.).abs() < f64::EPSILON {
            return (slot, false);
        }
        if (coeff + 1.).abs() < f64::EPSILON {
            return (self.umin_at(slot), true);
        }

        let node = self.alloc_fixed(OpClass::Mul, 1);
        self.node_mut(node).arg = OpArg::Cst(pool.get_index(coeff));
        self.slot_set(slot, node);
        (Slot::Child(node, 0), true)
    }

    /// Installs `coeff * x_vi` in the empty `slot`.
    pub fn var_at(&mut self, slot: Slot, pool: &mut Pool, vi: u32, coeff: f64) {
        let (slot, _) = self.mul_cst_at(slot, pool, coeff);
        let leaf = self.alloc_leaf(OpClass::Var, vi);
        self.slot_set(slot, leaf);
    }

    /// Multiplies the whole tree by `coeff`.
    ///
    /// A unary-minus root is flipped into a multiplication by `-coeff` in
    /// place; a plain root is wrapped.
    pub fn scale(&mut self, pool: &mut Pool, coeff: f64) {
        debug_assert!(coeff.is_finite());
        let Some(root) = self.root() else { return };

        if (coeff - 1.).abs() < f64::EPSILON {
            return;
        }
        if (coeff + 1.).abs() < f64::EPSILON {
            self.negate();
            return;
        }

        let node = *self.node(root);
        if node.op == OpClass::Umin && node.arg == OpArg::Unset {
            let idx = pool.get_index(-coeff);
            let n = self.node_mut(root);
            n.op = OpClass::Mul;
            n.arg = OpArg::Cst(idx);
            return;
        }

        let idx = pool.get_index(coeff);
        let new_root = self.alloc_fixed(OpClass::Mul, 1);
        self.node_mut(new_root).arg = OpArg::Cst(idx);
        self.set_child(new_root, 0, Some(root));
        self.set_root(Some(new_root));
    }

    /// Negates the whole tree without touching the pool.
    pub fn negate(&mut self) {
        let Some(root) = self.root() else { return };
        let node = *self.node(root);

        match node.op {
            OpClass::Umin => {
                if let OpArg::Var(vi) = node.arg {
                    let n = self.node_mut(root);
                    n.op = OpClass::Var;
                    n.arg = OpArg::Unset;
                    n.value = vi;
                } else {
                    self.set_root(self.child(root, 0));
                }
            }
            OpClass::Var => {
                let vi = node.value;
                let n = self.node_mut(root);
                n.op = OpClass::Umin;
                n.arg = OpArg::Var(vi);
                n.value = 0;
            }
            _ => {
                let new_root = self.alloc_fixed(OpClass::Umin, 1);
                self.set_child(new_root, 0, Some(root));
                self.set_root(Some(new_root));
            }
        }
    }

    /// Walks from the root to the top `ADD` node, installing one if
    /// needed.
    ///
    /// Top-level unary minus and single-operand constant multipliers on the
    /// way are folded into `coeff` so the caller can scale the term it is
    /// about to append; pass `NaN` to disable the folding. A `SUB` node on
    /// the way is rewritten into an `ADD` by negating every trailing
    /// operand.
    pub fn find_add_node(&mut self, pool: &Pool, coeff: &mut f64) -> Result<NodeId, TreeError> {
        let Some(root) = self.root() else {
            let add = self.alloc_node(OpClass::Add, 1);
            self.set_root(Some(add));
            return Ok(add);
        };

        let mut slot = Slot::Root;
        let mut id = root;

        loop {
            let node = *self.node(id);
            match node.op {
                OpClass::Add => return Ok(id),

                OpClass::Umin if node.arg == OpArg::Unset => {
                    if coeff.is_finite() {
                        if let Some(child) = self.child(id, 0) {
                            *coeff = -*coeff;
                            slot = Slot::Child(id, 0);
                            id = child;
                            continue;
                        }
                    }
                    return self.put_add_node(slot, id);
                }

                OpClass::Mul => {
                    if coeff.is_finite() && node.children.cap == 1 {
                        if let (OpArg::Cst(k), Some(child)) = (node.arg, self.child(id, 0)) {
                            if let Some(val) = pool.get(k) {
                                *coeff /= val;
                                slot = Slot::Child(id, 0);
                                id = child;
                                continue;
                            }
                        }
                    }
                    return self.put_add_node(slot, id);
                }

                OpClass::Sub => {
                    self.sub_to_add(id)?;
                    return Ok(id);
                }

                _ => return self.put_add_node(slot, id),
            }
        }
    }

    /// Inserts an `ADD` node above `id` at `slot` and returns it.
    fn put_add_node(&mut self, slot: Slot, id: NodeId) -> Result<NodeId, TreeError> {
        let add = self.alloc_node(OpClass::Add, 2);
        self.set_child(add, 0, Some(id));
        self.slot_set(slot, add);
        Ok(add)
    }

    /// Rewrites a `SUB` node into an `ADD` in place, negating every
    /// operand after the first (the folded op-arg included).
    fn sub_to_add(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = *self.node(id);
        debug_assert_eq!(node.op, OpClass::Sub);

        self.node_mut(id).op = OpClass::Add;

        match node.arg {
            OpArg::Cst(k) => {
                let at = self.find_free_child(id, 1);
                let inner = self.umin_at(Slot::Child(id, at));
                let leaf = self.alloc_leaf(OpClass::Cst, k);
                self.slot_set(inner, leaf);
                self.node_mut(id).arg = OpArg::Unset;
            }
            OpArg::Var(vi) => {
                let at = self.find_free_child(id, 1);
                let inner = self.umin_at(Slot::Child(id, at));
                let leaf = self.alloc_leaf(OpClass::Var, vi);
                self.slot_set(inner, leaf);
                self.node_mut(id).arg = OpArg::Unset;
            }
            OpArg::Unset => {
                let cap = self.node(id).children.cap as usize;
                let mut seen_first = false;
                for idx in 0..cap {
                    let Some(child) = self.child(id, idx) else {
                        continue;
                    };
                    if !seen_first {
                        seen_first = true;
                        continue;
                    }
                    let umin = self.alloc_fixed(OpClass::Umin, 1);
                    self.set_child(umin, 0, Some(child));
                    self.set_child(id, idx, Some(umin));
                }
            }
            OpArg::Fma(_) => {
                return Err(TreeError::UnexpectedNode { found: "SUB(FMA)" });
            }
        }

        Ok(())
    }

    /// Normalises an `ADD` node after bulk edits: a single-operand `ADD`
    /// collapses to that operand; a zero-operand `ADD` is invalid.
    pub fn check_add(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = *self.node(id);
        if node.op != OpClass::Add {
            return Err(TreeError::UnexpectedNode {
                found: node.op.name(),
            });
        }

        let mut operands = match node.arg {
            OpArg::Cst(_) | OpArg::Var(_) => 1usize,
            _ => 0,
        };
        let mut only_child = None;
        for child in self.child_ids(id) {
            operands += 1;
            only_child = Some(child);
            if operands > 1 {
                return Ok(());
            }
        }

        match (operands, node.arg) {
            (0, _) => Err(TreeError::EmptyAdd),
            (1, OpArg::Cst(k)) => {
                let n = self.node_mut(id);
                n.op = OpClass::Cst;
                n.arg = OpArg::Unset;
                n.value = k;
                n.children = ChildRange::EMPTY;
                Ok(())
            }
            (1, OpArg::Var(vi)) => {
                let n = self.node_mut(id);
                n.op = OpClass::Var;
                n.arg = OpArg::Unset;
                n.value = vi;
                n.children = ChildRange::EMPTY;
                Ok(())
            }
            (1, _) => {
                // Collapse onto the only child, as the original does with a
                // plain struct copy.
                let child = *self.node(only_child.expect("counted"));
                *self.node_mut(id) = child;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Adds the constant `cst` to an `ADD` node, folding it into the
    /// op-arg slot when that is free.
    pub fn add_cst(&mut self, id: NodeId, pool: &mut Pool, cst: f64) -> Result<(), TreeError> {
        let node = *self.node(id);
        if node.op != OpClass::Add {
            return Err(TreeError::UnexpectedNode {
                found: node.op.name(),
            });
        }

        let idx = pool.get_index(cst);
        if node.arg == OpArg::Unset {
            self.node_mut(id).arg = OpArg::Cst(idx);
        } else {
            let at = self.find_free_child(id, 1);
            let leaf = self.alloc_leaf(OpClass::Cst, idx);
            self.set_child(id, at, Some(leaf));
        }
        Ok(())
    }

    /// Adds `coeff * x_vi` as an operand of an `ADD` node, folding a bare
    /// variable into the op-arg slot when that is free.
    pub fn add_var(
        &mut self,
        id: NodeId,
        pool: &mut Pool,
        vi: u32,
        coeff: f64,
    ) -> Result<(), TreeError> {
        let node = *self.node(id);
        if node.op != OpClass::Add {
            return Err(TreeError::UnexpectedNode {
                found: node.op.name(),
            });
        }

        if (coeff - 1.).abs() < f64::EPSILON && node.arg == OpArg::Unset {
            self.node_mut(id).arg = OpArg::Var(vi);
            self.touch_var(vi, id);
            return Ok(());
        }

        let at = self.find_free_child(id, 1);
        self.var_at(Slot::Child(id, at), pool, vi, coeff);
        Ok(())
    }

    /// Appends `coeff * x_vi` under the tree's top `ADD` node, folding any
    /// root scaling into the coefficient first.
    pub fn add_var_term(
        &mut self,
        pool: &mut Pool,
        vi: u32,
        coeff: f64,
    ) -> Result<(), TreeError> {
        let mut lcoeff = coeff;
        let add = self.find_add_node(pool, &mut lcoeff)?;
        self.add_var(add, pool, vi, lcoeff)
    }

    /// Installs the bilinear term `coeff * x_v1 * x_v2` in the empty
    /// `slot`.
    ///
    /// With `v2` equal to `None` the second operand is left open and its
    /// slot is returned for the caller to fill later. With both variables
    /// `None` an empty two-operand product is installed.
    pub fn add_bilin(
        &mut self,
        slot: Slot,
        pool: &mut Pool,
        coeff: f64,
        v1: Option<u32>,
        v2: Option<u32>,
    ) -> Result<Option<Slot>, TreeError> {
        debug_assert!(self.slot_get(slot).is_none());

        let Some(v1) = v1 else {
            if v2.is_some() {
                return Err(TreeError::BilinearOperandOrder);
            }
            let slot = match coeff {
                c if (c + 1.).abs() < f64::EPSILON => self.umin_at(slot),
                c if (c - 1.).abs() >= f64::EPSILON => self.mul_cst_at(slot, pool, c).0,
                _ => slot,
            };
            let mul = self.alloc_fixed(OpClass::Mul, 2);
            self.slot_set(slot, mul);
            return Ok(Some(Slot::Child(mul, 0)));
        };

        let mul = if (coeff - 1.).abs() < f64::EPSILON {
            let mul = self.alloc_fixed(OpClass::Mul, 1);
            self.node_mut(mul).arg = OpArg::Var(v1);
            self.touch_var(v1, mul);
            self.slot_set(slot, mul);
            mul
        } else {
            let mul = self.alloc_fixed(OpClass::Mul, 2);
            self.slot_set(slot, mul);
            self.var_at(Slot::Child(mul, 1), pool, v1, coeff);
            mul
        };

        match v2 {
            Some(v2) => {
                let leaf = self.alloc_leaf(OpClass::Var, v2);
                self.set_child(mul, 0, Some(leaf));
                Ok(None)
            }
            None => Ok(Some(Slot::Child(mul, 0))),
        }
    }

    /// Ensures `slot` holds an `ADD` node with room for `size` more
    /// children; returns the node and the index of the first free slot.
    pub fn reserve_add_node(
        &mut self,
        slot: Slot,
        size: usize,
    ) -> Result<(NodeId, usize), TreeError> {
        match self.slot_get(slot) {
            Some(id) if self.node(id).op == OpClass::Add => {
                let offset = self.node(id).children.cap as usize;
                self.reserve(id, size);
                Ok((id, offset))
            }
            Some(id) => {
                let add = self.alloc_node(OpClass::Add, size + 1);
                self.set_child(add, 0, Some(id));
                self.slot_set(slot, add);
                Ok((add, 1))
            }
            None => {
                let add = self.alloc_node(OpClass::Add, size);
                self.slot_set(slot, add);
                Ok((add, 0))
            }
        }
    }

    /// Splices the linear combination `coeff * sum(c_i * x_i)` into the
    /// `ADD` node at `slot`, skipping the variable `skip`.
    ///
    /// Terms with a non-finite coefficient are placeholders and are
    /// skipped as well.
    pub fn add_lin_term(
        &mut self,
        slot: Slot,
        pool: &mut Pool,
        terms: &[(u32, f64)],
        skip: Option<u32>,
        coeff: f64,
    ) -> Result<(), TreeError> {
        let size = if skip.is_some() {
            terms.len()
        } else {
            terms.len() + 1
        };
        let (add, offset) = self.reserve_add_node(slot, size)?;

        let mut at = offset;
        for &(vi, c) in terms {
            if Some(vi) == skip || !c.is_finite() {
                continue;
            }
            self.var_at(Slot::Child(add, at), pool, vi, coeff * c);
            at += 1;
        }

        Ok(())
    }

    /// Adds a copy of `src_node` (a subtree of `src`) to this tree under
    /// its top `ADD` node, scaled by `cst`; `NaN` means no scaling.
    pub fn add_expr(
        &mut self,
        pool: &mut Pool,
        src: &Tree,
        src_node: NodeId,
        cst: f64,
    ) -> Result<(), TreeError> {
        self.reset_var_list();

        let mut lcst = cst;
        let add = self.find_add_node(pool, &mut lcst)?;

        let src_is_add = src.node(src_node).op == OpClass::Add
            && src.node(src_node).arg == OpArg::Unset;
        let nchildren = if src_is_add {
            src.child_ids(src_node).count()
        } else {
            1
        };

        // With a real coefficient, the copies land in a fresh ADD under a
        // multiplier child; otherwise straight into the top ADD.
        let (dst, mut offset) = if lcst.is_finite() && (lcst - 1.).abs() >= f64::EPSILON {
            let at = self.find_free_child(add, 1);
            let (inner, _) = self.mul_cst_at(Slot::Child(add, at), pool, lcst);
            self.reserve_add_node(inner, nchildren)?
        } else {
            let at = self.find_free_child(add, nchildren);
            (add, at)
        };

        if src_is_add {
            let kids: Vec<NodeId> = src.child_ids(src_node).collect();
            for child in kids {
                let copy = self.copy_from(src, child);
                self.set_child(dst, offset, Some(copy));
                offset += 1;
            }
        } else {
            let copy = self.copy_from(src, src_node);
            self.set_child(dst, offset, Some(copy));
        }

        self.check_add(dst)
    }
}
