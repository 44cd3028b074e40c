//! Serialising expression trees back into opcode programs.
//!
//! Emission is a post-order walk: children first, one instruction per node,
//! folded op-args last. A multiplication by a constant sitting under an
//! `ADD` is fused into `MUL_IMM_ADD`, whatever shape it was built in
//! (explicit constant child, folded constant or FMA op-arg).

use crate::node::{NodeId, OpArg, OpClass};
use crate::{Tree, TreeError};
use opcode::{OpCode, Program};

impl Tree {
    /// Emits the tree as a well-formed opcode program: `HEADER`, the
    /// expression body, then `STORE` with the owning equation index.
    ///
    /// An empty tree emits the zero program.
    pub fn to_program(&self) -> Result<Program, TreeError> {
        let mut body = Program::new();
        match self.root() {
            Some(root) => self.emit_node(root, &mut body)?,
            None => body.push(OpCode::PUSH_ZERO, 0),
        }

        let len = body.len() + 2;
        let mut out = Program::with_capacity(len);
        out.push(OpCode::HEADER, len as i32);
        for pos in 0..body.len() {
            out.push_raw(body.instr(pos), body.arg(pos));
        }
        out.push(OpCode::STORE, self.equ_idx().unwrap_or(0));
        Ok(out)
    }

    fn emit_node(&self, id: NodeId, out: &mut Program) -> Result<(), TreeError> {
        let node = *self.node(id);

        match node.op {
            OpClass::Cst => {
                out.push(OpCode::PUSH_IMM, node.value as i32);
                Ok(())
            }
            OpClass::Var => {
                out.push(OpCode::PUSH_VAR, node.value as i32);
                Ok(())
            }

            OpClass::Add => self.emit_chain(id, node.arg, out, OpCode::ADD, true),
            OpClass::Sub => self.emit_chain(id, node.arg, out, OpCode::SUB, false),
            OpClass::Mul => self.emit_chain(id, node.arg, out, OpCode::MUL, false),
            OpClass::Div => self.emit_chain(id, node.arg, out, OpCode::DIV, false),

            OpClass::Umin => {
                if let OpArg::Var(vi) = node.arg {
                    out.push(OpCode::UMIN_VAR, vi as i32);
                    return Ok(());
                }
                let child = self
                    .child_ids(id)
                    .next()
                    .ok_or(TreeError::UnexpectedNode { found: "UMIN" })?;
                self.emit_node(child, out)?;
                out.push(OpCode::UMIN, 0);
                Ok(())
            }

            OpClass::Call1 => {
                let child = self
                    .child_ids(id)
                    .next()
                    .ok_or(TreeError::UnexpectedNode { found: "CALL1" })?;
                self.emit_node(child, out)?;
                out.push(OpCode::CALL1, node.value as i32);
                Ok(())
            }

            OpClass::Call2 => {
                let mut kids = self.child_ids(id);
                let a = kids
                    .next()
                    .ok_or(TreeError::UnexpectedNode { found: "CALL2" })?;
                let b = kids
                    .next()
                    .ok_or(TreeError::UnexpectedNode { found: "CALL2" })?;
                self.emit_node(a, out)?;
                self.emit_node(b, out)?;
                out.push(OpCode::CALL2, node.value as i32);
                Ok(())
            }

            OpClass::CallN => {
                let kids: Vec<NodeId> = self.child_ids(id).collect();
                for &child in &kids {
                    self.emit_node(child, out)?;
                }
                out.push(OpCode::FUNC_ARG_COUNT, kids.len() as i32);
                out.push(OpCode::CALLN, node.value as i32);
                Ok(())
            }
        }
    }

    /// Emits an n-ary arithmetic node: first operand, then one binary
    /// instruction per further operand, then the folded op-arg.
    fn emit_chain(
        &self,
        id: NodeId,
        arg: OpArg,
        out: &mut Program,
        bin: OpCode,
        fuse: bool,
    ) -> Result<(), TreeError> {
        let kids: Vec<NodeId> = self.child_ids(id).collect();
        let mut have_value = false;

        for &child in &kids {
            if !have_value {
                self.emit_node(child, out)?;
                have_value = true;
                continue;
            }
            if fuse {
                if let Some((operand, k)) = self.fma_shape(child) {
                    self.emit_node(operand, out)?;
                    out.push(OpCode::MUL_IMM_ADD, k as i32);
                    continue;
                }
            }
            self.emit_node(child, out)?;
            out.push(bin, 0);
        }

        match arg {
            OpArg::Unset => {
                if !have_value {
                    return Err(match bin {
                        OpCode::ADD => TreeError::EmptyAdd,
                        _ => TreeError::UnexpectedNode {
                            found: bin.as_str(),
                        },
                    });
                }
            }
            OpArg::Cst(k) => {
                if have_value {
                    out.push(imm_fold_of(bin), k as i32);
                } else {
                    out.push(OpCode::PUSH_IMM, k as i32);
                }
            }
            OpArg::Var(vi) => {
                if have_value {
                    out.push(var_fold_of(bin), vi as i32);
                } else {
                    out.push(OpCode::PUSH_VAR, vi as i32);
                }
            }
            OpArg::Fma(k) => {
                // A standalone FMA multiplier degrades to a plain constant
                // multiplication.
                if !have_value {
                    return Err(TreeError::UnexpectedNode { found: "MUL(FMA)" });
                }
                out.push(OpCode::MUL_IMM, k as i32);
            }
        }

        Ok(())
    }

    /// Recognises a child that can be fused into `MUL_IMM_ADD` under an
    /// `ADD`: a `MUL` contributing `operand * pool[k]` with exactly one
    /// emitted operand.
    fn fma_shape(&self, id: NodeId) -> Option<(NodeId, u32)> {
        let node = *self.node(id);
        if node.op != OpClass::Mul {
            return None;
        }

        let mut kids = self.child_ids(id);
        match node.arg {
            OpArg::Fma(k) | OpArg::Cst(k) => {
                let only = kids.next()?;
                kids.next().is_none().then_some((only, k))
            }
            OpArg::Unset => {
                let first = kids.next()?;
                let second = kids.next()?;
                if kids.next().is_some() {
                    return None;
                }
                let first_node = self.node(first);
                (first_node.op == OpClass::Cst).then_some((second, first_node.value))
            }
            OpArg::Var(_) => None,
        }
    }
}

fn imm_fold_of(bin: OpCode) -> OpCode {
    match bin {
        OpCode::ADD => OpCode::ADD_IMM,
        OpCode::SUB => OpCode::SUB_IMM,
        OpCode::MUL => OpCode::MUL_IMM,
        _ => OpCode::DIV_IMM,
    }
}

fn var_fold_of(bin: OpCode) -> OpCode {
    match bin {
        OpCode::ADD => OpCode::ADD_VAR,
        OpCode::SUB => OpCode::SUB_VAR,
        OpCode::MUL => OpCode::MUL_VAR,
        _ => OpCode::DIV_VAR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Slot;
    use opcode::test_programs;
    use primitives::Pool;

    #[test]
    fn roundtrip_preserves_bytes() -> anyhow::Result<()> {
        // Every fixture already in canonical (fused) form round-trips
        // byte for byte.
        let canonical = [
            test_programs::neg_square(),
            test_programs::neg_sum_of_products(),
            test_programs::neg_square_plus_exp(),
            test_programs::neg_scaled_power(),
            test_programs::neg_power_plus_exp_product(),
            test_programs::neg_quotient(),
            test_programs::neg_log(),
            test_programs::sqr_fma_chain(),
            test_programs::neg_trunc(),
        ];
        for program in canonical {
            let tree = Tree::from_program(&program)?;
            let back = tree.to_program()?;
            assert_eq!(
                back,
                program,
                "round trip differs:\n{}vs\n{}",
                back.display(),
                program.display()
            );
        }
        Ok(())
    }

    #[test]
    fn emission_is_idempotent_after_normalisation() -> anyhow::Result<()> {
        for program in test_programs::all_programs() {
            let once = Tree::from_program(&program)?.to_program()?;
            let twice = Tree::from_program(&once)?.to_program()?;
            assert_eq!(twice, once);
        }
        Ok(())
    }

    #[test]
    fn fuses_explicit_constant_product_under_add() -> anyhow::Result<()> {
        // x1 + 2*x2, the product built from an explicit PUSH_IMM child.
        let p = Program::from_ops(&[
            (OpCode::HEADER, 7),
            (OpCode::PUSH_VAR, 1),
            (OpCode::PUSH_IMM, 6),
            (OpCode::PUSH_VAR, 2),
            (OpCode::MUL, 0),
            (OpCode::ADD, 0),
            (OpCode::STORE, 1),
        ]);
        let out = Tree::from_program(&p)?.to_program()?;
        let expected = Program::from_ops(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 1),
            (OpCode::PUSH_VAR, 2),
            (OpCode::MUL_IMM_ADD, 6),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(out, expected, "got:\n{}", out.display());

        // And the fusion is stable under a second round trip.
        let again = Tree::from_program(&out)?.to_program()?;
        assert_eq!(again, out);
        Ok(())
    }

    #[test]
    fn empty_tree_emits_zero_program() -> anyhow::Result<()> {
        let mut tree = Tree::new();
        tree.set_equ_idx(7);
        let out = tree.to_program()?;
        assert_eq!(out.len(), 3);
        assert_eq!(out.instr(1), OpCode::PUSH_ZERO.raw());
        assert_eq!(out.equ_idx(), Some(7));
        out.validate()?;
        Ok(())
    }

    #[test]
    fn emits_hand_built_terms() -> anyhow::Result<()> {
        let pool = Pool::new().into_shared();
        let mut tree = Tree::bootstrap(2, 8, 4);
        let add = tree.root().unwrap();
        tree.add_var(add, &mut pool.borrow_mut(), 1, 1.)?;
        tree.add_var(add, &mut pool.borrow_mut(), 2, 2.)?;
        tree.add_cst(add, &mut pool.borrow_mut(), 5.)?;

        let out = tree.to_program()?;
        out.validate()?;
        assert_eq!(out.equ_idx(), Some(2));

        let value = Tree::from_program(&out)?
            .evaluate(&crate::PoolBinding::new(&[10., 100.], pool))
            .unwrap();
        assert_eq!(value, 10. + 200. + 5.);
        Ok(())
    }

    #[test]
    fn emits_deferred_bilinear_term() -> anyhow::Result<()> {
        let pool = Pool::new().into_shared();
        let mut tree = Tree::new();
        tree.set_equ_idx(1);
        let open = tree
            .add_bilin(Slot::Root, &mut pool.borrow_mut(), 3., Some(1), None)?
            .unwrap();
        let x2 = tree.alloc_leaf(OpClass::Var, 2);
        tree.slot_set(open, x2);

        let out = tree.to_program()?;
        out.validate()?;
        let value = Tree::from_program(&out)?
            .evaluate(&crate::PoolBinding::new(&[2., 7.], pool))
            .unwrap();
        assert_eq!(value, 3. * 2. * 7.);
        Ok(())
    }

    #[test]
    fn degenerate_add_without_operands_is_an_error() {
        let mut tree = Tree::new();
        let add = tree.alloc_node(OpClass::Add, 2);
        tree.set_root(Some(add));
        assert_eq!(tree.to_program(), Err(TreeError::EmptyAdd));
    }
}
