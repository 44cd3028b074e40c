//! Importing opcode programs into the expression IR.
//!
//! The builder replays the program on a node stack. Folded `*_VAR`/`*_IMM`
//! instructions either land in the op-arg slot of the node on top of the
//! stack (when its class matches and the slot is free) or wrap it in a
//! fresh one-child node. `MUL_IMM_ADD` becomes an `ADD` over a synthetic
//! `MUL` node carrying the constant in its FMA op-arg.

use crate::node::{NodeId, OpArg, OpClass};
use crate::{Tree, TreeError};
use opcode::{nlconst, OpCode, OpcodeError, Program};

impl Tree {
    /// Builds a tree from a well-formed opcode program.
    pub fn from_program(program: &Program) -> Result<Tree, TreeError> {
        program.validate()?;

        let mut tree = Tree::with_capacity(program.len());
        if program.is_trivial() {
            return Ok(tree);
        }

        let mut stack = Vec::with_capacity(program.tree_sizes()?.stack_max as usize);
        let mut pending_arity: Option<i32> = None;

        for pos in 0..program.len() {
            let raw = program.instr(pos);
            let arg = program.arg(pos);
            let op = OpCode::from_raw(raw)
                .ok_or(OpcodeError::UnknownInstr { pos, raw })
                .map_err(TreeError::from)?;

            log::trace!(
                "build [{pos:5}] {:<14} arg {arg:>6} stack {}",
                op.as_str(),
                stack.len()
            );

            match op {
                OpCode::NOOP | OpCode::HEADER | OpCode::END => {}

                OpCode::STORE => tree.set_equ_idx(arg),

                OpCode::PUSH_VAR => {
                    let leaf = tree.alloc_leaf(OpClass::Var, arg as u32);
                    stack.push(leaf);
                }
                OpCode::PUSH_IMM => {
                    let leaf = tree.alloc_leaf(OpClass::Cst, arg as u32);
                    stack.push(leaf);
                }
                OpCode::PUSH_ZERO => {
                    let leaf = tree.alloc_leaf(OpClass::Cst, nlconst::ZERO);
                    stack.push(leaf);
                }
                OpCode::UMIN_VAR => {
                    let node = tree.alloc_fixed(OpClass::Umin, 0);
                    tree.node_mut(node).arg = OpArg::Var(arg as u32);
                    tree.touch_var(arg as u32, node);
                    stack.push(node);
                }

                OpCode::ADD => {
                    let b = stack.pop().expect("validated");
                    let a = stack.pop().expect("validated");
                    // Sums are n-ary: extend an open ADD instead of nesting.
                    if tree.node(a).op == OpClass::Add && tree.node(a).arg == OpArg::Unset {
                        tree.append_child(a, b);
                        stack.push(a);
                    } else {
                        let node = tree.alloc_node(OpClass::Add, 2);
                        tree.set_child(node, 0, Some(a));
                        tree.set_child(node, 1, Some(b));
                        stack.push(node);
                    }
                }
                OpCode::SUB | OpCode::MUL | OpCode::DIV => {
                    let b = stack.pop().expect("validated");
                    let a = stack.pop().expect("validated");
                    let class = match op {
                        OpCode::SUB => OpClass::Sub,
                        OpCode::MUL => OpClass::Mul,
                        _ => OpClass::Div,
                    };
                    let node = tree.alloc_fixed(class, 2);
                    tree.set_child(node, 0, Some(a));
                    tree.set_child(node, 1, Some(b));
                    stack.push(node);
                }

                OpCode::ADD_VAR | OpCode::ADD_IMM => {
                    let new_arg = fold_arg(op, arg);
                    let a = stack.pop().expect("validated");
                    if tree.node(a).op == OpClass::Add && tree.node(a).arg == OpArg::Unset {
                        tree.node_mut(a).arg = new_arg;
                        if let OpArg::Var(vi) = new_arg {
                            tree.touch_var(vi, a);
                        }
                        stack.push(a);
                    } else {
                        stack.push(tree.fold_wrap(OpClass::Add, new_arg, a));
                    }
                }
                OpCode::MUL_VAR | OpCode::MUL_IMM => {
                    let new_arg = fold_arg(op, arg);
                    let a = stack.pop().expect("validated");
                    if tree.node(a).op == OpClass::Mul && tree.node(a).arg == OpArg::Unset {
                        tree.node_mut(a).arg = new_arg;
                        if let OpArg::Var(vi) = new_arg {
                            tree.touch_var(vi, a);
                        }
                        stack.push(a);
                    } else {
                        stack.push(tree.fold_wrap(OpClass::Mul, new_arg, a));
                    }
                }
                OpCode::SUB_VAR | OpCode::SUB_IMM => {
                    let a = stack.pop().expect("validated");
                    stack.push(tree.fold_wrap(OpClass::Sub, fold_arg(op, arg), a));
                }
                OpCode::DIV_VAR | OpCode::DIV_IMM => {
                    let a = stack.pop().expect("validated");
                    stack.push(tree.fold_wrap(OpClass::Div, fold_arg(op, arg), a));
                }

                OpCode::UMIN => {
                    let a = stack.pop().expect("validated");
                    let node = tree.alloc_fixed(OpClass::Umin, 1);
                    tree.set_child(node, 0, Some(a));
                    stack.push(node);
                }

                OpCode::CALL1 => {
                    let a = stack.pop().expect("validated");
                    let node = tree.alloc_fixed(OpClass::Call1, 1);
                    tree.node_mut(node).value = arg as u32;
                    tree.set_child(node, 0, Some(a));
                    stack.push(node);
                }
                OpCode::CALL2 => {
                    let b = stack.pop().expect("validated");
                    let a = stack.pop().expect("validated");
                    let node = tree.alloc_fixed(OpClass::Call2, 2);
                    tree.node_mut(node).value = arg as u32;
                    tree.set_child(node, 0, Some(a));
                    tree.set_child(node, 1, Some(b));
                    stack.push(node);
                }
                OpCode::FUNC_ARG_COUNT => pending_arity = Some(arg),
                OpCode::CALLN => {
                    let n = pending_arity
                        .take()
                        .ok_or(OpcodeError::MissingArity { pos })
                        .map_err(TreeError::from)? as usize;
                    let node = tree.alloc_fixed(OpClass::CallN, n);
                    tree.node_mut(node).value = arg as u32;
                    for idx in (0..n).rev() {
                        let child = stack.pop().expect("validated");
                        tree.set_child(node, idx, Some(child));
                    }
                    stack.push(node);
                }

                OpCode::MUL_IMM_ADD => {
                    let b = stack.pop().expect("validated");
                    let a = stack.pop().expect("validated");
                    let mul = tree.alloc_fixed(OpClass::Mul, 1);
                    tree.node_mut(mul).arg = OpArg::Fma(arg as u32);
                    tree.set_child(mul, 0, Some(b));
                    let add = tree.alloc_node(OpClass::Add, 2);
                    tree.set_child(add, 0, Some(a));
                    tree.set_child(add, 1, Some(mul));
                    stack.push(add);
                }

                _ => {
                    return Err(TreeError::Malformed(OpcodeError::UnsupportedInstr {
                        pos,
                        op,
                    }))
                }
            }
        }

        debug_assert_eq!(stack.len(), 1);
        tree.set_root(stack.pop());

        Ok(tree)
    }

    /// Wraps `a` in a fresh one-child node of `class` with the folded
    /// operand in the op-arg slot.
    fn fold_wrap(&mut self, class: OpClass, arg: OpArg, a: NodeId) -> NodeId {
        let node = self.alloc_node(class, 1);
        self.node_mut(node).arg = arg;
        self.set_child(node, 0, Some(a));
        if let OpArg::Var(vi) = arg {
            self.touch_var(vi, node);
        }
        node
    }
}

fn fold_arg(op: OpCode, arg: i32) -> OpArg {
    if op.is_var_fold() {
        OpArg::Var(arg as u32)
    } else {
        OpArg::Cst(arg as u32)
    }
}
