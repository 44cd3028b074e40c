//! Expression evaluation: a post-order fold over the tree.
//!
//! Values come from a [`Binding`], which resolves variable ids and pool
//! indices; two implementations cover the caller-supplied-vector and the
//! shared-pool cases. Floating-point trouble is detected per operation and
//! reported through [`EvalError`] instead of silently propagating NaN.

use crate::node::{NodeId, OpArg, OpClass};
use crate::{EvalError, Tree};
use opcode::FuncCode;
use primitives::{MathError, PoolRef};

/// Source of variable and constant values during evaluation.
pub trait Binding {
    /// Value of the 1-based variable `vi`.
    fn var(&self, vi: u32) -> Result<f64, EvalError>;
    /// Value of the 1-based pool index `idx`.
    fn cst(&self, idx: u32) -> Result<f64, EvalError>;
}

/// Binding over two caller-supplied slices, both addressed 1-based.
#[derive(Clone, Copy, Debug)]
pub struct SliceBinding<'a> {
    vars: &'a [f64],
    consts: &'a [f64],
}

impl<'a> SliceBinding<'a> {
    /// Creates a binding; `vars[vi - 1]` is the value of variable `vi` and
    /// `consts[idx - 1]` the pool value at `idx`.
    pub fn new(vars: &'a [f64], consts: &'a [f64]) -> Self {
        Self { vars, consts }
    }
}

impl Binding for SliceBinding<'_> {
    fn var(&self, vi: u32) -> Result<f64, EvalError> {
        if vi == 0 {
            return Err(EvalError::BadVarIndex { var: vi });
        }
        self.vars
            .get(vi as usize - 1)
            .copied()
            .ok_or(EvalError::BadVarIndex { var: vi })
    }

    fn cst(&self, idx: u32) -> Result<f64, EvalError> {
        if idx == 0 {
            return Err(EvalError::BadPoolIndex { idx });
        }
        self.consts
            .get(idx as usize - 1)
            .copied()
            .ok_or(EvalError::BadPoolIndex { idx })
    }
}

/// Binding over variable values plus the shared, reference-counted
/// constants pool.
///
/// The binding holds its own reference on the pool handle, so the pool
/// outlives every evaluation that reads through it.
#[derive(Clone, Debug)]
pub struct PoolBinding<'a> {
    vars: &'a [f64],
    pool: PoolRef,
}

impl<'a> PoolBinding<'a> {
    /// Creates a binding; `vars[vi - 1]` is the value of variable `vi`.
    pub fn new(vars: &'a [f64], pool: PoolRef) -> Self {
        Self { vars, pool }
    }
}

impl Binding for PoolBinding<'_> {
    fn var(&self, vi: u32) -> Result<f64, EvalError> {
        if vi == 0 {
            return Err(EvalError::BadVarIndex { var: vi });
        }
        self.vars
            .get(vi as usize - 1)
            .copied()
            .ok_or(EvalError::BadVarIndex { var: vi })
    }

    fn cst(&self, idx: u32) -> Result<f64, EvalError> {
        self.pool
            .borrow()
            .get(idx)
            .ok_or(EvalError::BadPoolIndex { idx })
    }
}

impl Tree {
    /// Evaluates the tree under `binding`; an empty tree evaluates to zero.
    pub fn evaluate<B: Binding>(&self, binding: &B) -> Result<f64, EvalError> {
        match self.root() {
            Some(root) => self.eval_node(root, binding),
            None => Ok(0.),
        }
    }

    fn eval_node<B: Binding>(&self, id: NodeId, binding: &B) -> Result<f64, EvalError> {
        let node = *self.node(id);

        let arg_val = |b: &B| -> Result<Option<f64>, EvalError> {
            match node.arg {
                OpArg::Unset => Ok(None),
                OpArg::Cst(k) | OpArg::Fma(k) => b.cst(k).map(Some),
                OpArg::Var(vi) => b.var(vi).map(Some),
            }
        };

        match node.op {
            OpClass::Cst => binding.cst(node.value),
            OpClass::Var => binding.var(node.value),

            OpClass::Add => {
                let mut acc = 0.;
                for child in self.child_ids(id) {
                    acc += self.eval_node(child, binding)?;
                }
                if let Some(v) = arg_val(binding)? {
                    acc += v;
                }
                finite_or_overflow(acc)
            }

            OpClass::Mul => {
                let mut acc = 1.;
                for child in self.child_ids(id) {
                    acc *= self.eval_node(child, binding)?;
                }
                if let Some(v) = arg_val(binding)? {
                    acc *= v;
                }
                finite_or_overflow(acc)
            }

            OpClass::Sub => {
                let mut kids = self.child_ids(id);
                let first = kids.next().ok_or(EvalError::InvalidNode)?;
                let mut acc = self.eval_node(first, binding)?;
                for child in kids {
                    acc -= self.eval_node(child, binding)?;
                }
                if let Some(v) = arg_val(binding)? {
                    acc -= v;
                }
                finite_or_overflow(acc)
            }

            OpClass::Div => {
                let mut kids = self.child_ids(id);
                let first = kids.next().ok_or(EvalError::InvalidNode)?;
                let mut acc = self.eval_node(first, binding)?;
                for child in kids {
                    acc = div_checked(acc, self.eval_node(child, binding)?)?;
                }
                if let Some(v) = arg_val(binding)? {
                    acc = div_checked(acc, v)?;
                }
                Ok(acc)
            }

            OpClass::Umin => {
                if let OpArg::Var(vi) = node.arg {
                    return Ok(-binding.var(vi)?);
                }
                let child = self.child_ids(id).next().ok_or(EvalError::InvalidNode)?;
                Ok(-self.eval_node(child, binding)?)
            }

            OpClass::Call1 => {
                let child = self.child_ids(id).next().ok_or(EvalError::InvalidNode)?;
                let x = self.eval_node(child, binding)?;
                apply1(node.value as i32, x)
            }

            OpClass::Call2 => {
                let mut kids = self.child_ids(id);
                let a = kids.next().ok_or(EvalError::InvalidNode)?;
                let b = kids.next().ok_or(EvalError::InvalidNode)?;
                let x = self.eval_node(a, binding)?;
                let y = self.eval_node(b, binding)?;
                apply2(node.value as i32, x, y)
            }

            OpClass::CallN => {
                let mut args = Vec::new();
                for child in self.child_ids(id) {
                    args.push(self.eval_node(child, binding)?);
                }
                apply_n(node.value as i32, &args)
            }
        }
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.
    } else {
        0.
    }
}

fn math_err(kind: MathError, func: i32) -> EvalError {
    EvalError::Math {
        kind,
        func: Some(func),
    }
}

fn finite_or_overflow(x: f64) -> Result<f64, EvalError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(MathError::Overflow.into())
    }
}

fn div_checked(num: f64, den: f64) -> Result<f64, EvalError> {
    if den == 0. {
        return Err(MathError::Pole.into());
    }
    finite_or_overflow(num / den)
}

/// One-argument function dispatch with per-function domain checks.
fn apply1(func: i32, x: f64) -> Result<f64, EvalError> {
    let code = FuncCode::from_raw(func).ok_or(EvalError::UnsupportedFunction { func })?;

    let r = match code {
        FuncCode::SQR => x * x,
        FuncCode::EXP => {
            let r = x.exp();
            if r == 0. && x < 0. {
                return Err(math_err(MathError::Underflow, func));
            }
            r
        }
        FuncCode::LOG => log_checked(x, func, f64::ln)?,
        FuncCode::LOG10 => log_checked(x, func, f64::log10)?,
        FuncCode::LOG2 => log_checked(x, func, f64::log2)?,
        FuncCode::SQRT => {
            if x < 0. {
                return Err(math_err(MathError::Domain, func));
            }
            x.sqrt()
        }
        FuncCode::ABS => x.abs(),
        FuncCode::SIN => x.sin(),
        FuncCode::COS => x.cos(),
        FuncCode::TAN => x.tan(),
        FuncCode::ARCTAN => x.atan(),
        FuncCode::ARCSIN => {
            if !(-1. ..=1.).contains(&x) {
                return Err(math_err(MathError::Domain, func));
            }
            x.asin()
        }
        FuncCode::ARCCOS => {
            if !(-1. ..=1.).contains(&x) {
                return Err(math_err(MathError::Domain, func));
            }
            x.acos()
        }
        FuncCode::SINH => x.sinh(),
        FuncCode::COSH => x.cosh(),
        FuncCode::TANH => x.tanh(),
        FuncCode::SIGN => {
            if x == 0. {
                0.
            } else {
                x.signum()
            }
        }
        FuncCode::TRUNC => x.trunc(),
        FuncCode::FLOOR => x.floor(),
        FuncCode::CEIL => x.ceil(),
        FuncCode::ROUND => x.round(),
        FuncCode::FRAC => x - x.trunc(),
        _ => return Err(EvalError::UnsupportedFunction { func }),
    };

    if r.is_nan() && !x.is_nan() {
        return Err(math_err(MathError::Domain, func));
    }
    if r.is_infinite() && x.is_finite() {
        return Err(math_err(MathError::Overflow, func));
    }
    Ok(r)
}

fn log_checked(x: f64, func: i32, f: impl Fn(f64) -> f64) -> Result<f64, EvalError> {
    if x < 0. {
        return Err(math_err(MathError::Domain, func));
    }
    if x == 0. {
        return Err(math_err(MathError::Pole, func));
    }
    Ok(f(x))
}

/// Two-argument function dispatch.
fn apply2(func: i32, x: f64, y: f64) -> Result<f64, EvalError> {
    let code = FuncCode::from_raw(func).ok_or(EvalError::UnsupportedFunction { func })?;

    let r = match code {
        FuncCode::POWER | FuncCode::RPOWER | FuncCode::CVPOWER | FuncCode::VCPOWER => {
            if x == 0. && y < 0. {
                return Err(math_err(MathError::Pole, func));
            }
            if x < 0. && y.fract() != 0. {
                return Err(math_err(MathError::Domain, func));
            }
            x.powf(y)
        }
        FuncCode::ARCTAN2 => x.atan2(y),
        FuncCode::MOD => {
            if y == 0. {
                return Err(math_err(MathError::Pole, func));
            }
            x % y
        }
        FuncCode::DIV => {
            if y == 0. {
                return Err(math_err(MathError::Pole, func));
            }
            x / y
        }
        FuncCode::MIN => x.min(y),
        FuncCode::MAX => x.max(y),
        FuncCode::RELOPEQ => truth(x == y),
        FuncCode::RELOPNE => truth(x != y),
        FuncCode::RELOPGT => truth(x > y),
        FuncCode::RELOPGE => truth(x >= y),
        FuncCode::RELOPLT => truth(x < y),
        FuncCode::RELOPLE => truth(x <= y),
        _ => return Err(EvalError::UnsupportedFunction { func }),
    };

    if r.is_nan() && !x.is_nan() && !y.is_nan() {
        return Err(math_err(MathError::Domain, func));
    }
    if r.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(math_err(MathError::Overflow, func));
    }
    Ok(r)
}

/// Variadic function dispatch.
fn apply_n(func: i32, args: &[f64]) -> Result<f64, EvalError> {
    let code = FuncCode::from_raw(func).ok_or(EvalError::UnsupportedFunction { func })?;

    match code {
        FuncCode::IFTHEN => {
            if args.len() != 3 {
                return Err(EvalError::InvalidNode);
            }
            Ok(if args[0] != 0. { args[1] } else { args[2] })
        }
        FuncCode::MIN => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(EvalError::InvalidNode),
        FuncCode::MAX => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or(EvalError::InvalidNode),
        _ => Err(EvalError::UnsupportedFunction { func }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeError;
    use opcode::test_programs;
    use primitives::Pool;

    fn eval_program(
        program: &opcode::Program,
        vars: &[f64],
    ) -> Result<Result<f64, EvalError>, TreeError> {
        let tree = Tree::from_program(program)?;
        let pool = Pool::new().into_shared();
        Ok(tree.evaluate(&PoolBinding::new(vars, pool)))
    }

    #[test]
    fn evaluates_recorded_programs() -> anyhow::Result<()> {
        // vars are 1-based: x1, x2, x3.
        let vars = [0., 3., 5.];

        // -(x2*x2)
        let v = eval_program(&test_programs::neg_square(), &vars)??;
        assert_eq!(v, -9.);

        // -(x2*x2 + x2*x3)
        let v = eval_program(&test_programs::neg_sum_of_products(), &vars)??;
        assert_eq!(v, -(9. + 15.));

        // -(x2/(1 + x3))
        let v = eval_program(&test_programs::neg_quotient(), &vars)??;
        assert_eq!(v, -0.5);

        // -(log(1 + x2))
        let v = eval_program(&test_programs::neg_log(), &vars)??;
        assert!((v + 4f64.ln()).abs() < 1e-12);

        // -(3*x2**2)
        let v = eval_program(&test_programs::neg_scaled_power(), &vars)??;
        assert_eq!(v, -27.);

        // sqr(x1)*2 + sqr(x2)*2 with x1=0, x2=3
        let v = eval_program(&test_programs::sqr_fma_chain(), &vars)??;
        assert_eq!(v, 18.);

        Ok(())
    }

    #[test]
    fn evaluates_derivative_output() -> anyhow::Result<()> {
        // d(-(x2/(1+x3)))/dx3 at x2=3, x3=1 is 3/4.
        let d = diff::differentiate(&test_programs::neg_quotient(), 3)?;
        let v = eval_program(&d, &[0., 3., 1.])??;
        assert_eq!(v, 0.75);
        Ok(())
    }

    #[test]
    fn evaluates_abs_derivative_selector() -> anyhow::Result<()> {
        let input = opcode::Program::from_ops(&[
            (opcode::OpCode::HEADER, 4),
            (opcode::OpCode::PUSH_VAR, 1),
            (opcode::OpCode::CALL1, opcode::func::ABS as i32),
            (opcode::OpCode::STORE, 1),
        ]);
        let d = diff::differentiate(&input, 1)?;

        // d|x|/dx is the sign selector: 1 above zero, -1 below.
        assert_eq!(eval_program(&d, &[2.5])??, 1.);
        assert_eq!(eval_program(&d, &[-2.5])??, -1.);
        // At the origin the selector picks the right branch of >=.
        assert_eq!(eval_program(&d, &[0.])??, 1.);
        Ok(())
    }

    #[test]
    fn empty_tree_evaluates_to_zero() {
        let tree = Tree::new();
        let pool = Pool::new().into_shared();
        assert_eq!(tree.evaluate(&PoolBinding::new(&[], pool)), Ok(0.));
    }

    #[test]
    fn domain_and_pole_errors() -> anyhow::Result<()> {
        // log of a negative argument.
        let p = opcode::Program::from_ops(&[
            (opcode::OpCode::HEADER, 4),
            (opcode::OpCode::PUSH_VAR, 1),
            (opcode::OpCode::CALL1, opcode::func::LOG as i32),
            (opcode::OpCode::STORE, 1),
        ]);
        let tree = Tree::from_program(&p)?;
        let pool = Pool::new().into_shared();
        assert_eq!(
            tree.evaluate(&PoolBinding::new(&[-1.], pool.clone())),
            Err(EvalError::Math {
                kind: MathError::Domain,
                func: Some(opcode::func::LOG as i32)
            })
        );
        assert_eq!(
            tree.evaluate(&PoolBinding::new(&[0.], pool)),
            Err(EvalError::Math {
                kind: MathError::Pole,
                func: Some(opcode::func::LOG as i32)
            })
        );

        // Division by zero: x2/(1+x3) at x3 = -1.
        let out = eval_program(&test_programs::neg_quotient(), &[0., 1., -1.])?;
        assert_eq!(out, Err(EvalError::Math { kind: MathError::Pole, func: None }));
        Ok(())
    }

    #[test]
    fn overflow_and_underflow() -> anyhow::Result<()> {
        let p = opcode::Program::from_ops(&[
            (opcode::OpCode::HEADER, 4),
            (opcode::OpCode::PUSH_VAR, 1),
            (opcode::OpCode::CALL1, opcode::func::EXP as i32),
            (opcode::OpCode::STORE, 1),
        ]);
        let tree = Tree::from_program(&p)?;
        let pool = Pool::new().into_shared();

        assert_eq!(
            tree.evaluate(&PoolBinding::new(&[1000.], pool.clone())),
            Err(EvalError::Math {
                kind: MathError::Overflow,
                func: Some(opcode::func::EXP as i32)
            })
        );
        assert_eq!(
            tree.evaluate(&PoolBinding::new(&[-1000.], pool)),
            Err(EvalError::Math {
                kind: MathError::Underflow,
                func: Some(opcode::func::EXP as i32)
            })
        );
        Ok(())
    }

    #[test]
    fn binding_range_errors() {
        let mut tree = Tree::new();
        let leaf = tree.alloc_leaf(OpClass::Var, 5);
        tree.set_root(Some(leaf));
        let pool = Pool::new().into_shared();

        assert_eq!(
            tree.evaluate(&PoolBinding::new(&[1., 2.], pool)),
            Err(EvalError::BadVarIndex { var: 5 })
        );

        let mut tree = Tree::new();
        let leaf = tree.alloc_leaf(OpClass::Cst, 200);
        tree.set_root(Some(leaf));
        assert_eq!(
            tree.evaluate(&SliceBinding::new(&[], &[1.0; 16])),
            Err(EvalError::BadPoolIndex { idx: 200 })
        );
    }

    #[test]
    fn slice_and_pool_bindings_agree() -> anyhow::Result<()> {
        let tree = Tree::from_program(&test_programs::neg_log())?;
        let pool = Pool::new();
        let vars = [0., 2.];

        let b = tree.evaluate(&SliceBinding::new(&vars, pool.values()))?;
        let a = tree.evaluate(&PoolBinding::new(&vars, pool.into_shared()))?;
        assert_eq!(a, b);
        Ok(())
    }
}
