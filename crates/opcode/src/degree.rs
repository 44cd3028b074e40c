//! Algebraic-degree classification of opcode programs.
//!
//! A single walk over the program keeps one degree per abstract stack slot
//! and combines them with saturating polynomial arithmetic: constants are 0,
//! variables 1, `ADD`/`SUB` take the max, `MUL` adds, `DIV` by a
//! non-constant tags the result with a division marker, and anything the
//! tracking cannot follow degrades to [`Degree::FULLY_NONLINEAR`].

use crate::{nlconst, FuncCode, OpCode, OpcodeError, Program};
use core::fmt;

/// Algebraic degree of an expression, with division and fully-nonlinear
/// markers.
///
/// Plain polynomial degrees occupy `0..=MAX_POLY`. A division is encoded as
/// the `DIV` bit plus 3-bit numerator and denominator degrees (saturated at
/// 7 each). `FULLY_NONLINEAR` absorbs everything else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Degree(u8);

impl Degree {
    /// Degree of a constant.
    pub const CONSTANT: Self = Self(0);
    /// Degree of a bare variable.
    pub const LINEAR: Self = Self(1);
    /// Saturation point of polynomial-degree tracking.
    pub const MAX_POLY: Self = Self(Self::DIV_BIT - 1);
    /// Marker for an expression outside polynomial-over-polynomial reach.
    pub const FULLY_NONLINEAR: Self = Self(u8::MAX);

    const DIV_BIT: u8 = 1 << 6;

    /// Wraps a plain polynomial degree, saturating at [`Self::MAX_POLY`].
    pub const fn poly(d: u8) -> Self {
        if d >= Self::MAX_POLY.0 {
            Self::MAX_POLY
        } else {
            Self(d)
        }
    }

    /// Builds the division marker for `numer / denom`, keeping 3 bits of
    /// each operand degree.
    pub const fn mkdiv(numer: u8, denom: u8) -> Self {
        let n = if numer > 7 { 7 } else { numer };
        let d = if denom > 7 { 7 } else { denom };
        Self(Self::DIV_BIT | (n << 3) | d)
    }

    /// Returns `true` for a division-marked degree.
    pub const fn is_div(&self) -> bool {
        self.0 & Self::DIV_BIT != 0 && self.0 != u8::MAX
    }

    /// Returns `true` for the fully-nonlinear marker.
    pub const fn is_fully_nonlinear(&self) -> bool {
        self.0 == u8::MAX
    }

    /// Returns `true` for a constant expression.
    pub const fn is_constant(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for an affine expression.
    pub const fn is_linear(&self) -> bool {
        self.0 == 1
    }

    /// The plain polynomial degree, `None` for division or fully-nonlinear
    /// markers.
    pub const fn as_poly(&self) -> Option<u8> {
        if self.0 <= Self::MAX_POLY.0 {
            Some(self.0)
        } else {
            None
        }
    }

    /// Raw encoded value.
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Degree of a sum: the max, with markers absorbing plain degrees.
    fn add(self, rhs: Self) -> Self {
        if self.0 >= Self::MAX_POLY.0 || rhs.0 >= Self::MAX_POLY.0 {
            return if self.0 >= Self::MAX_POLY.0 { self } else { rhs };
        }
        Self(self.0.max(rhs.0))
    }

    /// Degree of a product: the sum, saturating at [`Self::MAX_POLY`].
    fn mul(self, rhs: Self) -> Self {
        if self.0 >= Self::MAX_POLY.0 || rhs.0 >= Self::MAX_POLY.0 {
            return if self.0 >= Self::MAX_POLY.0 { self } else { rhs };
        }
        let sum = self.0 as u16 + rhs.0 as u16;
        if sum >= Self::MAX_POLY.0 as u16 {
            Self::MAX_POLY
        } else {
            Self(sum as u8)
        }
    }

    /// Degree of a quotient: unchanged for a constant denominator, the
    /// division marker when both sides are polynomial, fully nonlinear
    /// otherwise.
    fn div(self, rhs: Self) -> Self {
        if rhs.is_constant() {
            return self;
        }
        if self.0 <= Self::MAX_POLY.0 && rhs.0 <= Self::MAX_POLY.0 {
            return Self::mkdiv(self.0, rhs.0);
        }
        Self::FULLY_NONLINEAR
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fully_nonlinear() {
            f.write_str("nonlinear")
        } else if self.is_div() {
            write!(f, "div({},{})", (self.0 >> 3) & 7, self.0 & 7)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Classifies a well-formed program as constant / linear / polynomial /
/// division / general nonlinear.
pub fn compute_degree(program: &Program) -> Result<Degree, OpcodeError> {
    let mut stack: Vec<Degree> = Vec::new();
    let mut cur = Degree::CONSTANT;
    let mut pending_arity: Option<i32> = None;

    for (pos, (&raw, &arg)) in program.instrs().iter().zip(program.args()).enumerate() {
        let op = OpCode::from_raw(raw).ok_or(OpcodeError::UnknownInstr { pos, raw })?;
        if op.is_reserved() {
            return Err(OpcodeError::UnsupportedInstr { pos, op });
        }

        log::trace!("degree [{pos:5}] {:<14} arg {arg:>6} cur {cur}", op.as_str());

        match op {
            OpCode::NOOP | OpCode::HEADER | OpCode::STORE | OpCode::END => {}
            // Unary sign flip and constant-folded operands change nothing.
            OpCode::UMIN
            | OpCode::ADD_IMM
            | OpCode::SUB_IMM
            | OpCode::MUL_IMM
            | OpCode::DIV_IMM => {}
            OpCode::PUSH_IMM | OpCode::PUSH_ZERO => {
                stack.push(cur);
                cur = Degree::CONSTANT;
            }
            OpCode::PUSH_VAR | OpCode::UMIN_VAR => {
                stack.push(cur);
                cur = Degree::LINEAR;
            }
            OpCode::ADD_VAR | OpCode::SUB_VAR => cur = cur.add(Degree::LINEAR),
            OpCode::MUL_VAR => cur = cur.mul(Degree::LINEAR),
            OpCode::DIV_VAR => cur = cur.div(Degree::LINEAR),
            OpCode::ADD | OpCode::SUB | OpCode::MUL_IMM_ADD => {
                let lhs = pop(&mut stack, pos, op)?;
                cur = lhs.add(cur);
            }
            OpCode::MUL => {
                let lhs = pop(&mut stack, pos, op)?;
                cur = lhs.mul(cur);
            }
            OpCode::DIV => {
                let lhs = pop(&mut stack, pos, op)?;
                cur = lhs.div(cur);
            }
            OpCode::CALL1 => {
                if FuncCode::from_raw(arg) == Some(FuncCode::SQR) {
                    cur = cur.mul(cur);
                } else if !cur.is_constant() {
                    cur = Degree::FULLY_NONLINEAR;
                }
            }
            OpCode::CALL2 => {
                let base = pop(&mut stack, pos, op)?;
                cur = call2_degree(program, pos, arg, base, cur);
            }
            OpCode::FUNC_ARG_COUNT => pending_arity = Some(arg),
            OpCode::CALLN => {
                let n = pending_arity
                    .take()
                    .ok_or(OpcodeError::MissingArity { pos })?;
                let mut constant = cur.is_constant();
                for _ in 1..n.max(1) {
                    constant &= pop(&mut stack, pos, op)?.is_constant();
                }
                cur = if constant {
                    Degree::CONSTANT
                } else {
                    Degree::FULLY_NONLINEAR
                };
            }
            _ => return Err(OpcodeError::UnsupportedInstr { pos, op }),
        }
    }

    if stack.len() != 1 {
        return Err(OpcodeError::StackImbalance { depth: stack.len() });
    }

    Ok(cur)
}

fn pop(stack: &mut Vec<Degree>, pos: usize, op: OpCode) -> Result<Degree, OpcodeError> {
    stack.pop().ok_or(OpcodeError::StackUnderflow { pos, op })
}

/// Degree of a two-argument call on `(base, expo)`.
///
/// Only the power family with a small constant exponent reduces to a plain
/// polynomial degree; the exponent shape is read from the instruction that
/// produced the top slot, one position back.
fn call2_degree(program: &Program, pos: usize, arg: i32, base: Degree, expo: Degree) -> Degree {
    let is_power = FuncCode::from_raw(arg).is_some_and(|f| f.is_power_family());

    if !is_power {
        return if base.is_constant() && expo.is_constant() {
            Degree::CONSTANT
        } else {
            Degree::FULLY_NONLINEAR
        };
    }

    let prev_instr = program.instr(pos - 1);
    let prev_arg = program.arg(pos - 1);
    let expo_is_zero = prev_instr == OpCode::PUSH_ZERO.raw()
        || (prev_instr == OpCode::PUSH_IMM.raw() && prev_arg == nlconst::ZERO as i32);

    if expo_is_zero {
        return Degree::CONSTANT;
    }

    if prev_instr == OpCode::PUSH_IMM.raw() {
        // Pool indices are 1-based; only the reserved small integers reduce.
        return match prev_arg as u32 {
            nlconst::ONE => base,
            nlconst::TWO => base.mul(base),
            nlconst::THREE => base.mul(base.mul(base)),
            nlconst::FOUR => base.mul(base).mul(base.mul(base)),
            _ => Degree::FULLY_NONLINEAR,
        };
    }

    Degree::FULLY_NONLINEAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func;

    fn degree_of(ops: &[(OpCode, i32)]) -> Degree {
        compute_degree(&Program::from_ops(ops)).unwrap()
    }

    #[test]
    fn constant_program() {
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_IMM, 1),
            (OpCode::ADD_IMM, 6),
            (OpCode::UMIN, 0),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_constant());
    }

    #[test]
    fn affine_program() {
        // 1 + x2 + x3
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_IMM, 1),
            (OpCode::ADD_VAR, 2),
            (OpCode::ADD_VAR, 3),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_linear());
    }

    #[test]
    fn affine_sum_of_vars() {
        // x1 + x2
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 1),
            (OpCode::PUSH_VAR, 2),
            (OpCode::ADD, 0),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_linear());
    }

    #[test]
    fn bilinear_product() {
        // x2 * x3
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::MUL_VAR, 3),
            (OpCode::UMIN, 0),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(2));
    }

    #[test]
    fn square_via_sqr() {
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::CALL1, func::SQR as i32),
            (OpCode::UMIN, 0),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(2));
    }

    #[test]
    fn exp_is_fully_nonlinear() {
        let d = degree_of(&[
            (OpCode::HEADER, 4),
            (OpCode::PUSH_VAR, 2),
            (OpCode::CALL1, func::EXP as i32),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_fully_nonlinear());
    }

    #[test]
    fn call1_on_constant_stays_constant() {
        let d = degree_of(&[
            (OpCode::HEADER, 4),
            (OpCode::PUSH_IMM, 6),
            (OpCode::CALL1, func::EXP as i32),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_constant());
    }

    #[test]
    fn power_with_small_constant_exponent() {
        // x2 ** 2 via rpower
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_IMM, nlconst::TWO as i32),
            (OpCode::CALL2, func::RPOWER as i32),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(2));

        // x2 ** 3
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_IMM, nlconst::THREE as i32),
            (OpCode::CALL2, func::VCPOWER as i32),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(3));

        // x2 ** 4
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_IMM, nlconst::FOUR as i32),
            (OpCode::CALL2, func::POWER as i32),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(4));
    }

    #[test]
    fn power_with_zero_exponent() {
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_ZERO, 0),
            (OpCode::CALL2, func::RPOWER as i32),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_constant());
    }

    #[test]
    fn power_with_variable_exponent() {
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_VAR, 3),
            (OpCode::CALL2, func::RPOWER as i32),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_fully_nonlinear());
    }

    #[test]
    fn division_by_nonconstant_is_marked() {
        // x2 / (1 + x3)
        let d = degree_of(&[
            (OpCode::HEADER, 7),
            (OpCode::PUSH_VAR, 2),
            (OpCode::PUSH_IMM, 1),
            (OpCode::ADD_VAR, 3),
            (OpCode::DIV, 0),
            (OpCode::UMIN, 0),
            (OpCode::STORE, 1),
        ]);
        assert!(d.is_div());
        assert_eq!(d, Degree::mkdiv(1, 1));
    }

    #[test]
    fn division_by_constant_keeps_degree() {
        let d = degree_of(&[
            (OpCode::HEADER, 5),
            (OpCode::PUSH_VAR, 2),
            (OpCode::MUL_VAR, 2),
            (OpCode::DIV_IMM, 6),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(d.as_poly(), Some(2));
    }

    #[test]
    fn degree_saturates() {
        // Repeated squaring blows past the cap.
        let mut ops = vec![(OpCode::HEADER, 11), (OpCode::PUSH_VAR, 1)];
        for _ in 0..8 {
            ops.push((OpCode::CALL1, func::SQR as i32));
        }
        ops.push((OpCode::STORE, 1));
        let d = degree_of(&ops);
        assert_eq!(d, Degree::MAX_POLY);
    }

    #[test]
    fn malformed_program_is_reported() {
        let p = Program::from_ops(&[
            (OpCode::HEADER, 4),
            (OpCode::PUSH_VAR, 1),
            (OpCode::PUSH_VAR, 2),
            (OpCode::STORE, 1),
        ]);
        assert_eq!(
            compute_degree(&p),
            Err(OpcodeError::StackImbalance { depth: 2 })
        );
    }

    #[test]
    fn display() {
        assert_eq!(Degree::CONSTANT.to_string(), "0");
        assert_eq!(Degree::poly(3).to_string(), "3");
        assert_eq!(Degree::mkdiv(1, 2).to_string(), "div(1,2)");
        assert_eq!(Degree::FULLY_NONLINEAR.to_string(), "nonlinear");
    }
}
