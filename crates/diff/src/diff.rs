//! Stack-directed symbolic differentiation of opcode programs.
//!
//! The input is walked exactly once. For every abstract stack slot the walk
//! tracks whether the sub-expression there has a nonzero derivative, the
//! source range that produced it (`expend`) and the end of its derivative
//! code in the output (`expderiv`). Product, quotient and chain rules copy
//! original sub-expression blocks back out of the source program; a triple
//! reversal restores operand order when a rule assembled them backwards.

use crate::DiffError;
use bitvec::{bitvec, order::Lsb0, vec::BitVec};
use opcode::{nlconst, FuncCode, OpCode, OpcodeError, Program};

/// Differentiates a well-formed program with respect to the 1-based
/// variable `var`.
///
/// The result is a well-formed program over the same pool, storing into the
/// same equation index. A program with no occurrence of the variable yields
/// the zero program `HEADER; PUSH_ZERO; STORE`.
pub fn differentiate(program: &Program, var: i32) -> Result<Program, DiffError> {
    // A program with no body, the bare-header sentinel included,
    // differentiates to the sentinel again.
    if program.is_trivial() {
        let mut out = Program::with_capacity(1);
        out.push(OpCode::HEADER, 0);
        return Ok(out);
    }

    program.validate()?;

    let codelen = program.len();
    let mut out = Program::with_capacity(codelen);

    // Per-slot state; slot 0 is the bottom sentinel.
    let mut has_deriv: BitVec<u8, Lsb0> = bitvec![u8, Lsb0; 0; codelen + 1];
    let mut expend = vec![-1i32; codelen + 1];
    let mut expderiv = vec![-1i32; codelen + 1];
    let mut s = 0usize;

    for k in 0..codelen {
        let raw = program.instr(k);
        let arg = program.arg(k);
        let op = OpCode::from_raw(raw)
            .ok_or(DiffError::Malformed(OpcodeError::UnknownInstr { pos: k, raw }))?;

        log::trace!(
            "diff [{k:5}] {:<14} arg {arg:>6} slot {s} deriv {}",
            op.as_str(),
            has_deriv[s]
        );

        match op {
            OpCode::NOOP | OpCode::END => {}

            OpCode::HEADER => out.push(op, arg),

            OpCode::STORE => {
                if out.len() == 1 {
                    // Only the header was emitted: the derivative is zero.
                    out.push(OpCode::PUSH_ZERO, 0);
                }
                out.push(op, arg);
            }

            OpCode::PUSH_VAR => {
                s += 1;
                if arg == var {
                    has_deriv.set(s, true);
                    out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
                } else {
                    has_deriv.set(s, false);
                }
            }

            OpCode::UMIN_VAR => {
                s += 1;
                if arg == var {
                    has_deriv.set(s, true);
                    out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
                    out.push(OpCode::UMIN, 0);
                } else {
                    has_deriv.set(s, false);
                }
            }

            OpCode::PUSH_IMM | OpCode::PUSH_ZERO => {
                s += 1;
                has_deriv.set(s, false);
            }

            OpCode::ADD => {
                s -= 1;
                if has_deriv[s] {
                    if has_deriv[s + 1] {
                        out.push(OpCode::ADD, 0); /* u v */
                    } /* u c */
                } else if has_deriv[s + 1] {
                    has_deriv.set(s, true); /* c v */
                } /* c c */
            }

            OpCode::ADD_VAR => {
                if arg == var {
                    if has_deriv[s] {
                        out.push(OpCode::ADD_IMM, nlconst::ONE as i32); /* u v */
                    } else {
                        out.push(OpCode::PUSH_IMM, nlconst::ONE as i32); /* c v */
                        has_deriv.set(s, true);
                    }
                }
            }

            OpCode::ADD_IMM | OpCode::SUB_IMM => {}

            OpCode::SUB => {
                s -= 1;
                if has_deriv[s] {
                    if has_deriv[s + 1] {
                        out.push(OpCode::SUB, 0); /* u v */
                    } /* u c */
                } else if has_deriv[s + 1] {
                    out.push(OpCode::UMIN, 0); /* c v */
                    has_deriv.set(s, true);
                } /* c c */
            }

            OpCode::SUB_VAR => {
                if arg == var {
                    if has_deriv[s] {
                        out.push(OpCode::SUB_IMM, nlconst::ONE as i32); /* u v */
                    } else {
                        out.push(OpCode::PUSH_IMM, nlconst::ONE as i32); /* c v */
                        out.push(OpCode::UMIN, 0);
                        has_deriv.set(s, true);
                    }
                }
            }

            OpCode::MUL => {
                s -= 1;
                if has_deriv[s] {
                    if has_deriv[s + 1] {
                        /* u v: u'v + v'u, assembled as v'u first then swapped */
                        copyblock(&mut out, s, &expend, program);
                        out.push(OpCode::MUL, 0);
                        let out_len = out.len() as i32 - 1;
                        swap(&mut out, expderiv[s - 1], expderiv[s], out_len);
                        copyblock(&mut out, s + 1, &expend, program);
                        out.push(OpCode::MUL, 0);
                        out.push(OpCode::ADD, 0);
                    } else {
                        /* u c */
                        copyblock(&mut out, s + 1, &expend, program);
                        out.push(OpCode::MUL, 0);
                    }
                } else if has_deriv[s + 1] {
                    /* c v */
                    copyblock(&mut out, s, &expend, program);
                    out.push(OpCode::MUL, 0);
                    has_deriv.set(s, true);
                }
            }

            OpCode::MUL_VAR => {
                if arg == var {
                    /* v' = 1 */
                    if has_deriv[s] {
                        out.push(OpCode::MUL_VAR, var); /* u'v */
                        copyblock(&mut out, s, &expend, program); /* u */
                        out.push(OpCode::ADD, 0); /* u'v + u */
                    } else {
                        copyblock(&mut out, s, &expend, program);
                        has_deriv.set(s, true);
                    }
                } else if has_deriv[s] {
                    out.push(OpCode::MUL_VAR, arg);
                }
            }

            OpCode::MUL_IMM => {
                if has_deriv[s] {
                    out.push(OpCode::MUL_IMM, arg);
                }
            }

            OpCode::MUL_IMM_ADD => {
                /* u + v*c */
                s -= 1;
                if has_deriv[s] {
                    if has_deriv[s + 1] {
                        out.push(OpCode::MUL_IMM, arg);
                        out.push(OpCode::ADD, 0);
                    }
                } else if has_deriv[s + 1] {
                    out.push(OpCode::MUL_IMM, arg);
                    has_deriv.set(s, true);
                }
            }

            OpCode::DIV => {
                s -= 1;
                if has_deriv[s] {
                    if has_deriv[s + 1] {
                        /* u v: (u'v - v'u) / sqr(v) */
                        copyblock(&mut out, s, &expend, program);
                        out.push(OpCode::MUL, 0); /* v'u  */
                        out.push(OpCode::UMIN, 0); /* -v'u */
                        let out_len = out.len() as i32 - 1;
                        swap(&mut out, expderiv[s - 1], expderiv[s], out_len);
                        copyblock(&mut out, s + 1, &expend, program);
                        out.push(OpCode::MUL, 0); /* u'v */
                        out.push(OpCode::ADD, 0); /* u'v - v'u */
                        copyblock(&mut out, s + 1, &expend, program);
                        out.push(OpCode::CALL1, FuncCode::SQR.raw());
                        out.push(OpCode::DIV, 0);
                    } else {
                        /* u c */
                        copyblock(&mut out, s + 1, &expend, program);
                        out.push(OpCode::DIV, 0);
                    }
                } else if has_deriv[s + 1] {
                    /* c v */
                    copyblock(&mut out, s, &expend, program);
                    out.push(OpCode::MUL, 0);
                    out.push(OpCode::UMIN, 0);
                    copyblock(&mut out, s + 1, &expend, program);
                    out.push(OpCode::CALL1, FuncCode::SQR.raw());
                    out.push(OpCode::DIV, 0);
                    has_deriv.set(s, true);
                }
            }

            OpCode::DIV_VAR => {
                if arg == var {
                    /* v' = 1 */
                    if has_deriv[s] {
                        out.push(OpCode::MUL_VAR, var); /* u'v */
                        copyblock(&mut out, s, &expend, program);
                        out.push(OpCode::SUB, 0);
                        out.push(OpCode::PUSH_VAR, var);
                        out.push(OpCode::CALL1, FuncCode::SQR.raw());
                        out.push(OpCode::DIV, 0);
                    } else {
                        copyblock(&mut out, s, &expend, program); /* v'u, v'=1 */
                        out.push(OpCode::UMIN, 0); /* -v'u */
                        out.push(OpCode::PUSH_VAR, var);
                        out.push(OpCode::CALL1, FuncCode::SQR.raw());
                        out.push(OpCode::DIV, 0);
                        has_deriv.set(s, true);
                    }
                } else if has_deriv[s] {
                    out.push(OpCode::DIV_VAR, arg);
                }
            }

            OpCode::DIV_IMM => {
                if has_deriv[s] {
                    out.push(OpCode::DIV_IMM, arg);
                }
            }

            OpCode::UMIN => {
                if has_deriv[s] {
                    out.push(OpCode::UMIN, 0);
                }
            }

            OpCode::CALL1 => {
                if has_deriv[s] {
                    call1(&mut out, s, &expend, &expderiv, &mut has_deriv, program, arg)?;
                }
            }

            OpCode::CALL2 => {
                s -= 1;
                call2(&mut out, s, &expend, &expderiv, &mut has_deriv, program, arg)?;
            }

            OpCode::FUNC_ARG_COUNT | OpCode::CALLN => {
                return Err(DiffError::UnsupportedVariadic { op });
            }

            _ => {
                return Err(DiffError::Malformed(OpcodeError::UnsupportedInstr {
                    pos: k,
                    op,
                }));
            }
        }

        expderiv[s] = out.len() as i32 - 1;
        expend[s] = k as i32;
    }

    out.set_arg(0, out.len() as i32);

    Ok(out)
}

/// Chain rule for a one-argument call: emit the derivative template of the
/// function, then multiply with the derivative already on the slot.
fn call1(
    out: &mut Program,
    s: usize,
    expend: &[i32],
    expderiv: &[i32],
    has_deriv: &mut BitVec<u8, Lsb0>,
    program: &Program,
    arg: i32,
) -> Result<(), DiffError> {
    let func = FuncCode::from_raw(arg).ok_or(DiffError::UnsupportedCall1 { func: arg })?;

    match func {
        FuncCode::SQR => {
            /* 2u * u' */
            copyblock(out, s, expend, program);
            out.push(OpCode::MUL_IMM, nlconst::TWO as i32);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::EXP => {
            /* exp(u) * u' */
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, FuncCode::EXP.raw());
            out.push(OpCode::MUL, 0);
        }
        FuncCode::LOG => {
            /* (1/u) * u' */
            out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
            copyblock(out, s, expend, program);
            out.push(OpCode::DIV, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::LOG10 => {
            out.push(OpCode::PUSH_IMM, nlconst::OOLN10 as i32);
            copyblock(out, s, expend, program);
            out.push(OpCode::DIV, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::LOG2 => {
            out.push(OpCode::PUSH_IMM, nlconst::OOLN2 as i32);
            copyblock(out, s, expend, program);
            out.push(OpCode::DIV, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::SIN => {
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, FuncCode::COS.raw());
            out.push(OpCode::MUL, 0);
        }
        FuncCode::COS => {
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, FuncCode::SIN.raw());
            out.push(OpCode::UMIN, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::ARCTAN => {
            /* 1 / (1 + u^2) * u' */
            out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
            out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, FuncCode::SQR.raw());
            out.push(OpCode::ADD, 0);
            out.push(OpCode::DIV, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::ERF => {
            /* 1/sqrt(2 pi) * exp(-u^2/2) * u' */
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, FuncCode::SQR.raw());
            out.push(OpCode::MUL_IMM, nlconst::HALF as i32);
            out.push(OpCode::UMIN, 0);
            out.push(OpCode::CALL1, FuncCode::EXP.raw());
            out.push(OpCode::MUL_IMM, nlconst::OOSQRT2PI as i32);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::SQRT => {
            /* (1/2) / sqrt(u) * u' */
            out.push(OpCode::PUSH_IMM, nlconst::HALF as i32);
            copyblock(out, s, expend, program);
            out.push(OpCode::CALL1, arg);
            out.push(OpCode::DIV, 0);
            out.push(OpCode::MUL, 0);
        }
        FuncCode::ABS => {
            /* ifthen(u >= 0, 1, -1) * u' */
            copyblock(out, s, expend, program);
            out.push(OpCode::PUSH_IMM, nlconst::ZERO as i32);
            out.push(OpCode::CALL2, FuncCode::RELOPGE.raw());
            out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
            out.push(OpCode::PUSH_IMM, nlconst::ONE as i32);
            out.push(OpCode::UMIN, 0);
            out.push(OpCode::FUNC_ARG_COUNT, 3);
            out.push(OpCode::CALLN, FuncCode::IFTHEN.raw());
            out.push(OpCode::MUL, 0);
        }
        FuncCode::TRUNC
        | FuncCode::FLOOR
        | FuncCode::CEIL
        | FuncCode::ROUND
        | FuncCode::SIGN => {
            // Locally constant: discard the derivative code emitted for
            // this slot.
            has_deriv.set(s, false);
            out.truncate((expderiv[s - 1] + 1) as usize);
        }
        _ => return Err(DiffError::UnsupportedCall1 { func: arg }),
    }

    Ok(())
}

/// Multivariable chain rule for a two-argument call on `(u, v)`; only the
/// power family is differentiable, with templates per operand shape.
fn call2(
    out: &mut Program,
    s: usize,
    expend: &[i32],
    expderiv: &[i32],
    has_deriv: &mut BitVec<u8, Lsb0>,
    program: &Program,
    arg: i32,
) -> Result<(), DiffError> {
    let func = FuncCode::from_raw(arg);

    if has_deriv[s] {
        if has_deriv[s + 1] {
            /* u v: u^v * (v' ln(u) + u' v/u) */
            match func {
                Some(FuncCode::RPOWER) => {
                    copyblock(out, s, expend, program);
                    out.push(OpCode::CALL1, FuncCode::LOG.raw());
                    out.push(OpCode::MUL, 0); /* v' ln(u) */
                    swap(out, expderiv[s - 1], expderiv[s], out.len() as i32 - 1);
                    copyblock(out, s + 1, expend, program);
                    out.push(OpCode::MUL, 0); /* u' v */
                    copyblock(out, s, expend, program);
                    out.push(OpCode::DIV, 0); /* u' v/u */
                    out.push(OpCode::ADD, 0);
                    copyblock(out, s, expend, program);
                    copyblock(out, s + 1, expend, program);
                    out.push(OpCode::CALL2, arg);
                    out.push(OpCode::MUL, 0);
                }
                _ => return Err(DiffError::UnsupportedCall2 { func: arg }),
            }
        } else {
            /* u c: u' c u^(c-1) */
            match func {
                Some(FuncCode::RPOWER) | Some(FuncCode::POWER) | Some(FuncCode::VCPOWER) => {
                    copyblock(out, s + 1, expend, program); /* c   */
                    out.push(OpCode::MUL, 0); /* u'c */
                    copyblock(out, s, expend, program); /* u   */
                    copyblock(out, s + 1, expend, program); /* c   */
                    out.push(OpCode::SUB_IMM, nlconst::ONE as i32); /* c-1 */
                    out.push(OpCode::CALL2, arg); /* power(u, c-1) */
                    out.push(OpCode::MUL, 0);
                }
                _ => return Err(DiffError::UnsupportedCall2 { func: arg }),
            }
        }
    } else if has_deriv[s + 1] {
        /* c v: c^v ln(c) v' */
        has_deriv.set(s, true);
        match func {
            Some(FuncCode::RPOWER) | Some(FuncCode::CVPOWER) => {
                copyblock(out, s, expend, program);
                copyblock(out, s + 1, expend, program);
                out.push(OpCode::CALL2, arg);
                copyblock(out, s, expend, program);
                out.push(OpCode::CALL1, FuncCode::LOG.raw());
                out.push(OpCode::MUL, 0);
                out.push(OpCode::MUL, 0);
            }
            _ => return Err(DiffError::UnsupportedCall2 { func: arg }),
        }
    }

    Ok(())
}

/// Copies the source range that produced the value on `slot` into the
/// output, then trims any trailing `FUNC_ARG_COUNT` left dangling by the
/// copy boundary.
fn copyblock(out: &mut Program, slot: usize, expend: &[i32], src: &Program) {
    debug_assert!(slot > 0);

    if expend[slot] > -1 {
        let istart = expend[slot - 1] + 1;
        let iend = expend[slot];
        for i in istart..=iend {
            out.push_raw(src.instr(i as usize), src.arg(i as usize));
        }
    }

    let mut len = out.len();
    while len > 0 && out.instr(len - 1) == OpCode::FUNC_ARG_COUNT.raw() {
        len -= 1;
    }
    out.truncate(len);
}

/// Reorders the two output segments `(a, b]` and `(b, c]` with three
/// reversals, restoring operand order after a rule assembled them swapped.
fn swap(out: &mut Program, a: i32, b: i32, c: i32) {
    let (instrs, args) = out.parts_mut();
    reverse(instrs, args, a + 1, b);
    reverse(instrs, args, b + 1, c);
    reverse(instrs, args, a + 1, c);
}

fn reverse(instrs: &mut [i32], args: &mut [i32], mut m: i32, mut n: i32) {
    while m < n {
        instrs.swap(m as usize, n as usize);
        args.swap(m as usize, n as usize);
        m += 1;
        n -= 1;
    }
}
