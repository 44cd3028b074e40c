//! GraphViz rendering of opcode programs, for diagnostics.
//!
//! Nodes are styled by role: variables blue, constants gray, calls green
//! and the fused multiply-add salmon. Folded `*_VAR`/`*_IMM` operands get a
//! synthetic child node so the rendered tree shows the full expression.

use crate::{ArgKind, FuncCode, OpCode, OpTree, Program};
use primitives::Pool;
use std::io::{self, Write};

const STYLE_VAR: &str = ",style=filled,color=lightblue1";
const STYLE_VAR_ARG: &str = ",style=filled,color=lightblue3";
const STYLE_CST: &str = ",style=filled,color=gray88";
const STYLE_CALL: &str = ",style=filled,color=lightseagreen";
const STYLE_FMA: &str = ",style=filled,color=lightsalmon1";

/// Renders a well-formed program as a GraphViz digraph into `sink`.
pub fn program_to_dot<W: Write>(
    program: &Program,
    pool: Option<&Pool>,
    sink: &mut W,
) -> io::Result<()> {
    let otree =
        OpTree::new(program).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    optree_to_dot(&otree, pool, sink)
}

/// Renders an [`OpTree`] as a GraphViz digraph into `sink`.
pub fn optree_to_dot<W: Write>(
    otree: &OpTree<'_>,
    pool: Option<&Pool>,
    sink: &mut W,
) -> io::Result<()> {
    let program = otree.program();

    writeln!(
        sink,
        "digraph structs {{ ordering=out;\n node [shape=\"plaintext\", style=\"filled, rounded\", margin=0.2];"
    )?;
    if let Some(ei) = program.equ_idx() {
        writeln!(sink, "label=\"opcode program for equation {ei}\";")?;
    }

    // Nodes and arcs in one pass, leaves before their parents.
    for pos in 1..program.len().saturating_sub(1) {
        let Some(op) = program.opcode(pos) else {
            continue;
        };
        let arg = program.arg(pos);

        match op {
            OpCode::NOOP | OpCode::END | OpCode::FUNC_ARG_COUNT => continue,
            OpCode::MUL_IMM_ADD => {
                let children = otree.children(pos);
                writeln!(sink, " A{pos} [label=\"ADD\"];")?;
                writeln!(sink, " AR_MUL{pos} [label=\"MUL\" {STYLE_FMA}];")?;
                writeln!(
                    sink,
                    " AR_MUL_R{pos} [label=\"{}\" {STYLE_CST}];",
                    cst_label(arg, pool)
                )?;
                writeln!(sink, "A{pos} -> A{};", children[0])?;
                writeln!(sink, "A{pos} -> AR_MUL{pos};")?;
                writeln!(sink, "AR_MUL{pos} -> A{};", children[1])?;
                writeln!(sink, "AR_MUL{pos} -> AR_MUL_R{pos};")?;
                continue;
            }
            _ => {}
        }

        let (label, style) = node_label(op, arg, pool);
        writeln!(sink, " A{pos} [label=\"{label}\" {style}];")?;

        for child in otree.children(pos) {
            writeln!(sink, "A{pos} -> A{child};")?;
        }

        // Render the folded operand as its own node.
        match op.arg_kind() {
            ArgKind::Var if op != OpCode::PUSH_VAR => {
                writeln!(
                    sink,
                    " AR{pos} [label=\"x{arg}\" {STYLE_VAR}];\nA{pos} -> AR{pos};"
                )?;
            }
            ArgKind::Imm if op != OpCode::PUSH_IMM => {
                writeln!(
                    sink,
                    " AR{pos} [label=\"{}\" {STYLE_CST}];\nA{pos} -> AR{pos};",
                    cst_label(arg, pool)
                )?;
            }
            _ => {}
        }
    }

    writeln!(sink, "\n}}")
}

fn node_label(op: OpCode, arg: i32, pool: Option<&Pool>) -> (String, &'static str) {
    match op {
        OpCode::PUSH_VAR => (format!("x{arg}"), STYLE_VAR),
        OpCode::UMIN_VAR => (format!("UMIN x{arg}"), STYLE_VAR),
        OpCode::PUSH_IMM => (cst_label(arg, pool), STYLE_CST),
        OpCode::PUSH_ZERO => ("0".to_string(), STYLE_CST),
        OpCode::ADD | OpCode::ADD_VAR | OpCode::ADD_IMM => ("ADD".to_string(), fold_style(op)),
        OpCode::SUB | OpCode::SUB_VAR | OpCode::SUB_IMM => ("SUB".to_string(), fold_style(op)),
        OpCode::MUL | OpCode::MUL_VAR | OpCode::MUL_IMM => ("MUL".to_string(), fold_style(op)),
        OpCode::DIV | OpCode::DIV_VAR | OpCode::DIV_IMM => ("DIV".to_string(), fold_style(op)),
        OpCode::UMIN => ("UMIN".to_string(), ""),
        OpCode::CALL1 | OpCode::CALL2 | OpCode::CALLN => {
            (FuncCode::name_by_raw(arg).to_string(), STYLE_CALL)
        }
        _ => (op.as_str().to_string(), ""),
    }
}

fn fold_style(op: OpCode) -> &'static str {
    match op.arg_kind() {
        ArgKind::Var => STYLE_VAR_ARG,
        _ => "",
    }
}

fn cst_label(arg: i32, pool: Option<&Pool>) -> String {
    match pool.and_then(|p| p.get(arg as u32)) {
        Some(val) => format!("{arg}\\n{val:.2}"),
        None => format!("{arg}\\npool {arg}"),
    }
}
