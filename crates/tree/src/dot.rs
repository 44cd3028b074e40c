//! GraphViz rendering of expression trees, for diagnostics.

use crate::node::{NodeId, OpArg, OpClass};
use crate::Tree;
use primitives::Pool;
use std::io::{self, Write};

/// Renders the tree as a GraphViz digraph into `sink`.
///
/// Variables are blue, calls green, the FMA multiplier salmon; constants
/// show their pool value when a pool is given.
pub fn tree_to_dot<W: Write>(tree: &Tree, pool: Option<&Pool>, sink: &mut W) -> io::Result<()> {
    writeln!(sink, "digraph structs {{\n node [shape=record];")?;

    if let Some(root) = tree.root() {
        write_nodes(tree, root, pool, sink)?;
        write_edges(tree, root, sink)?;
    }

    if let Some(ei) = tree.equ_idx() {
        writeln!(sink, "label=\"expression tree for equation {ei}\"")?;
    }
    writeln!(sink, "}}")
}

fn write_nodes<W: Write>(
    tree: &Tree,
    id: NodeId,
    pool: Option<&Pool>,
    sink: &mut W,
) -> io::Result<()> {
    let node = tree.node(id);

    let (label, style) = match node.op {
        OpClass::Cst => (format!("CST {}", cst_label(node.value, pool)), ""),
        OpClass::Var => (
            format!("VAR {}", node.value),
            ",style=filled,color=lightblue1",
        ),
        OpClass::Call1 | OpClass::Call2 | OpClass::CallN => (
            format!(
                "{} {}",
                node.op,
                opcode::FuncCode::name_by_raw(node.value as i32)
            ),
            ",style=filled,color=lightseagreen",
        ),
        op => match node.arg {
            OpArg::Cst(k) => (format!("{op} {}", cst_label(k, pool)), ""),
            OpArg::Var(vi) => (format!("{op} x{vi}"), ",style=filled,color=lightblue1"),
            OpArg::Fma(k) => (
                format!("{op} {}", cst_label(k, pool)),
                ",style=filled,color=lightsalmon1",
            ),
            OpArg::Unset => (format!("{op}"), ""),
        },
    };

    writeln!(sink, " A{} [label=\"{label}\" {style}];", id.index())?;

    for child in tree.child_ids(id) {
        write_nodes(tree, child, pool, sink)?;
    }
    Ok(())
}

fn write_edges<W: Write>(tree: &Tree, id: NodeId, sink: &mut W) -> io::Result<()> {
    let kids: Vec<NodeId> = tree.child_ids(id).collect();
    if kids.is_empty() {
        return Ok(());
    }

    write!(sink, " A{} -> {{", id.index())?;
    for (i, child) in kids.iter().enumerate() {
        if i > 0 {
            write!(sink, ", ")?;
        }
        write!(sink, "A{}", child.index())?;
    }
    writeln!(sink, "}}")?;

    for child in kids {
        write_edges(tree, child, sink)?;
    }
    Ok(())
}

fn cst_label(idx: u32, pool: Option<&Pool>) -> String {
    match pool.and_then(|p| p.get(idx)) {
        Some(val) => format!("{idx}\\n{val:.2e}"),
        None => format!("{idx}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcode::test_programs;

    #[test]
    fn dot_output_shape() -> anyhow::Result<()> {
        let tree = Tree::from_program(&test_programs::neg_quotient())?;
        let pool = Pool::new();
        let mut out = Vec::new();
        tree_to_dot(&tree, Some(&pool), &mut out)?;
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("digraph structs {"));
        assert!(text.trim_end().ends_with('}'));
        assert!(text.contains("VAR 2"));
        assert!(text.contains("DIV"));
        assert!(text.contains("lightblue1"));
        assert!(text.contains("expression tree for equation 1"));
        Ok(())
    }

    #[test]
    fn dot_marks_fma() -> anyhow::Result<()> {
        let tree = Tree::from_program(&test_programs::sqr_fma_chain())?;
        let mut out = Vec::new();
        tree_to_dot(&tree, None, &mut out)?;
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("lightsalmon1"));
        assert!(text.contains("sqr"));
        Ok(())
    }

    #[test]
    fn empty_tree_renders() {
        let tree = Tree::new();
        let mut out = Vec::new();
        tree_to_dot(&tree, None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("digraph"));
    }
}
