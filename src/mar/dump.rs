//! Writes the graph of a function in graphviz format.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quote::ToTokens;
use syn::ext::IdentExt;

use crate::mar::indexed_vec::Idx;
use crate::mar::repr::*;

type Edge = (BasicBlock, usize);

/// Writes `{dir}/{fn}.dot`, creating `dir` if needed.
pub fn dump_graphviz(mar: &Mar, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.dot", mar.ident));
    let mut file = File::create(&path)?;
    write_graphviz(mar, &mut file)?;
    info!("wrote control flow graph of `{}` to {}", mar.ident, path.display());
    Ok(path)
}

pub fn write_graphviz<W: Write>(mar: &Mar, w: &mut W) -> io::Result<()> {
    dot::render(&Graph { mar }, w)
}

struct Graph<'a> {
    mar: &'a Mar,
}

impl<'a> dot::Labeller<'a, BasicBlock, Edge> for Graph<'a> {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new(format!("mar_{}", self.mar.ident.unraw())).expect("identifier is a valid graphviz id")
    }

    fn node_id(&'a self, bb: &BasicBlock) -> dot::Id<'a> {
        dot::Id::new(format!("bb{}", bb.index())).expect("bbN is a valid graphviz id")
    }

    fn node_label(&'a self, bb: &BasicBlock) -> dot::LabelText<'a> {
        dot::LabelText::LabelStr(block_label(self.mar, *bb).into())
    }

    fn edge_label(&'a self, (bb, index): &Edge) -> dot::LabelText<'a> {
        let label = match self.mar[*bb].terminator().kind {
            TerminatorKind::If { .. } => (if *index == 0 { "true" } else { "false" }).to_string(),
            TerminatorKind::Match { ref arms, .. } => arms[*index].pat.to_token_stream().to_string(),
            TerminatorKind::Await { point, .. } => format!("resume {}", point),
            TerminatorKind::Yield { point, .. } => format!("resume {}", point),
            _ => String::new(),
        };
        dot::LabelText::LabelStr(label.into())
    }
}

impl<'a> dot::GraphWalk<'a, BasicBlock, Edge> for Graph<'a> {
    fn nodes(&'a self) -> dot::Nodes<'a, BasicBlock> {
        Cow::Owned(self.mar.all_basic_blocks())
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge> {
        let mut edges = vec![];
        for (bb, data) in self.mar.basic_blocks().iter_enumerated() {
            if let Some(terminator) = &data.terminator {
                edges.extend((0..terminator.successors().len()).map(|index| (bb, index)));
            }
        }
        Cow::Owned(edges)
    }

    fn source(&'a self, edge: &Edge) -> BasicBlock {
        edge.0
    }

    fn target(&'a self, (bb, index): &Edge) -> BasicBlock {
        self.mar[*bb].terminator().successors()[*index]
    }
}

fn block_label(mar: &Mar, bb: BasicBlock) -> String {
    let data = &mar[bb];
    let mut label = format!("{:?}", bb);
    if let Some(name) = data.name {
        label.push_str(&format!(" ({})", name));
    }
    label.push('\n');

    for statement in &data.statements {
        let text = match &statement.kind {
            StatementKind::Expr(stmt) => stmt.to_token_stream().to_string(),
            StatementKind::Let { pat, init, .. } => match init {
                Some(init) => format!("let {} = {};", pat.to_token_stream(), init.to_token_stream()),
                None => format!("let {};", pat.to_token_stream()),
            },
            StatementKind::Declare { local } => format!("let {};", mar.local_decl_data(*local).ident),
            StatementKind::Assign { local, value } => {
                format!("{} = {};", mar.local_decl_data(*local).ident, value.to_token_stream())
            }
        };
        label.push_str(&text);
        label.push('\n');
    }

    if let Some(terminator) = &data.terminator {
        label.push_str(&match &terminator.kind {
            TerminatorKind::Goto { .. } => "goto".to_string(),
            TerminatorKind::If { cond, .. } => format!("if {}", cond.expr.to_token_stream()),
            TerminatorKind::Match { discr, .. } => format!("match {}", discr.expr.to_token_stream()),
            TerminatorKind::Await { future, destination, .. } => format!(
                "{} = await {}",
                mar.local_decl_data(*destination).ident,
                future.expr.to_token_stream()
            ),
            TerminatorKind::Yield { value, .. } => format!("yield {}", value.expr.to_token_stream()),
            TerminatorKind::Return { value } => format!("return {}", value.expr.to_token_stream()),
        });
    }

    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::test_util::*;

    #[test]
    fn test_write_graphviz() {
        let mut mar = mar_from_edges(&[&[1, 2], &[2], &[]]);
        push_stmt(&mut mar, BasicBlock::new(1), syn::parse_quote!(count += 1;));

        let mut out = vec![];
        write_graphviz(&mar, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("digraph mar_test_fn"));
        assert!(out.contains("bb0 -> bb1"));
        assert!(out.contains("bb1 -> bb2"));
        assert!(out.contains("count += 1"));
        assert!(out.contains("true"));
    }
}
