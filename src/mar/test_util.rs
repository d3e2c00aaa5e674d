//! Hand-built graphs for pass and analysis tests.

use proc_macro2::Span;
use syn::parse_quote;

use crate::mar::indexed_vec::{Idx, IndexVec};
use crate::mar::repr::*;
use crate::signature::CapabilityKind;

/// A graph where block `i` jumps to `edges[i]`: no successor returns, one
/// is a goto and two are an `if` on `cond`.
pub fn mar_from_edges(edges: &[&[usize]]) -> Mar {
    let mut basic_blocks = IndexVec::new();

    for succs in edges {
        let mut data = BasicBlockData::new(Span::call_site(), None, vec![]);
        let kind = match *succs {
            [] => TerminatorKind::Return {
                value: operand(parse_quote!(())),
            },
            [target] => TerminatorKind::Goto {
                target: BasicBlock::new(*target),
            },
            [then, else_] => TerminatorKind::If {
                cond: operand(parse_quote!(cond)),
                targets: (BasicBlock::new(*then), BasicBlock::new(*else_)),
            },
            _ => panic!("at most two successors"),
        };
        data.terminator = Some(Terminator {
            span: Span::call_site(),
            kind,
        });
        basic_blocks.push(data);
    }

    Mar {
        span: Span::call_site(),
        ident: parse_quote!(test_fn),
        capability: CapabilityKind::SingleResult,
        params: vec![],
        local_decls: IndexVec::new(),
        basic_blocks,
        suspension_points: IndexVec::new(),
        items: vec![],
    }
}

pub fn push_stmt(mar: &mut Mar, bb: BasicBlock, stmt: syn::Stmt) {
    mar.basic_blocks[bb].statements.push(Statement {
        span: Span::call_site(),
        kind: StatementKind::Expr(stmt),
        uses: vec![],
        kills: vec![],
        inits: vec![],
    });
}

pub fn operand(expr: syn::Expr) -> Operand {
    Operand { expr, uses: vec![] }
}
