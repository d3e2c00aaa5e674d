use crate::mar::analysis::{empty_set, insert_all, remove_all, LocalSet};
use crate::mar::indexed_vec::IndexVec;
use crate::mar::repr::*;
use crate::mar::traversal;

/// Backward may-liveness, per block.
///
/// A local is live on entry to a block if some path from there reads it
/// before overwriting it. Locals defined on an edge (an await's
/// destination, a match arm's bindings) are dead on the way into it.
#[derive(Debug)]
pub struct Liveness {
    pub live_in: IndexVec<BasicBlock, LocalSet>,
    pub live_out: IndexVec<BasicBlock, LocalSet>,
}

impl Liveness {
    pub fn compute(mar: &Mar) -> Self {
        let num_blocks = mar.basic_blocks.len();
        let mut live_in = IndexVec::from_raw(vec![empty_set(mar); num_blocks]);
        let mut live_out = IndexVec::from_raw(vec![empty_set(mar); num_blocks]);

        // Postorder visits successors first, which is what a backward
        // problem wants.
        let order: Vec<BasicBlock> = traversal::postorder(mar).map(|(bb, _)| bb).collect();

        let mut changed = true;
        let mut rounds = 0;
        while changed {
            changed = false;
            rounds += 1;

            for &bb in &order {
                let data = &mar[bb];
                let terminator = data.terminator();

                let mut out = empty_set(mar);
                for succ in terminator.successors() {
                    let mut flowing: LocalSet = live_in[succ].clone();
                    remove_all(&mut flowing, &terminator.edge_defs(succ));
                    out.or(&flowing);
                }

                let mut live = out.clone();
                for operand in terminator.operands() {
                    insert_all(&mut live, &operand.uses);
                }
                for statement in data.statements.iter().rev() {
                    remove_all(&mut live, &statement.kills);
                    insert_all(&mut live, &statement.uses);
                }

                if live != live_in[bb] {
                    live_in[bb] = live;
                    changed = true;
                }
                live_out[bb] = out;
            }
        }

        debug!("liveness: converged after {} rounds", rounds);

        Liveness { live_in, live_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::analysis::{contains, locals_of};
    use crate::mar::indexed_vec::Idx;
    use crate::mar::test_util::*;
    use proc_macro2::Span;

    fn declare(mar: &mut Mar, name: &str) -> Local {
        mar.local_decls.push(LocalDecl::new(
            syn::Ident::new(name, Span::call_site()),
            Mutability::Not,
            LocalKind::Var,
        ))
    }

    fn statement(uses: Vec<Local>, kills: Vec<Local>) -> Statement {
        Statement {
            span: Span::call_site(),
            kind: StatementKind::Expr(syn::parse_quote!(stmt();)),
            uses,
            kills: kills.clone(),
            inits: kills,
        }
    }

    #[test]
    fn test_def_then_use() {
        // bb0: x = ..; goto bb1
        // bb1: use x; return
        let mut mar = mar_from_edges(&[&[1], &[]]);
        let x = declare(&mut mar, "x");
        mar.basic_blocks[BasicBlock::new(0)].statements.push(statement(vec![], vec![x]));
        mar.basic_blocks[BasicBlock::new(1)].statements.push(statement(vec![x], vec![]));

        let liveness = Liveness::compute(&mar);
        assert!(!contains(&liveness.live_in[BasicBlock::new(0)], x));
        assert!(contains(&liveness.live_out[BasicBlock::new(0)], x));
        assert!(contains(&liveness.live_in[BasicBlock::new(1)], x));
    }

    #[test]
    fn test_loop_carries_liveness() {
        // bb0 -> bb1 -> (bb2 | bb3), bb2 -> bb1; bb2 reads and writes x.
        let mut mar = mar_from_edges(&[&[1], &[2, 3], &[1], &[]]);
        let x = declare(&mut mar, "x");
        mar.basic_blocks[BasicBlock::new(2)].statements.push(statement(vec![x], vec![]));

        let liveness = Liveness::compute(&mar);
        assert_eq!(locals_of(&liveness.live_in[BasicBlock::new(1)]), vec![x]);
        assert_eq!(locals_of(&liveness.live_in[START_BLOCK]), vec![x]);
        assert!(locals_of(&liveness.live_in[BasicBlock::new(3)]).is_empty());
    }

    #[test]
    fn test_terminator_operand_is_a_use() {
        let mut mar = mar_from_edges(&[&[]]);
        let x = declare(&mut mar, "x");
        if let TerminatorKind::Return { value } = &mut mar.basic_blocks[START_BLOCK].terminator_mut().kind {
            value.uses.push(x);
        }

        let liveness = Liveness::compute(&mar);
        assert!(contains(&liveness.live_in[START_BLOCK], x));
    }
}
