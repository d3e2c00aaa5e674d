use crate::mar::analysis::{empty_set, full_set, insert_all, LocalSet};
use crate::mar::indexed_vec::IndexVec;
use crate::mar::repr::*;
use crate::mar::traversal;

/// Forward must-initialization, per block.
///
/// A local is initialized on entry to a block if every path from the start
/// assigns it. Parameters are initialized on entry to the start block.
#[derive(Debug)]
pub struct Initialization {
    pub init_in: IndexVec<BasicBlock, LocalSet>,
    pub init_out: IndexVec<BasicBlock, LocalSet>,
}

impl Initialization {
    pub fn compute(mar: &Mar) -> Self {
        let num_blocks = mar.basic_blocks.len();

        let mut preds: IndexVec<BasicBlock, Vec<BasicBlock>> = IndexVec::from_raw(vec![vec![]; num_blocks]);
        for (bb, data) in mar.basic_blocks.iter_enumerated() {
            for succ in data.terminator().successors() {
                preds[succ].push(bb);
            }
        }

        // Start from "everything" everywhere but the start block, and
        // intersect down.
        let mut init_in = IndexVec::from_raw(vec![full_set(mar); num_blocks]);
        let mut init_out = IndexVec::from_raw(vec![full_set(mar); num_blocks]);

        let mut entry = empty_set(mar);
        insert_all(&mut entry, &mar.params);
        init_in[START_BLOCK] = entry;

        let order = traversal::reverse_postorder(mar);

        let mut changed = true;
        while changed {
            changed = false;

            for &bb in &order {
                if bb != START_BLOCK {
                    let mut set = full_set(mar);
                    for &pred in &preds[bb] {
                        let mut flowing = init_out[pred].clone();
                        insert_all(&mut flowing, &mar[pred].terminator().edge_defs(bb));
                        set.and(&flowing);
                    }
                    init_in[bb] = set;
                }

                let mut out = init_in[bb].clone();
                for statement in &mar[bb].statements {
                    insert_all(&mut out, &statement.inits);
                }

                if out != init_out[bb] {
                    init_out[bb] = out;
                    changed = true;
                }
            }
        }

        Initialization { init_in, init_out }
    }
}
