// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::pass::MarPass;
use super::remove_dead_blocks::RemoveDeadBlocks;
use crate::error::Result;
use crate::mar::repr::*;

/// Collapses chains of empty blocks that only jump onwards.
///
/// Every block that survives becomes a state variant, so fewer blocks mean
/// fewer variants and fewer trips around the resume loop.
#[derive(Debug, Default)]
pub struct SimplifyCfg;

impl SimplifyCfg {
    pub fn new() -> Self {
        SimplifyCfg
    }

    fn remove_goto_chains(&self, mar: &mut Mar) -> bool {
        // Find the target at the end of the jump chain, return None if there is a loop
        fn final_target(mar: &Mar, mut target: BasicBlock) -> Option<BasicBlock> {
            // Keep track of already seen blocks to detect loops
            let mut seen: Vec<BasicBlock> = Vec::with_capacity(8);

            while mar.basic_block_data(target).statements.is_empty() {
                // NB -- terminator may have been swapped with `None`
                // below, in which case we have a cycle and just want
                // to stop
                match mar.basic_block_data(target).terminator {
                    Some(Terminator {
                        kind: TerminatorKind::Goto { target: next },
                        ..
                    }) => {
                        if seen.contains(&next) {
                            return None;
                        }
                        seen.push(next);
                        target = next;
                    }
                    _ => break,
                }
            }

            Some(target)
        }

        let mut changed = false;
        for bb in mar.all_basic_blocks() {
            // Temporarily take ownership of the terminator we're modifying to keep borrowck happy
            let mut terminator = mar
                .basic_block_data_mut(bb)
                .terminator
                .take()
                .expect("invalid terminator state");

            for target in terminator.successors_mut() {
                let new_target = match final_target(mar, *target) {
                    Some(new_target) => new_target,
                    None if mar.basic_block_data(bb).statements.is_empty() => bb,
                    None => continue,
                };
                if *target != new_target {
                    debug!("simplify_cfg: {:?} -> {:?} now jumps to {:?}", bb, *target, new_target);
                    changed = true;
                    *target = new_target;
                }
            }
            mar.basic_block_data_mut(bb).terminator = Some(terminator);
        }
        changed
    }
}

impl MarPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "SimplifyCfg"
    }

    fn run_pass(&mut self, mar: &mut Mar) -> Result<()> {
        let mut changed = true;

        while changed {
            changed = self.remove_goto_chains(mar);
            RemoveDeadBlocks.run_pass(mar)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::indexed_vec::Idx;
    use crate::mar::test_util::*;

    #[test]
    fn test_goto_chain_collapses() {
        // 0 -> 1 -> 2 -> 3(return), with 1 and 2 empty.
        let mut mar = mar_from_edges(&[&[1], &[2], &[3], &[]]);
        SimplifyCfg.run_pass(&mut mar).unwrap();

        assert_eq!(mar.basic_blocks.len(), 2);
        assert_eq!(mar[START_BLOCK].terminator().successors(), vec![BasicBlock::new(1)]);
    }

    #[test]
    fn test_blocks_with_statements_are_kept() {
        let mut mar = mar_from_edges(&[&[1], &[2], &[]]);
        push_stmt(&mut mar, BasicBlock::new(1), syn::parse_quote!(side_effect();));
        SimplifyCfg.run_pass(&mut mar).unwrap();

        assert_eq!(mar.basic_blocks.len(), 3);
    }

    #[test]
    fn test_empty_cycle_terminates() {
        let mut mar = mar_from_edges(&[&[1], &[2], &[1]]);
        SimplifyCfg.run_pass(&mut mar).unwrap();

        assert!(mar.basic_blocks.len() <= 3);
    }
}
