// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bit_vec::BitVec;

use super::pass::MarPass;
use crate::error::Result;
use crate::mar::indexed_vec::Idx;
use crate::mar::repr::*;

/// Drops every block that cannot be reached from the start block.
///
/// Unreachable code is dropped along with its statements; it is never
/// resumed, so it needs no state variant.
#[derive(Debug, Default)]
pub struct RemoveDeadBlocks;

impl RemoveDeadBlocks {
    pub fn new() -> Self {
        RemoveDeadBlocks
    }
}

impl MarPass for RemoveDeadBlocks {
    fn name(&self) -> &'static str {
        "RemoveDeadBlocks"
    }

    fn run_pass(&mut self, mar: &mut Mar) -> Result<()> {
        let mut seen = BitVec::from_elem(mar.basic_blocks.len(), false);

        // This block is always required.
        seen.set(START_BLOCK.index(), true);

        let mut worklist = Vec::with_capacity(4);
        worklist.push(START_BLOCK);
        while let Some(bb) = worklist.pop() {
            for succ in mar.basic_block_data(bb).terminator().successors() {
                if !seen.get(succ.index()).unwrap_or(true) {
                    seen.set(succ.index(), true);
                    worklist.push(succ);
                }
            }
        }

        let dropped = seen.iter().filter(|alive| !alive).count();
        if dropped != 0 {
            debug!("remove_dead_blocks: dropping {} blocks", dropped);
        }

        retain_basic_blocks(mar, &seen);

        Ok(())
    }
}

/// Mass removal of basic blocks to keep the ID-remapping cheap.
fn retain_basic_blocks(mar: &mut Mar, keep: &BitVec) {
    let num_blocks = mar.basic_blocks.len();

    let mut replacements: Vec<_> = (0..num_blocks).map(BasicBlock::new).collect();
    let mut used_blocks = 0;
    for alive_index in keep.iter().enumerate().filter(|(_, alive)| *alive).map(|(index, _)| index) {
        replacements[alive_index] = BasicBlock::new(used_blocks);
        if alive_index != used_blocks {
            // Swap the next alive block data with the current available slot. Since alive_index is
            // non-decreasing this is a valid operation.
            mar.basic_blocks.swap(alive_index, used_blocks);
        }
        used_blocks += 1;
    }
    mar.basic_blocks.truncate(used_blocks);

    // Fix up all of the interior edges.
    for bb in mar.all_basic_blocks() {
        // Update the terminators to point at the new block ids.
        for target in mar.basic_block_data_mut(bb).terminator_mut().successors_mut() {
            *target = replacements[target.index()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::test_util::*;

    #[test]
    fn test_unreachable_blocks_are_dropped() {
        let mut mar = mar_from_edges(&[&[2], &[0], &[]]);
        RemoveDeadBlocks.run_pass(&mut mar).unwrap();

        assert_eq!(mar.basic_blocks.len(), 2);
        assert_eq!(mar[START_BLOCK].terminator().successors(), vec![BasicBlock::new(1)]);
    }

    #[test]
    fn test_unreachable_statements_are_dropped_too() {
        let mut mar = mar_from_edges(&[&[], &[]]);
        push_stmt(&mut mar, BasicBlock::new(1), syn::parse_quote!(side_effect();));
        RemoveDeadBlocks.run_pass(&mut mar).unwrap();

        assert_eq!(mar.basic_blocks.len(), 1);
    }
}
