// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::vec;

use bit_vec::BitVec;

use crate::mar::indexed_vec::Idx;
use crate::mar::repr::*;

/// Postorder traversal of a graph.
///
/// Postorder traversal is when each node is visited after all of its
/// successors, except when the successor is only reachable by a back-edge
///
/// ```text
///
///         A
///        / \
///       /   \
///      B     C
///       \   /
///        \ /
///         D
/// ```
///
/// A Postorder traversal of this graph is `D B C A` or `D C B A`
pub struct Postorder<'a> {
    mar: &'a Mar,
    visited: BitVec,
    visit_stack: Vec<(BasicBlock, vec::IntoIter<BasicBlock>)>,
}

impl<'a> Postorder<'a> {
    pub fn new(mar: &'a Mar, root: BasicBlock) -> Postorder<'a> {
        let mut po = Postorder {
            mar,
            visited: BitVec::from_elem(mar.basic_blocks().len(), false),
            visit_stack: Vec::new(),
        };

        if let Some(ref term) = po.mar[root].terminator {
            po.visited.set(root.index(), true);
            po.visit_stack.push((root, term.successors().into_iter()));
            po.traverse_successor();
        }

        po
    }

    /// Grows `visit_stack` until the node on top has no unvisited
    /// successors. `next` then pops it, and asks for more.
    fn traverse_successor(&mut self) {
        loop {
            let bb = match self.visit_stack.last_mut() {
                Some((_, iter)) => match iter.next() {
                    Some(bb) => bb,
                    None => break,
                },
                None => break,
            };

            if !self.visited.get(bb.index()).unwrap_or(true) {
                self.visited.set(bb.index(), true);

                if let Some(ref term) = self.mar[bb].terminator {
                    self.visit_stack.push((bb, term.successors().into_iter()));
                }
            }
        }
    }
}

pub fn postorder(mar: &Mar) -> Postorder<'_> {
    Postorder::new(mar, START_BLOCK)
}

impl<'a> Iterator for Postorder<'a> {
    type Item = (BasicBlock, &'a BasicBlockData);

    fn next(&mut self) -> Option<(BasicBlock, &'a BasicBlockData)> {
        let next = self.visit_stack.pop();
        if next.is_some() {
            self.traverse_successor();
        }

        next.map(|(bb, _)| (bb, &self.mar[bb]))
    }
}

/// Reverse postorder traversal of a graph
///
/// Reverse postorder is the reverse order of a postorder traversal.
/// This is different to a preorder traversal and represents a natural
/// linearisation of control-flow. For a graph containing no loops (i.e. A
/// DAG), this is equivalent to a topological sort.
pub fn reverse_postorder(mar: &Mar) -> Vec<BasicBlock> {
    let mut blocks: Vec<_> = postorder(mar).map(|(bb, _)| bb).collect();
    blocks.reverse();
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::test_util::mar_from_edges;

    fn bbs(indices: &[usize]) -> Vec<BasicBlock> {
        indices.iter().map(|i| BasicBlock::new(*i)).collect()
    }

    #[test]
    fn test_diamond() {
        //   0
        //  / \
        // 1   2
        //  \ /
        //   3
        let mar = mar_from_edges(&[&[1, 2], &[3], &[3], &[]]);

        let post: Vec<_> = postorder(&mar).map(|(bb, _)| bb).collect();
        assert_eq!(post, bbs(&[3, 1, 2, 0]));

        assert_eq!(reverse_postorder(&mar), bbs(&[0, 2, 1, 3]));
    }

    #[test]
    fn test_loop_back_edge() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let mar = mar_from_edges(&[&[1], &[2, 3], &[1], &[]]);
        let rpo = reverse_postorder(&mar);
        assert_eq!(rpo[0], START_BLOCK);
        assert_eq!(rpo[1], BasicBlock::new(1));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_unreachable_is_skipped() {
        let mar = mar_from_edges(&[&[], &[0]]);
        assert_eq!(reverse_postorder(&mar), bbs(&[0]));
    }
}
