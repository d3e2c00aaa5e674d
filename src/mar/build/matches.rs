use syn::spanned::Spanned;
use syn::ExprMatch;

use crate::error::{Error, Result};
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::repr::*;

impl Builder {
    pub fn expr_match(
        &mut self,
        destination: Destination,
        mut block: BasicBlock,
        expr_match: &ExprMatch,
    ) -> Result<BlockAnd<()>> {
        let span = expr_match.span();

        let discr = unpack!(block = self.as_operand(block, &expr_match.expr)?);
        let discr = self.operand(discr);

        let mut arms = vec![];
        let mut arm_ends = vec![];

        for arm in &expr_match.arms {
            self.push_scope();
            let bindings = self.declare_pat(&arm.pat, None);

            let guard = match &arm.guard {
                Some((_, guard)) => {
                    if self.contains_transition(&**guard) {
                        self.pop_scope();
                        return Err(Error::UnsupportedSuspension {
                            span: guard.span(),
                            what: "a match guard",
                        });
                    }

                    // The guard sees the bindings before the arm is entered;
                    // they are not reads of anything in the matching block.
                    let mut guard = self.operand((**guard).clone());
                    guard.uses.retain(|local| !bindings.contains(local));
                    Some(guard)
                }
                None => None,
            };

            let arm_block = self.start_new_block(arm.span(), Some("Arm"));
            let result = self.into_expr(destination, arm_block, &arm.body);
            self.pop_scope();
            let arm_end = unpack!(result?);

            arms.push(Arm {
                pat: arm.pat.clone(),
                guard,
                bindings,
                target: arm_block,
            });
            arm_ends.push(arm_end);
        }

        self.terminate(span, block, TerminatorKind::Match { discr, arms });

        let join_block = self.start_new_block(span, Some("MatchJoin"));
        for arm_end in arm_ends {
            self.goto(span, arm_end, join_block);
        }

        Ok(join_block.unit())
    }
}
