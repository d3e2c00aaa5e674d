use crate::error::Result;
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::repr::*;

impl Builder {
    /// Ends `block` at suspension point `id`. Lowering continues in the
    /// block the machine resumes in.
    pub fn expr_suspend(
        &mut self,
        destination: Destination,
        mut block: BasicBlock,
        id: SuspensionId,
    ) -> Result<BlockAnd<()>> {
        let point = self.points[id].clone();
        let span = point.span;

        debug!("expr_suspend: {:?} {:?} into {:?}", id, point.kind, destination);

        match point.kind {
            SuspensionKind::Await => {
                let future = unpack!(block = self.as_operand(block, &point.expr)?);
                let future = self.operand(future);

                // The awaited value always lands in a local; the translator
                // drops it if nothing reads it.
                let local = match destination {
                    Destination::Local(local) => local,
                    Destination::Ignore | Destination::Return => self.declare_temp(span),
                };

                let target = self.start_new_block(span, Some("AwaitResume"));
                self.terminate(
                    span,
                    block,
                    TerminatorKind::Await {
                        point: id,
                        future,
                        destination: local,
                        target,
                    },
                );

                if destination == Destination::Return {
                    let value = self.local_expr(local);
                    return Ok(self.assign_verbatim(Destination::Return, target, value));
                }

                Ok(target.unit())
            }
            SuspensionKind::Yield => {
                let value = unpack!(block = self.as_operand(block, &point.expr)?);
                let value = self.operand(value);

                let target = self.start_new_block(span, Some("YieldResume"));
                self.terminate(
                    span,
                    block,
                    TerminatorKind::Yield {
                        point: id,
                        value,
                        target,
                    },
                );

                // `yield_!` evaluates to `()`.
                Ok(self.assign_unit(destination, target, span))
            }
        }
    }
}
