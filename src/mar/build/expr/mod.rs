use syn::spanned::Spanned;
use syn::{Block, Expr, ExprIf, Label, Lifetime};

use crate::error::{Error, Result};
use crate::mar::build::scope::LoopScope;
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::repr::*;

mod as_operand;
mod into;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Jump {
    Break,
    Continue,
}

impl Builder {
    fn expr_if(&mut self, destination: Destination, mut block: BasicBlock, expr_if: &ExprIf) -> Result<BlockAnd<()>> {
        let span = expr_if.span();

        if contains_let(&expr_if.cond) {
            return Err(Error::UnsupportedSuspension {
                span: expr_if.cond.span(),
                what: "an `if` with a `let` chain",
            });
        }

        let cond = unpack!(block = self.as_operand(block, &expr_if.cond)?);
        let cond = self.operand(cond);

        let then_block = self.start_new_block(span, Some("Then"));
        let else_block = self.start_new_block(span, Some("Else"));

        self.terminate(
            span,
            block,
            TerminatorKind::If {
                cond,
                targets: (then_block, else_block),
            },
        );

        let then_block = unpack!(self.ast_block(destination, then_block, &expr_if.then_branch)?);

        let else_block = match &expr_if.else_branch {
            Some((_, else_expr)) => unpack!(self.into_expr(destination, else_block, else_expr)?),
            None => unpack!(self.assign_unit(destination, else_block, span)),
        };

        let join_block = self.start_new_block(span, Some("IfJoin"));
        self.goto(span, then_block, join_block);
        self.goto(span, else_block, join_block);

        Ok(join_block.unit())
    }

    /// `a && b` and `a || b` where `b` suspends: `b` only runs when `a` does
    /// not decide the result.
    fn expr_short_circuit(
        &mut self,
        destination: Destination,
        mut block: BasicBlock,
        expr: &syn::ExprBinary,
    ) -> Result<BlockAnd<()>> {
        let span = expr.span();
        let is_and = matches!(expr.op, syn::BinOp::And(_));

        let lhs = unpack!(block = self.as_operand(block, &expr.left)?);
        let lhs = self.operand(lhs);

        let rhs_block = self.start_new_block(span, Some("ShortCircuitRhs"));
        let const_block = self.start_new_block(span, Some("ShortCircuit"));

        let targets = if is_and {
            (rhs_block, const_block)
        } else {
            (const_block, rhs_block)
        };
        self.terminate(span, block, TerminatorKind::If { cond: lhs, targets });

        let rhs_block = unpack!(self.into_expr(destination, rhs_block, &expr.right)?);
        let constant: Expr = if is_and {
            syn::parse_quote_spanned!(span=> false)
        } else {
            syn::parse_quote_spanned!(span=> true)
        };
        let const_block = unpack!(self.assign_verbatim(destination, const_block, constant));

        let join_block = self.start_new_block(span, Some("ShortCircuitJoin"));
        self.goto(span, rhs_block, join_block);
        self.goto(span, const_block, join_block);

        Ok(join_block.unit())
    }

    fn expr_loop(
        &mut self,
        destination: Destination,
        block: BasicBlock,
        span: proc_macro2::Span,
        label: Option<&Label>,
        cond: Option<&Expr>,
        body: &Block,
    ) -> Result<BlockAnd<()>> {
        // [block] --> [loop_block] ~~> [loop_block_end] -1-> [exit_block]
        //                  ^                  |
        //                  |                  0
        //                  |                  |
        //                  |                  v
        //           [body_block_end] <~~~ [body_block]
        //
        // If `cond` is None, the loop has no condition and the body starts at
        // `loop_block`.

        let loop_block = self.start_new_block(span, Some("Loop"));
        let exit_block = self.start_new_block(span, Some("LoopExit"));

        self.goto(span, block, loop_block);

        let body_block = match cond {
            Some(cond) => {
                if contains_let(cond) {
                    return Err(Error::UnsupportedSuspension {
                        span: cond.span(),
                        what: "a `while` with a `let` chain",
                    });
                }

                let mut loop_block_end = loop_block;
                let cond = unpack!(loop_block_end = self.as_operand(loop_block_end, cond)?);
                let cond = self.operand(cond);

                let body_block = self.start_new_block(span, Some("LoopBody"));
                self.terminate(
                    span,
                    loop_block_end,
                    TerminatorKind::If {
                        cond,
                        targets: (body_block, exit_block),
                    },
                );
                body_block
            }
            None => loop_block,
        };

        let loop_scope = LoopScope {
            label: label.map(|label| label.name.clone()),
            continue_block: loop_block,
            break_block: exit_block,
            destination,
        };

        let body_block_end =
            self.in_loop_scope(loop_scope, |this| this.ast_block(Destination::Ignore, body_block, body))?;
        let body_block_end = unpack!(body_block_end);
        self.goto(span, body_block_end, loop_block);

        // `while` evaluates to `()`; `loop` only through `break value`.
        if cond.is_some() {
            return Ok(self.assign_unit(destination, exit_block, span));
        }

        Ok(exit_block.unit())
    }

    fn break_or_continue(
        &mut self,
        mut block: BasicBlock,
        span: proc_macro2::Span,
        jump: Jump,
        label: Option<&Lifetime>,
        value: Option<&Expr>,
    ) -> Result<BlockAnd<()>> {
        let loop_scope = match self.find_loop_scope(label) {
            Some(loop_scope) => loop_scope.clone(),
            None => {
                return Err(Error::internal(span, "`break` or `continue` outside of a lowered loop"));
            }
        };

        let target = match jump {
            Jump::Break => {
                if let Some(value) = value {
                    unpack!(block = self.into_expr(loop_scope.destination, block, value)?);
                }
                loop_scope.break_block
            }
            Jump::Continue => loop_scope.continue_block,
        };

        self.goto(span, block, target);

        Ok(self.start_new_block(span, Some("AfterBreak")).unit())
    }

    fn expr_return(&mut self, block: BasicBlock, expr: &syn::ExprReturn) -> Result<BlockAnd<()>> {
        match &expr.expr {
            Some(value) => self.into_expr(Destination::Return, block, value),
            None => Ok(self.assign_unit(Destination::Return, block, expr.span())),
        }
    }
}

fn contains_let(expr: &Expr) -> bool {
    match expr {
        Expr::Let(_) => true,
        Expr::Binary(binary) => contains_let(&binary.left) || contains_let(&binary.right),
        Expr::Paren(paren) => contains_let(&paren.expr),
        _ => false,
    }
}
