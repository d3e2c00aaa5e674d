use syn::spanned::Spanned;
use syn::{BinOp, Expr, Stmt};

use super::Jump;
use crate::error::{Error, Result};
use crate::mar::build::{BlockAnd, Builder, Destination};
use crate::mar::extract::placeholder_id;
use crate::mar::repr::*;

impl Builder {
    /// Compile `expr`, storing its value into `destination`.
    pub fn into_expr(&mut self, destination: Destination, mut block: BasicBlock, expr: &Expr) -> Result<BlockAnd<()>> {
        // `return` always leaves the function, so it becomes a terminator
        // even when the returned value is plain code.
        if let Expr::Return(expr_return) = expr {
            return self.expr_return(block, expr_return);
        }

        if let Some(id) = placeholder_id(expr) {
            return self.expr_suspend(destination, block, id);
        }

        if !self.contains_transition(expr) {
            return Ok(self.assign_verbatim(destination, block, expr.clone()));
        }

        let span = expr.span();

        match expr {
            Expr::Paren(paren) => self.into_expr(destination, block, &paren.expr),
            Expr::Group(group) => self.into_expr(destination, block, &group.expr),
            Expr::Block(expr_block) => {
                if expr_block.label.is_some() {
                    return Err(Error::UnsupportedSuspension {
                        span,
                        what: "a labeled block",
                    });
                }
                self.ast_block(destination, block, &expr_block.block)
            }
            Expr::Unsafe(_) => Err(Error::UnsupportedSuspension {
                span,
                what: "an `unsafe` block",
            }),
            Expr::If(expr_if) => self.expr_if(destination, block, expr_if),
            Expr::Match(expr_match) => self.expr_match(destination, block, expr_match),
            Expr::Loop(expr_loop) => self.expr_loop(
                destination,
                block,
                span,
                expr_loop.label.as_ref(),
                None,
                &expr_loop.body,
            ),
            Expr::While(expr_while) => self.expr_loop(
                destination,
                block,
                span,
                expr_while.label.as_ref(),
                Some(&expr_while.cond),
                &expr_while.body,
            ),
            Expr::ForLoop(_) => Err(Error::internal(span, "`for` should have been desugared")),
            Expr::Break(expr_break) => self.break_or_continue(
                block,
                span,
                Jump::Break,
                expr_break.label.as_ref(),
                expr_break.expr.as_deref(),
            ),
            Expr::Continue(expr_continue) => {
                self.break_or_continue(block, span, Jump::Continue, expr_continue.label.as_ref(), None)
            }
            Expr::Binary(binary)
                if matches!(binary.op, BinOp::And(_) | BinOp::Or(_)) && self.contains_transition(&*binary.right) =>
            {
                self.expr_short_circuit(destination, block, binary)
            }
            Expr::Binary(binary) if is_compound_assign(&binary.op) => {
                // The place is evaluated before the value.
                let mut binary = binary.clone();
                if self.contains_transition(&*binary.left) {
                    *binary.left = unpack!(block = self.as_operand(block, &binary.left)?);
                }
                *binary.right = unpack!(block = self.as_operand(block, &binary.right)?);
                self.push_verbatim(block, Stmt::Expr(Expr::Binary(binary), Some(Default::default())));
                Ok(self.assign_unit(destination, block, span))
            }
            Expr::Assign(assign) => {
                // The value is evaluated before the place.
                let mut assign = assign.clone();
                let mut value = unpack!(block = self.as_operand(block, &assign.right)?);
                if self.contains_transition(&*assign.left) {
                    if !self.is_stable(&value) {
                        let temp = self.hoist(block, value.span(), value);
                        value = self.local_expr(temp);
                    }
                    *assign.left = unpack!(block = self.as_operand(block, &assign.left)?);
                }
                *assign.right = value;
                self.push_verbatim(block, Stmt::Expr(Expr::Assign(assign), Some(Default::default())));
                Ok(self.assign_unit(destination, block, span))
            }
            Expr::Let(_) => Err(Error::UnsupportedSuspension {
                span,
                what: "a `let` expression",
            }),
            _ => {
                let value = unpack!(block = self.as_operand(block, expr)?);
                Ok(self.assign_verbatim(destination, block, value))
            }
        }
    }
}

fn is_compound_assign(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}
