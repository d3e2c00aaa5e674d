use syn::spanned::Spanned;
use syn::{BinOp, Expr, UnOp};

use crate::error::{Error, Result};
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::extract::placeholder_id;
use crate::mar::repr::*;

impl Builder {
    /// Lowers every transition inside `expr`, returning plain code that
    /// computes the same value at the end of the returned block.
    pub fn as_operand(&mut self, mut block: BasicBlock, expr: &Expr) -> Result<BlockAnd<Expr>> {
        debug!("as_operand(block={:?})", block);

        if !self.contains_transition(expr) {
            return Ok(block.and(expr.clone()));
        }

        let span = expr.span();

        if placeholder_id(expr).is_some() || is_control_flow(expr) {
            return self.as_temp(block, expr);
        }

        match expr {
            Expr::Binary(binary)
                if matches!(binary.op, BinOp::And(_) | BinOp::Or(_)) && self.contains_transition(&*binary.right) =>
            {
                return self.as_temp(block, expr);
            }
            Expr::Let(_) => {
                return Err(Error::UnsupportedSuspension {
                    span,
                    what: "a `let` expression",
                });
            }
            Expr::Unsafe(_) => {
                return Err(Error::UnsupportedSuspension {
                    span,
                    what: "an `unsafe` block",
                });
            }
            Expr::Block(expr_block) if expr_block.label.is_some() => {
                return Err(Error::UnsupportedSuspension {
                    span,
                    what: "a labeled block",
                });
            }
            _ => {}
        }

        let mut expr = expr.clone();

        {
            let operands = match operands_mut(&mut expr) {
                Some(operands) => operands,
                None => return Err(Error::internal(span, "cannot lower a suspension in this expression")),
            };
            unpack!(block = self.hoist_operands(block, operands)?);
        }

        Ok(block.and(expr))
    }

    /// Lowers sibling operands in evaluation order. An operand evaluated
    /// before a later transition is moved into a temporary, unless reading
    /// it again later gives the same value.
    fn hoist_operands(&mut self, mut block: BasicBlock, operands: Vec<&mut Expr>) -> Result<BlockAnd<()>> {
        let last_transition = operands
            .iter()
            .rposition(|operand| self.contains_transition(&**operand));

        let last_transition = match last_transition {
            Some(last_transition) => last_transition,
            None => return Ok(block.unit()),
        };

        for (index, operand) in operands.into_iter().enumerate() {
            if index > last_transition {
                break;
            }

            if self.contains_transition(&*operand) {
                *operand = unpack!(block = self.as_operand(block, operand)?);
            }

            if index < last_transition && !self.is_stable(operand) {
                let value = operand.clone();
                let temp = self.hoist(block, value.span(), value);
                *operand = self.local_expr(temp);
            }
        }

        Ok(block.unit())
    }

    /// Evaluates a control flow expression into a fresh temporary.
    fn as_temp(&mut self, mut block: BasicBlock, expr: &Expr) -> Result<BlockAnd<Expr>> {
        let span = expr.span();
        let temp = self.declare_temp(span);
        self.push_declare(block, span, temp);
        unpack!(block = self.into_expr(Destination::Local(temp), block, expr)?);
        Ok(block.and(self.local_expr(temp)))
    }

    /// Whether reading `expr` again after other operands ran yields the
    /// same value: literals, paths and places built from them.
    pub fn is_stable(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Lit(_) | Expr::Path(_) => true,
            Expr::Paren(paren) => self.is_stable(&paren.expr),
            Expr::Group(group) => self.is_stable(&group.expr),
            Expr::Field(field) => self.is_stable(&field.base),
            Expr::Index(index) => {
                self.is_stable(&index.expr) && matches!(*index.index, Expr::Lit(_) | Expr::Path(_))
            }
            Expr::Unary(unary) if matches!(unary.op, UnOp::Deref(_)) => self.is_stable(&unary.expr),
            _ => false,
        }
    }
}

fn is_control_flow(expr: &Expr) -> bool {
    match expr {
        Expr::Block(expr_block) => expr_block.label.is_none(),
        Expr::If(_)
        | Expr::Match(_)
        | Expr::Loop(_)
        | Expr::While(_)
        | Expr::ForLoop(_)
        | Expr::Break(_)
        | Expr::Continue(_)
        | Expr::Return(_)
        | Expr::Assign(_) => true,
        Expr::Binary(binary) => matches!(
            binary.op,
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
        ),
        _ => false,
    }
}

/// The direct operands of `expr`, in the order they are evaluated.
fn operands_mut(expr: &mut Expr) -> Option<Vec<&mut Expr>> {
    let operands = match expr {
        Expr::Paren(paren) => vec![&mut *paren.expr],
        Expr::Group(group) => vec![&mut *group.expr],
        Expr::Array(array) => array.elems.iter_mut().collect(),
        Expr::Tuple(tuple) => tuple.elems.iter_mut().collect(),
        Expr::Call(call) => {
            let mut operands = vec![&mut *call.func];
            operands.extend(call.args.iter_mut());
            operands
        }
        Expr::MethodCall(method_call) => {
            let mut operands = vec![&mut *method_call.receiver];
            operands.extend(method_call.args.iter_mut());
            operands
        }
        Expr::Binary(binary) => vec![&mut *binary.left, &mut *binary.right],
        Expr::Unary(unary) => vec![&mut *unary.expr],
        Expr::Cast(cast) => vec![&mut *cast.expr],
        Expr::Field(field) => vec![&mut *field.base],
        Expr::Index(index) => vec![&mut *index.expr, &mut *index.index],
        Expr::Reference(reference) => vec![&mut *reference.expr],
        Expr::Try(expr_try) => vec![&mut *expr_try.expr],
        Expr::Repeat(repeat) => vec![&mut *repeat.expr],
        Expr::Range(range) => {
            let mut operands = vec![];
            if let Some(start) = &mut range.start {
                operands.push(&mut **start);
            }
            if let Some(end) = &mut range.end {
                operands.push(&mut **end);
            }
            operands
        }
        Expr::Struct(expr_struct) => {
            let mut operands: Vec<&mut Expr> = expr_struct.fields.iter_mut().map(|field| &mut field.expr).collect();
            if let Some(rest) = &mut expr_struct.rest {
                operands.push(&mut **rest);
            }
            operands
        }
        _ => return None,
    };

    Some(operands)
}
