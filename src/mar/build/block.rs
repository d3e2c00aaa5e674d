use syn::spanned::Spanned;
use syn::{Block, Expr, ExprMacro, Stmt};

use crate::error::Result;
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::extract::is_placeholder_macro;
use crate::mar::repr::*;

impl Builder {
    pub fn ast_block(
        &mut self,
        destination: Destination,
        mut block: BasicBlock,
        ast_block: &Block,
    ) -> Result<BlockAnd<()>> {
        self.push_scope();
        let result = self.stmts(destination, block, &ast_block.stmts);
        let locals = self.pop_scope();
        unpack!(block = result?);

        // The generated code has no braces for this scope, so once its
        // locals disappear the rest has to be in a block of its own.
        if !locals.is_empty() {
            let next = self.start_new_block(ast_block.span(), Some("ScopeEnd"));
            self.goto(ast_block.span(), block, next);
            block = next;
        }

        Ok(block.unit())
    }

    fn stmts(
        &mut self,
        destination: Destination,
        mut block: BasicBlock,
        stmts: &[Stmt],
    ) -> Result<BlockAnd<()>> {
        let last = stmts.len().saturating_sub(1);

        for (index, stmt) in stmts.iter().enumerate() {
            let is_tail = index == last;
            let normalized = placeholder_stmt(stmt);
            let stmt = normalized.as_ref().unwrap_or(stmt);

            match stmt {
                Stmt::Expr(expr, None) if is_tail => {
                    return self.into_expr(destination, block, expr);
                }
                Stmt::Macro(mac) if is_tail && mac.semi_token.is_none() => {
                    let expr = Expr::Macro(ExprMacro {
                        attrs: mac.attrs.clone(),
                        mac: mac.mac.clone(),
                    });
                    return self.into_expr(destination, block, &expr);
                }
                stmt => {
                    unpack!(block = self.stmt(block, stmt)?);
                }
            }
        }

        // No tail expression: the block evaluates to `()`.
        let span = stmts.last().map_or_else(proc_macro2::Span::call_site, |stmt| stmt.span());
        Ok(self.assign_unit(destination, block, span))
    }
}

/// Desugared loops are re-parsed, which turns placeholder statements back
/// into `Stmt::Macro`. Lower them as the expressions they stand for.
fn placeholder_stmt(stmt: &Stmt) -> Option<Stmt> {
    match stmt {
        Stmt::Macro(mac) if is_placeholder_macro(&mac.mac) => Some(Stmt::Expr(
            Expr::Macro(ExprMacro {
                attrs: mac.attrs.clone(),
                mac: mac.mac.clone(),
            }),
            mac.semi_token,
        )),
        _ => None,
    }
}
