use proc_macro2::TokenStream;
use quote::quote_spanned;
use syn::Expr;

use crate::error::{Error, Result};
use crate::mar::repr::*;
use crate::mar::translate::block::Names;
use crate::mar::translate::Builder;

impl<'a> Builder<'a> {
    pub fn stmt(&self, bb: BasicBlock, statement: &Statement, names: &mut Names) -> Result<Option<TokenStream>> {
        let span = statement.span;

        let stmt = match &statement.kind {
            StatementKind::Expr(stmt) => {
                let mut stmt = stmt.clone();
                self.rewriter().rewrite_stmt(&mut stmt);
                quote_spanned!(span=> #stmt)
            }
            StatementKind::Let {
                pat,
                ty,
                init,
                diverge,
                decls,
            } => {
                for &decl in decls {
                    names.declare(decl);
                }

                let ty = ty.as_ref().map(|ty| quote_spanned!(span=> : #ty));
                let init = init.as_ref().map(|init| {
                    let init = self.user_expr(init);
                    let diverge = diverge.as_ref().map(|diverge| {
                        let diverge = self.user_expr(diverge);
                        quote_spanned!(span=> else #diverge)
                    });
                    quote_spanned!(span=> = #init #diverge)
                });

                quote_spanned!(span=> let #pat #ty #init;)
            }
            StatementKind::Declare { local } => {
                names.declare(*local);

                // Only declared here if it is also initialized here; other
                // blocks declare it on entry.
                if !self.assigned_after(bb, statement, *local) {
                    return Ok(None);
                }

                let name = names
                    .get(*local)
                    .ok_or_else(|| Error::internal(span, "declared local has no name"))?;
                self.declaration(*local, name)
            }
            StatementKind::Assign { local, value } => {
                let name = names
                    .get(*local)
                    .ok_or_else(|| Error::internal(span, "assigned local is not in scope"))?;
                let value = self.user_expr(value);
                quote_spanned!(span=> #name = #value;)
            }
        };

        Ok(Some(stmt))
    }

    /// Whether a statement of `bb` after `statement` assigns `local`.
    fn assigned_after(&self, bb: BasicBlock, statement: &Statement, local: Local) -> bool {
        self.mar[bb]
            .statements
            .iter()
            .skip_while(|candidate| !std::ptr::eq(*candidate, statement))
            .skip(1)
            .any(|candidate| candidate.inits.contains(&local))
    }

    /// A copy of user code with its early exits rewritten.
    pub fn user_expr(&self, expr: &Expr) -> Expr {
        let mut expr = expr.clone();
        self.rewriter().rewrite(&mut expr);
        expr
    }
}
