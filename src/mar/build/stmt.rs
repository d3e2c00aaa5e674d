use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::{Expr, Pat, Stmt, Type};

use crate::error::{Error, Result};
use crate::mar::build::{BlockAnd, BlockAndExtension, Builder, Destination};
use crate::mar::repr::*;

impl Builder {
    pub fn stmt(&mut self, mut block: BasicBlock, stmt: &Stmt) -> Result<BlockAnd<()>> {
        match stmt {
            Stmt::Local(local) => self.stmt_let(block, local),
            Stmt::Item(item) => {
                self.items.push(item.clone());
                Ok(block.unit())
            }
            Stmt::Expr(expr, _) if self.contains_transition(expr) || is_return(expr) => {
                unpack!(block = self.into_expr(Destination::Ignore, block, expr)?);
                Ok(block.unit())
            }
            stmt => {
                self.push_verbatim(block, stmt.clone());
                Ok(block.unit())
            }
        }
    }

    fn stmt_let(&mut self, mut block: BasicBlock, local: &syn::Local) -> Result<BlockAnd<()>> {
        let span = local.span();
        let (pat, ty) = split_pat_type(&local.pat);

        let mut init = None;
        let mut diverge = None;

        if let Some(local_init) = &local.init {
            if let Some((_, else_branch)) = &local_init.diverge {
                if self.contains_transition(&**else_branch) {
                    return Err(Error::UnsupportedSuspension {
                        span: else_branch.span(),
                        what: "the `else` branch of `let ... else`",
                    });
                }
                diverge = Some((**else_branch).clone());
            }

            init = Some(if self.contains_transition(&*local_init.expr) {
                unpack!(block = self.as_operand(block, &local_init.expr)?)
            } else {
                (*local_init.expr).clone()
            });
        }

        let shadows = super::pat_bindings(&pat)
            .iter()
            .any(|(ident, _)| self.resolve(&ident.to_string()).is_some());

        if shadows {
            // The shadowed local may still be needed across a later
            // suspension. Give the new binding a block of its own so the
            // old one is carried under a hidden name.
            if let Some(value) = init.take() {
                init = Some(if self.is_plain_local(&value) {
                    value
                } else {
                    let temp = self.hoist(block, value.span(), value);
                    self.local_expr(temp)
                });
            }

            let decls = self.declare_pat(&pat, ty.as_ref());
            let next = self.start_new_block(span, Some("Shadow"));
            self.goto(span, block, next);
            block = next;

            self.finish_let(block, span, pat, ty, init, diverge, decls);
        } else {
            let decls = self.declare_pat(&pat, ty.as_ref());
            self.finish_let(block, span, pat, ty, init, diverge, decls);
        }

        Ok(block.unit())
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_let(
        &mut self,
        block: BasicBlock,
        span: Span,
        pat: Pat,
        ty: Option<Type>,
        init: Option<Expr>,
        diverge: Option<Expr>,
        decls: Vec<Local>,
    ) {
        match (&init, decls.as_slice()) {
            (Some(value), [decl]) if matches!(pat, Pat::Ident(ref ident) if ident.by_ref.is_none()) => {
                self.record_borrow(*decl, value);
            }
            (None, _) => {
                // `let x;`: initialized later, possibly in another block.
                for decl in &decls {
                    self.push_declare(block, span, *decl);
                }
                return;
            }
            _ => {}
        }

        self.push_let(block, span, pat, ty, init, diverge, decls);
    }

    /// Evaluates `value` into a fresh temporary.
    pub fn hoist(&mut self, block: BasicBlock, span: Span, value: Expr) -> Local {
        let temp = self.declare_temp(span);
        let ident = self.cfg.local_decl_data(temp).ident.clone();
        self.record_borrow(temp, &value);
        self.push_let(
            block,
            span,
            syn::parse_quote!(#ident),
            None,
            Some(value),
            None,
            vec![temp],
        );
        temp
    }

    fn is_plain_local(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Path(path) => path
                .path
                .get_ident()
                .and_then(|ident| self.resolve(&ident.to_string()))
                .map_or(false, |local| self.cfg.local_decl_data(local).kind == LocalKind::Temp),
            _ => false,
        }
    }

    /// Gives `destination` the value `()`.
    pub fn assign_unit(&mut self, destination: Destination, block: BasicBlock, span: Span) -> BlockAnd<()> {
        let unit: Expr = syn::parse_quote_spanned!(span=> ());
        self.assign_verbatim(destination, block, unit)
    }

    /// Gives `destination` the value of an expression without transitions.
    pub fn assign_verbatim(&mut self, destination: Destination, block: BasicBlock, expr: Expr) -> BlockAnd<()> {
        let span = expr.span();

        match destination {
            Destination::Ignore => {
                if !matches!(expr, Expr::Tuple(ref tuple) if tuple.elems.is_empty()) {
                    self.push_verbatim(block, Stmt::Expr(expr, Some(Default::default())));
                }
                block.unit()
            }
            Destination::Local(local) => {
                self.push_assign(block, span, local, expr);
                block.unit()
            }
            Destination::Return => {
                let value = self.operand(expr);
                self.terminate(span, block, TerminatorKind::Return { value });
                self.start_new_block(span, Some("AfterReturn")).unit()
            }
        }
    }
}

fn is_return(expr: &Expr) -> bool {
    matches!(expr, Expr::Return(_))
}

fn split_pat_type(pat: &Pat) -> (Pat, Option<Type>) {
    match pat {
        Pat::Type(pat_type) => ((*pat_type.pat).clone(), Some((*pat_type.ty).clone())),
        pat => (pat.clone(), None),
    }
}
