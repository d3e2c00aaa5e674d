//! Rewrites early exits in copied code so they complete the machine.
//!
//! Inside the resume function `?` and `return` must produce a `Poll`, so
//! `e?` becomes a match that completes with the error and `return v`
//! completes with `v`. Closures, async blocks and nested items have exits
//! of their own and are skipped.

use syn::spanned::Spanned;
use syn::visit_mut::{self, VisitMut};
use syn::{Expr, ExprAsync, ExprClosure, ExprTry, Item, Stmt};

use crate::signature::CapabilityKind;

pub struct ShortcutRewriter {
    pub capability: CapabilityKind,
}

impl ShortcutRewriter {
    pub fn new(capability: CapabilityKind) -> Self {
        ShortcutRewriter { capability }
    }

    pub fn rewrite(&mut self, expr: &mut Expr) {
        self.visit_expr_mut(expr);
    }

    pub fn rewrite_stmt(&mut self, stmt: &mut Stmt) {
        self.visit_stmt_mut(stmt);
    }

    /// The `Poll` a completion with `value` produces.
    pub fn complete(&self, value: &Expr) -> Expr {
        let span = value.span();
        match self.capability {
            CapabilityKind::SingleResult => syn::parse_quote_spanned! {span=>
                ::core::task::Poll::Ready(#value)
            },
            CapabilityKind::Sequence => syn::parse_quote_spanned! {span=>
                match #value {
                    ::core::result::Result::Ok(()) => ::core::task::Poll::Ready(::core::option::Option::None),
                    ::core::result::Result::Err(__stateful_err) => ::core::task::Poll::Ready(
                        ::core::option::Option::Some(::core::result::Result::Err(__stateful_err)),
                    ),
                }
            },
        }
    }

    fn error_exit(&self, expr: &ExprTry) -> Expr {
        let span = expr.question_token.span;
        let inner = &expr.expr;
        let failed: Expr = syn::parse_quote_spanned! {span=>
            ::core::result::Result::Err(::core::convert::From::from(__stateful_err))
        };
        let complete = self.complete(&failed);
        syn::parse_quote_spanned! {span=>
            match #inner {
                ::core::result::Result::Ok(__stateful_ok) => __stateful_ok,
                ::core::result::Result::Err(__stateful_err) => return #complete,
            }
        }
    }
}

impl VisitMut for ShortcutRewriter {
    fn visit_item_mut(&mut self, _item: &mut Item) {}

    fn visit_expr_closure_mut(&mut self, _closure: &mut ExprClosure) {}

    fn visit_expr_async_mut(&mut self, _async: &mut ExprAsync) {}

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        visit_mut::visit_expr_mut(self, expr);

        let rewritten = match expr {
            Expr::Try(expr_try) => self.error_exit(expr_try),
            Expr::Return(expr_return) => {
                let span = expr_return.span();
                let value = match &expr_return.expr {
                    Some(value) => (**value).clone(),
                    None => syn::parse_quote_spanned!(span=> ::core::result::Result::Ok(())),
                };
                let complete = self.complete(&value);
                syn::parse_quote_spanned!(span=> return #complete)
            }
            _ => return,
        };

        *expr = rewritten;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;

    fn rewrite(capability: CapabilityKind, mut expr: Expr) -> String {
        ShortcutRewriter::new(capability).rewrite(&mut expr);
        expr.into_token_stream().to_string()
    }

    #[test]
    fn test_try_in_future() {
        let rendered = rewrite(CapabilityKind::SingleResult, syn::parse_quote!(parse(line)?));
        assert!(rendered.starts_with("match parse (line)"));
        assert!(rendered.contains(
            "return :: core :: task :: Poll :: Ready (:: core :: result :: Result :: Err (:: core :: convert :: From :: from (__stateful_err)))"
        ));
    }

    #[test]
    fn test_return_in_stream() {
        let rendered = rewrite(CapabilityKind::Sequence, syn::parse_quote!(if done { return Ok(()); }));
        assert!(rendered.contains("return match Ok (())"));
        assert!(rendered.contains(":: core :: option :: Option :: None"));
    }

    #[test]
    fn test_closures_untouched() {
        let rendered = rewrite(
            CapabilityKind::SingleResult,
            syn::parse_quote!(items.iter().map(|item| item.parse::<u32>()?).count()),
        );
        assert!(!rendered.contains("__stateful_err"));

        let rendered = rewrite(CapabilityKind::SingleResult, syn::parse_quote!(async { fetch().await? }));
        assert!(!rendered.contains("__stateful_err"));
    }

    #[test]
    fn test_nested_try() {
        let rendered = rewrite(CapabilityKind::SingleResult, syn::parse_quote!(open(path?)?));
        assert_eq!(rendered.matches("__stateful_ok").count(), 4);
    }
}
