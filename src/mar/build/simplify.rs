//! Desugars the control flow that lowering does not handle directly, but only
//! where it has to be lowered: `for`, `while let` and `if let` that contain a
//! transition.

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::visit_mut::{self, VisitMut};
use syn::{Block, Expr, Ident, Item, Stmt};

use crate::mar::build::transition::{ContainsTransition, Context};
use crate::signature::CapabilityKind;

pub fn simplify_body(mut body: Block, capability: CapabilityKind) -> Block {
    // A stream body ending in a loop or an `if` without `else` has no value
    // of its own; it falls through to the implicit `Ok(())`. A `loop` only
    // ends through `break`, so its value is unit too.
    if capability == CapabilityKind::Sequence {
        if let Some(Stmt::Expr(expr, semi @ None)) = body.stmts.last_mut() {
            let unit = match expr {
                Expr::ForLoop(_) | Expr::While(_) | Expr::Loop(_) => true,
                Expr::If(expr_if) => expr_if.else_branch.is_none(),
                _ => false,
            };
            if unit {
                *semi = Some(Default::default());
            }
        }
    }

    let mut expander = Expander { iter_count: 0 };
    expander.visit_block_mut(&mut body);
    body
}

struct Expander {
    iter_count: usize,
}

impl Expander {
    fn next_iter_ident(&mut self, span: Span) -> Ident {
        let ident = Ident::new(&format!("__stateful_iter{}", self.iter_count), span);
        self.iter_count += 1;
        ident
    }

    fn expand(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            Expr::ForLoop(for_) => {
                let span = for_.span();
                let iter = self.next_iter_ident(span);
                let label = &for_.label;
                let pat = &for_.pat;
                let iterable = &for_.expr;
                let body = &for_.body;

                Some(syn::parse_quote_spanned! {span=>
                    {
                        let mut #iter = ::core::iter::IntoIterator::into_iter(#iterable);
                        #label loop {
                            match ::core::iter::Iterator::next(&mut #iter) {
                                ::core::option::Option::Some(#pat) => #body,
                                ::core::option::Option::None => break,
                            }
                        }
                    }
                })
            }
            Expr::While(while_) => match &*while_.cond {
                Expr::Let(let_) => {
                    let span = while_.span();
                    let label = &while_.label;
                    let pat = &let_.pat;
                    let scrutinee = &let_.expr;
                    let body = &while_.body;

                    Some(syn::parse_quote_spanned! {span=>
                        #label loop {
                            match #scrutinee {
                                #pat => #body,
                                _ => break,
                            }
                        }
                    })
                }
                _ => None,
            },
            Expr::If(expr_if) => match &*expr_if.cond {
                Expr::Let(let_) => {
                    let span = expr_if.span();
                    let pat = &let_.pat;
                    let scrutinee = &let_.expr;
                    let then_branch = &expr_if.then_branch;
                    let else_branch = match &expr_if.else_branch {
                        Some((_, else_branch)) => (**else_branch).clone(),
                        None => syn::parse_quote_spanned!(span=> {}),
                    };

                    Some(syn::parse_quote_spanned! {span=>
                        match #scrutinee {
                            #pat => #then_branch,
                            _ => #else_branch,
                        }
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl VisitMut for Expander {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if matches!(expr, Expr::Closure(_) | Expr::Async(_)) {
            return;
        }

        visit_mut::visit_expr_mut(self, expr);

        if expr.contains_transition(&Context::Any) {
            if let Some(expanded) = self.expand(expr) {
                debug!("simplify: desugared {}", kind_name(expr));
                *expr = expanded;
            }
        }
    }

    fn visit_item_mut(&mut self, _item: &mut Item) {}
}

fn kind_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::ForLoop(_) => "for",
        Expr::While(_) => "while let",
        Expr::If(_) => "if let",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use syn::parse_quote;

    fn simplify(body: Block) -> String {
        simplify_body(body, CapabilityKind::SingleResult)
            .to_token_stream()
            .to_string()
    }

    #[test]
    fn test_for_with_suspension_is_desugared() {
        let out = simplify(parse_quote!({
            for x in items {
                __stateful_suspend!(0);
            }
        }));
        assert!(out.contains("IntoIterator :: into_iter (items)"));
        assert!(out.contains("__stateful_iter0"));
        assert!(!out.contains("for x in"));
    }

    #[test]
    fn test_plain_for_is_kept() {
        let out = simplify(parse_quote!({
            for x in items {
                total += x;
            }
        }));
        assert!(out.contains("for x in items"));
    }

    #[test]
    fn test_if_let_becomes_match() {
        let out = simplify(parse_quote!({
            if let Some(x) = opt {
                __stateful_suspend!(0);
            }
        }));
        assert!(out.contains("match opt"));
        assert!(out.contains("_ => { }"));
    }

    #[test]
    fn test_while_let_becomes_loop() {
        let out = simplify(parse_quote!({
            while let Some(x) = queue.pop() {
                __stateful_suspend!(0);
            }
        }));
        assert!(out.contains("loop"));
        assert!(out.contains("match queue . pop ()"));
    }

    #[test]
    fn test_sequence_tail_loop_is_a_statement() {
        let body = simplify_body(
            parse_quote!({
                for x in 0..3 {
                    __stateful_suspend!(0);
                }
            }),
            CapabilityKind::Sequence,
        );
        assert!(matches!(body.stmts.last(), Some(Stmt::Expr(_, Some(_)))));
    }
}
