//! Locates every suspension expression in a body, numbers it in evaluation
//! order and swaps it for a placeholder.

use proc_macro2::{Span, TokenStream, TokenTree};
use syn::spanned::Spanned;
use syn::visit_mut::{self, VisitMut};
use syn::{Block, Expr, ExprMacro, Item, Macro, Stmt, StmtMacro};

use crate::error::{Error, Result};
use crate::mar::indexed_vec::IndexVec;
use crate::mar::repr::{SuspensionId, SuspensionKind, SuspensionPoint};
use crate::signature::CapabilityKind;

const PLACEHOLDER: &str = "__stateful_suspend";
const YIELD_MACRO: &str = "yield_";

#[derive(Debug)]
pub struct Extraction {
    pub body: Block,
    pub points: IndexVec<SuspensionId, SuspensionPoint>,
}

pub fn extract(body: &Block, capability: CapabilityKind) -> Result<Extraction> {
    let mut extractor = Extractor {
        capability,
        points: IndexVec::new(),
        closure_depth: 0,
        loop_depth: 0,
        error: None,
    };

    let mut body = body.clone();
    extractor.visit_block_mut(&mut body);

    if let Some(err) = extractor.error {
        return Err(err);
    }

    debug!("extract: {} suspension points", extractor.points.len());

    Ok(Extraction {
        body,
        points: extractor.points,
    })
}

/// The expression standing in for suspension point `id`.
pub fn placeholder(id: SuspensionId, span: Span) -> Expr {
    let name = syn::Ident::new(PLACEHOLDER, span);
    let index = syn::LitInt::new(&id.index().to_string(), span);
    syn::parse_quote_spanned!(span=> #name!(#index))
}

pub fn placeholder_id(expr: &Expr) -> Option<SuspensionId> {
    match expr {
        Expr::Macro(mac) if mac.mac.path.is_ident(PLACEHOLDER) => {
            let index: syn::LitInt = mac.mac.parse_body().ok()?;
            index.base10_parse().ok().map(SuspensionId::new)
        }
        Expr::Paren(paren) => placeholder_id(&paren.expr),
        Expr::Group(group) => placeholder_id(&group.expr),
        _ => None,
    }
}

pub fn is_placeholder_macro(mac: &Macro) -> bool {
    mac.path.is_ident(PLACEHOLDER)
}

fn is_yield(mac: &Macro) -> bool {
    mac.path
        .segments
        .last()
        .map_or(false, |segment| segment.ident == YIELD_MACRO)
}

struct Extractor {
    capability: CapabilityKind,
    points: IndexVec<SuspensionId, SuspensionPoint>,
    closure_depth: usize,
    loop_depth: usize,
    error: Option<Error>,
}

impl Extractor {
    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push_point(&mut self, kind: SuspensionKind, expr: Expr, span: Span) -> Expr {
        let id = self.points.push(SuspensionPoint {
            kind,
            expr,
            span,
            in_loop: self.loop_depth > 0,
            block: None,
            resume: None,
        });

        debug!("extract: {:?} {:?} in_loop={}", id, kind, self.loop_depth > 0);

        placeholder(id, span)
    }

    fn yield_point(&mut self, mac: &Macro) -> Option<Expr> {
        let span = mac.span();

        if self.closure_depth > 0 {
            self.fail(Error::EscapedSuspension { span });
            return None;
        }

        if self.capability != CapabilityKind::Sequence {
            self.fail(Error::YieldInSingleResult { span });
            return None;
        }

        let mut value: Expr = match mac.parse_body() {
            Ok(value) => value,
            Err(err) => {
                self.fail(Error::MalformedSuspension {
                    span: err.span(),
                    message: format!("expected a single expression: {}", err),
                });
                return None;
            }
        };

        self.visit_expr_mut(&mut value);

        Some(self.push_point(SuspensionKind::Yield, value, span))
    }

    /// Suspensions hidden in other macros' tokens cannot be lowered.
    fn check_macro(&mut self, mac: &Macro) {
        if let Some(span) = find_suspension_tokens(mac.tokens.clone()) {
            self.fail(Error::UnsupportedSuspension {
                span,
                what: "a macro invocation",
            });
        }
    }

    fn in_loop<F: FnOnce(&mut Self)>(&mut self, f: F) {
        self.loop_depth += 1;
        f(self);
        self.loop_depth -= 1;
    }
}

impl VisitMut for Extractor {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.error.is_some() {
            return;
        }

        match expr {
            Expr::Await(await_) => {
                let span = await_.span();

                if self.closure_depth > 0 {
                    self.fail(Error::EscapedSuspension { span });
                    return;
                }

                self.visit_expr_mut(&mut await_.base);
                let base = (*await_.base).clone();
                *expr = self.push_point(SuspensionKind::Await, base, span);
            }
            Expr::Macro(ExprMacro { mac, .. }) if is_yield(mac) => {
                if let Some(placeholder) = self.yield_point(&mac.clone()) {
                    *expr = placeholder;
                }
            }
            Expr::Macro(ExprMacro { mac, .. }) => {
                self.check_macro(&mac.clone());
            }
            Expr::Closure(closure) => {
                if closure.asyncness.is_some() {
                    // Its own suspension scope; only our yields escape it.
                    if let Some(span) = find_yield(&closure.body) {
                        self.fail(Error::EscapedSuspension { span });
                    }
                    return;
                }
                self.closure_depth += 1;
                visit_mut::visit_expr_closure_mut(self, closure);
                self.closure_depth -= 1;
            }
            Expr::Async(async_) => {
                if let Some(span) = find_yield(&Expr::Block(syn::ExprBlock {
                    attrs: vec![],
                    label: None,
                    block: async_.block.clone(),
                })) {
                    self.fail(Error::EscapedSuspension { span });
                }
            }
            Expr::Loop(loop_) => self.in_loop(|this| this.visit_block_mut(&mut loop_.body)),
            Expr::While(while_) => self.in_loop(|this| {
                this.visit_expr_mut(&mut while_.cond);
                this.visit_block_mut(&mut while_.body);
            }),
            Expr::ForLoop(for_) => {
                self.visit_expr_mut(&mut for_.expr);
                self.in_loop(|this| this.visit_block_mut(&mut for_.body));
            }
            _ => visit_mut::visit_expr_mut(self, expr),
        }
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        if self.error.is_some() {
            return;
        }

        match stmt {
            Stmt::Macro(StmtMacro {
                attrs,
                mac,
                semi_token,
            }) if is_yield(mac) => {
                let semi = Some(semi_token.unwrap_or_default());
                let mut expr = Expr::Macro(ExprMacro {
                    attrs: attrs.clone(),
                    mac: mac.clone(),
                });
                self.visit_expr_mut(&mut expr);
                *stmt = Stmt::Expr(expr, semi);
            }
            Stmt::Macro(StmtMacro { mac, .. }) => self.check_macro(&mac.clone()),
            Stmt::Item(_) => {}
            _ => visit_mut::visit_stmt_mut(self, stmt),
        }
    }

    fn visit_item_mut(&mut self, _item: &mut Item) {}
}

fn find_yield(expr: &Expr) -> Option<Span> {
    use syn::visit::{self, Visit};

    struct FindYield(Option<Span>);

    impl<'ast> Visit<'ast> for FindYield {
        fn visit_macro(&mut self, mac: &'ast Macro) {
            if self.0.is_none() && is_yield(mac) {
                self.0 = Some(mac.span());
            }
        }

        fn visit_item(&mut self, _item: &'ast Item) {}

        fn visit_expr(&mut self, expr: &'ast Expr) {
            if self.0.is_none() {
                visit::visit_expr(self, expr);
            }
        }
    }

    let mut finder = FindYield(None);
    finder.visit_expr(expr);
    finder.0
}

/// Looks for `.await` or `yield_!` inside raw macro tokens.
fn find_suspension_tokens(tokens: TokenStream) -> Option<Span> {
    let tokens: Vec<TokenTree> = tokens.into_iter().collect();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            TokenTree::Punct(punct) if punct.as_char() == '.' => {
                if let Some(TokenTree::Ident(ident)) = tokens.get(i + 1) {
                    if ident == "await" {
                        return Some(ident.span());
                    }
                }
            }
            TokenTree::Ident(ident) if ident == YIELD_MACRO => {
                if let Some(TokenTree::Punct(punct)) = tokens.get(i + 1) {
                    if punct.as_char() == '!' {
                        return Some(ident.span());
                    }
                }
            }
            TokenTree::Group(group) => {
                if let Some(span) = find_suspension_tokens(group.stream()) {
                    return Some(span);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use quote::ToTokens;
    use syn::parse_quote;

    fn extract_ok(body: Block, capability: CapabilityKind) -> Extraction {
        extract(&body, capability).unwrap()
    }

    #[test]
    fn test_numbering_follows_evaluation_order() {
        let extraction = extract_ok(
            parse_quote!({
                let a = first().await;
                if a {
                    second(third().await).await;
                } else {
                    fourth().await;
                }
            }),
            CapabilityKind::SingleResult,
        );

        let exprs: Vec<String> = extraction
            .points
            .iter()
            .map(|point| point.expr.to_token_stream().to_string())
            .collect();

        assert_eq!(
            exprs,
            vec![
                "first ()",
                "third ()",
                "second (__stateful_suspend ! (1))",
                "fourth ()",
            ]
        );
        assert!(extraction.points.iter().all(|point| !point.in_loop));
    }

    #[test]
    fn test_placeholder_roundtrip() {
        let expr = placeholder(SuspensionId::new(7), Span::call_site());
        assert_eq!(placeholder_id(&expr), Some(SuspensionId::new(7)));
        assert_eq!(placeholder_id(&parse_quote!(foo!(7))), None);
    }

    #[test]
    fn test_loops() {
        let extraction = extract_ok(
            parse_quote!({
                let n = count().await;
                for i in 0..n {
                    yield_!(i);
                }
                while more().await {}
            }),
            CapabilityKind::Sequence,
        );

        let in_loop: Vec<bool> = extraction.points.iter().map(|point| point.in_loop).collect();
        assert_eq!(in_loop, vec![false, true, true]);
        assert_eq!(extraction.points[SuspensionId::new(1)].kind, SuspensionKind::Yield);
    }

    #[test]
    fn test_yield_statement_becomes_expression() {
        let extraction = extract_ok(
            parse_quote!({
                yield_!(1u32);
            }),
            CapabilityKind::Sequence,
        );
        match &extraction.body.stmts[0] {
            Stmt::Expr(expr, Some(_)) => {
                assert_eq!(placeholder_id(expr), Some(SuspensionId::new(0)))
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_escaping_closure() {
        let err = extract(
            &parse_quote!({
                let f = || fetch().await;
                f
            }),
            CapabilityKind::SingleResult,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scope);
        assert_eq!(err.to_string(), "suspension point escapes transformable scope");
    }

    #[test]
    fn test_async_blocks_are_left_alone() {
        let extraction = extract_ok(
            parse_quote!({
                let fut = async { inner().await };
                fut.await
            }),
            CapabilityKind::SingleResult,
        );
        assert_eq!(extraction.points.len(), 1);

        let err = extract(
            &parse_quote!({
                let fut = async { yield_!(1) };
                Ok(())
            }),
            CapabilityKind::Sequence,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scope);
    }

    #[test]
    fn test_yield_in_single_result() {
        let err = extract(&parse_quote!({ yield_!(1); Ok(()) }), CapabilityKind::SingleResult)
            .unwrap_err();
        assert!(matches!(err, Error::YieldInSingleResult { .. }));
    }

    #[test]
    fn test_malformed_yield() {
        let err = extract(&parse_quote!({ yield_!(1, 2); }), CapabilityKind::Sequence).unwrap_err();
        assert!(matches!(err, Error::MalformedSuspension { .. }));
        assert_eq!(err.kind(), ErrorKind::Scope);
        assert!(err.to_string().starts_with("malformed `yield_!`"), "{}", err);
    }

    #[test]
    fn test_await_inside_macro() {
        let err = extract(
            &parse_quote!({
                println!("{}", fetch().await);
                Ok(())
            }),
            CapabilityKind::SingleResult,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scope);
    }

    #[test]
    fn test_nested_items_are_skipped() {
        let extraction = extract_ok(
            parse_quote!({
                async fn helper() -> u32 { other().await }
                helper().await
            }),
            CapabilityKind::SingleResult,
        );
        assert_eq!(extraction.points.len(), 1);
    }
}
