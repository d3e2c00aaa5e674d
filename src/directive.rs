//! Strategy directives attached to the transformation marker.

use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Ident, Token, Type};

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub enum Directive {
    /// `default`, the self-referential representation.
    Default(Span),
    /// `pinned`, a spelled-out `default`.
    Pinned(Span),
    Movable(Span),
    HeapIndirected(Span),
    /// `bound = Type`, the definition of a named alias return type.
    Bound(Box<Type>, Span),
}

impl Directive {
    pub fn span(&self) -> Span {
        match *self {
            Directive::Default(span)
            | Directive::Pinned(span)
            | Directive::Movable(span)
            | Directive::HeapIndirected(span)
            | Directive::Bound(_, span) => span,
        }
    }

    fn strategy_name(&self) -> Option<&'static str> {
        match self {
            Directive::Default(_) => Some("default"),
            Directive::Pinned(_) => Some("pinned"),
            Directive::Movable(_) => Some("movable"),
            Directive::HeapIndirected(_) => Some("heap_indirected"),
            Directive::Bound(..) => None,
        }
    }
}

impl Parse for Directive {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let ident = input.call(Ident::parse_any)?;
        let span = ident.span();

        match ident.to_string().as_str() {
            "default" => Ok(Directive::Default(span)),
            "pinned" => Ok(Directive::Pinned(span)),
            "movable" => Ok(Directive::Movable(span)),
            "heap_indirected" => Ok(Directive::HeapIndirected(span)),
            "bound" => {
                input.parse::<Token![=]>()?;
                let ty: Type = input.parse()?;
                let span = span.join(ty.span()).unwrap_or(span);
                Ok(Directive::Bound(Box::new(ty), span))
            }
            other => Err(syn::Error::new(
                span,
                format!(
                    "unknown directive `{}`, expected one of `default`, `pinned`, `movable`, `heap_indirected`, `bound = Type`",
                    other
                ),
            )),
        }
    }
}

/// The parsed directive list, in source order.
#[derive(Clone, Debug, Default)]
pub struct Directives {
    pub list: Vec<Directive>,
}

impl Parse for Directives {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let list = Punctuated::<Directive, Token![,]>::parse_terminated(input)?;
        Ok(Directives {
            list: list.into_iter().collect(),
        })
    }
}

/// What the strategy selector is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyDirective {
    Unspecified,
    Movable,
    HeapIndirected,
}

#[derive(Clone, Debug)]
pub struct ResolvedDirectives {
    pub strategy: StrategyDirective,
    pub strategy_span: Option<Span>,
    pub bound: Option<Type>,
}

impl Directives {
    pub fn new() -> Self {
        Directives::default()
    }

    pub fn with(mut self, directive: Directive) -> Self {
        self.list.push(directive);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Collapses the list into a single strategy request. Any two strategy
    /// directives conflict, identical ones included, so that a rejected
    /// triple is rejected the same way no matter how it was spelled.
    pub fn resolve(&self) -> Result<ResolvedDirectives> {
        let mut strategy: Option<&Directive> = None;
        let mut bound: Option<&Directive> = None;

        for directive in &self.list {
            match directive {
                Directive::Bound(..) => {
                    if bound.is_some() {
                        return Err(Error::DuplicateBound {
                            span: directive.span(),
                        });
                    }
                    bound = Some(directive);
                }
                _ => {
                    if let Some(first) = strategy {
                        return Err(Error::ConflictingDirectives {
                            span: directive.span(),
                            first: first.strategy_name().unwrap_or("bound"),
                            second: directive.strategy_name().unwrap_or("bound"),
                        });
                    }
                    strategy = Some(directive);
                }
            }
        }

        let resolved = ResolvedDirectives {
            strategy: match strategy {
                Some(Directive::Movable(_)) => StrategyDirective::Movable,
                Some(Directive::HeapIndirected(_)) => StrategyDirective::HeapIndirected,
                _ => StrategyDirective::Unspecified,
            },
            strategy_span: strategy.map(Directive::span),
            bound: match bound {
                Some(Directive::Bound(ty, _)) => Some((**ty).clone()),
                _ => None,
            },
        };

        debug!("resolve directives: {:?} {:?}", resolved.strategy, resolved.bound.is_some());

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use syn::parse_quote;

    fn parse(tokens: proc_macro2::TokenStream) -> Directives {
        syn::parse2(tokens).expect("directives parse")
    }

    #[test]
    fn test_empty() {
        let directives = parse(quote::quote!());
        let resolved = directives.resolve().unwrap();
        assert_eq!(resolved.strategy, StrategyDirective::Unspecified);
        assert!(resolved.bound.is_none());
    }

    #[test]
    fn test_single() {
        let resolved = parse(quote::quote!(movable)).resolve().unwrap();
        assert_eq!(resolved.strategy, StrategyDirective::Movable);

        let resolved = parse(quote::quote!(heap_indirected)).resolve().unwrap();
        assert_eq!(resolved.strategy, StrategyDirective::HeapIndirected);

        let resolved = parse(quote::quote!(default)).resolve().unwrap();
        assert_eq!(resolved.strategy, StrategyDirective::Unspecified);

        let resolved = parse(quote::quote!(pinned)).resolve().unwrap();
        assert_eq!(resolved.strategy, StrategyDirective::Unspecified);
    }

    #[test]
    fn test_bound() {
        let resolved = parse(quote::quote!(movable, bound = Pin<Box<dyn Future<Output = Result<u8, ()>>>>))
            .resolve()
            .unwrap();
        let expected: Type = parse_quote!(Pin<Box<dyn Future<Output = Result<u8, ()>>>>);
        assert_eq!(resolved.bound, Some(expected));
    }

    #[test]
    fn test_conflicts() {
        let err = parse(quote::quote!(movable, heap_indirected)).resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectiveConflict);
        assert_eq!(
            err.to_string(),
            "conflicting strategy directives: `movable` and `heap_indirected`"
        );

        let err = parse(quote::quote!(heap_indirected, movable)).resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectiveConflict);

        let err = parse(quote::quote!(movable, movable)).resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectiveConflict);

        let err = parse(quote::quote!(bound = A, bound = B)).resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectiveConflict);
    }

    #[test]
    fn test_unknown() {
        assert!(syn::parse2::<Directives>(quote::quote!(fast)).is_err());
    }
}
