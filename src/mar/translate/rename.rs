//! Renames bindings in code copied into the resume function.

use std::collections::HashMap;

use proc_macro2::{Group, Ident, TokenStream, TokenTree};
use syn::visit_mut::{self, VisitMut};
use syn::{Expr, ExprPath, FieldPat, Item, Macro, Pat, PatIdent};

/// The name `self` is bound under inside the resume function, where a
/// closure parameter cannot be called `self`.
pub const SELF_NAME: &str = "__stateful_self";

/// Rewrites every use of the receiver to [`SELF_NAME`]. Nested items have a
/// receiver of their own and are left alone.
pub struct SelfRenamer;

impl VisitMut for SelfRenamer {
    fn visit_item_mut(&mut self, _item: &mut Item) {}

    fn visit_expr_path_mut(&mut self, path: &mut ExprPath) {
        if path.qself.is_none() && path.path.segments.len() == 1 {
            let segment = &mut path.path.segments[0];
            if segment.ident == "self" {
                segment.ident = Ident::new(SELF_NAME, segment.ident.span());
            }
        }
        visit_mut::visit_expr_path_mut(self, path);
    }

    fn visit_macro_mut(&mut self, mac: &mut Macro) {
        mac.tokens = rename_tokens(mac.tokens.clone(), &|ident| {
            if ident == "self" {
                Some(SELF_NAME.to_string())
            } else {
                None
            }
        });
    }
}

/// Renames the bindings of a match arm, in its pattern and its guard.
pub struct BindingRenamer<'a> {
    pub names: &'a HashMap<String, Ident>,
}

impl<'a> BindingRenamer<'a> {
    pub fn rename_pat(&mut self, pat: &mut Pat) {
        self.visit_pat_mut(pat);
    }

    pub fn rename_expr(&mut self, expr: &mut Expr) {
        self.visit_expr_mut(expr);
    }
}

impl<'a> VisitMut for BindingRenamer<'a> {
    fn visit_item_mut(&mut self, _item: &mut Item) {}

    fn visit_field_pat_mut(&mut self, field: &mut FieldPat) {
        // `Point { x, .. }` needs the field name spelled out once `x` is renamed.
        if field.colon_token.is_none() {
            field.colon_token = Some(Default::default());
        }
        visit_mut::visit_field_pat_mut(self, field);
    }

    fn visit_pat_ident_mut(&mut self, pat: &mut PatIdent) {
        if let Some(name) = self.names.get(&pat.ident.to_string()) {
            pat.ident = name.clone();
        }
        visit_mut::visit_pat_ident_mut(self, pat);
    }

    fn visit_expr_path_mut(&mut self, path: &mut ExprPath) {
        if path.qself.is_none() {
            if let Some(ident) = path.path.get_ident() {
                if let Some(name) = self.names.get(&ident.to_string()) {
                    path.path.segments[0].ident = name.clone();
                }
            }
        }
        visit_mut::visit_expr_path_mut(self, path);
    }

    fn visit_macro_mut(&mut self, mac: &mut Macro) {
        let names = self.names;
        mac.tokens = rename_tokens(mac.tokens.clone(), &|ident| {
            names.get(ident).map(|name| name.to_string())
        });
    }
}

/// Renames identifier tokens that are not the start of a path (`self::x`)
/// nor a field access or method name (`.x`).
fn rename_tokens(tokens: TokenStream, rename: &dyn Fn(&str) -> Option<String>) -> TokenStream {
    let tokens: Vec<TokenTree> = tokens.into_iter().collect();
    let mut out = Vec::with_capacity(tokens.len());

    for (index, token) in tokens.iter().enumerate() {
        let token = match token {
            TokenTree::Group(group) => {
                let mut renamed = Group::new(group.delimiter(), rename_tokens(group.stream(), rename));
                renamed.set_span(group.span());
                TokenTree::Group(renamed)
            }
            TokenTree::Ident(ident) => {
                let after_dot = index > 0 && is_punct(&tokens[index - 1], '.');
                let before_path = index + 1 < tokens.len() && is_punct(&tokens[index + 1], ':');
                match rename(&ident.to_string()) {
                    Some(name) if !after_dot && !before_path => TokenTree::Ident(Ident::new(&name, ident.span())),
                    _ => token.clone(),
                }
            }
            token => token.clone(),
        };
        out.push(token);
    }

    out.into_iter().collect()
}

fn is_punct(token: &TokenTree, ch: char) -> bool {
    matches!(token, TokenTree::Punct(punct) if punct.as_char() == ch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use syn::parse::Parser;

    fn render<T: ToTokens>(node: &T) -> String {
        node.to_token_stream().to_string()
    }

    #[test]
    fn test_self_renamer() {
        let mut expr: Expr = syn::parse_quote! {
            {
                self.count += 1;
                println!("{}", self.count);
                fn helper(&self) -> usize { self.0 }
                self::helper(Self::DEFAULT)
            }
        };
        SelfRenamer.visit_expr_mut(&mut expr);

        let rendered = render(&expr);
        assert!(rendered.contains("__stateful_self . count += 1"));
        assert!(rendered.contains("\"{}\" , __stateful_self . count"));
        assert!(rendered.contains("{ self . 0 }"));
        assert!(rendered.contains("self :: helper (Self :: DEFAULT)"));
    }

    #[test]
    fn test_binding_renamer() {
        let mut names = HashMap::new();
        names.insert("x".to_string(), Ident::new("__stateful_bind_x_3", proc_macro2::Span::call_site()));

        let mut pat: Pat = syn::Pat::parse_single.parse_str("Point { x, y: 0 }").unwrap();
        let mut guard: Expr = syn::parse_quote!(x > limit.x);

        let mut renamer = BindingRenamer { names: &names };
        renamer.rename_pat(&mut pat);
        renamer.rename_expr(&mut guard);

        assert_eq!(render(&pat), "Point { x : __stateful_bind_x_3 , y : 0 }");
        assert_eq!(render(&guard), "__stateful_bind_x_3 > limit . x");
    }
}
