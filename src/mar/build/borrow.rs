//! Recognizes locals initialized by borrowing a place, so the borrow can be
//! taken again after a suspension instead of being stored.

use syn::visit::{self, Visit};
use syn::{Expr, Type, UnOp};

use crate::mar::build::Builder;
use crate::mar::repr::*;

impl Builder {
    /// Records a borrow recipe on `local` when `init` is `&place` or
    /// `&mut place`.
    pub fn record_borrow(&mut self, local: Local, init: &Expr) {
        let borrow = match self.borrow_of(init) {
            Some(borrow) => borrow,
            None => {
                self.record_derived(local, init);
                return;
            }
        };

        debug!(
            "record_borrow: {} borrows {:?} via {:?}",
            self.cfg.local_decl_data(local).ident,
            borrow.root,
            borrow.origin
        );

        self.cfg.local_decl_data_mut(local).borrow = Some(borrow);
    }

    /// Marks `local` as possibly borrowing the frame local its initializer
    /// reads through a method call, index or field. A type annotation
    /// without lifetimes says otherwise.
    fn record_derived(&mut self, local: Local, init: &Expr) {
        let decl = self.cfg.local_decl_data(local);
        if decl.ty.as_ref().map_or(false, is_owned_type) {
            return;
        }

        if let Some(root) = self.derived_root(init) {
            debug!("record_borrow: {} may borrow {:?}", decl.ident, root);
            self.cfg.local_decl_data_mut(local).derived_from = Some(root);
        }
    }

    fn derived_root(&self, init: &Expr) -> Option<Local> {
        let mut expr = strip_parens(init);
        let mut projected = false;

        loop {
            expr = match expr {
                Expr::MethodCall(call) => &*call.receiver,
                Expr::Field(field) => &*field.base,
                Expr::Index(index) => &*index.expr,
                Expr::Try(try_) => &*try_.expr,
                Expr::Paren(paren) => &*paren.expr,
                Expr::Group(group) => &*group.expr,
                Expr::Path(path) if path.qself.is_none() => {
                    let local = self.resolve(&path.path.get_ident()?.to_string())?;
                    let decl = self.cfg.local_decl_data(local);
                    if !projected {
                        return decl.derived_from;
                    }
                    return match &decl.borrow {
                        Some(Borrow {
                            origin: BorrowOrigin::External { .. },
                            ..
                        }) => None,
                        Some(Borrow { root, .. }) => Some(*root),
                        None if decl.is_param() && decl.has_reference_type() => None,
                        None => Some(decl.derived_from.unwrap_or(local)),
                    };
                }
                _ => return None,
            };
            projected = true;
        }
    }

    fn borrow_of(&self, init: &Expr) -> Option<Borrow> {
        let (mutability, place) = match strip_parens(init) {
            // A copy of another borrower borrows the same place.
            Expr::Path(path) if path.qself.is_none() => {
                let local = self.resolve(&path.path.get_ident()?.to_string())?;
                return self.cfg.local_decl_data(local).borrow.clone();
            }
            Expr::Reference(reference) => {
                let mutability = if reference.mutability.is_some() {
                    Mutability::Mut
                } else {
                    Mutability::Not
                };
                (mutability, &*reference.expr)
            }
            _ => return None,
        };

        let mut deps = vec![];
        let root = self.place_root(place, &mut deps)?;
        let projected = !matches!(strip_parens(place), Expr::Path(_));

        let root_decl = self.cfg.local_decl_data(root);
        let origin = match &root_decl.borrow {
            Some(Borrow {
                origin: origin @ BorrowOrigin::External { .. },
                ..
            }) => origin.clone(),
            Some(Borrow {
                origin: BorrowOrigin::Internal,
                deps: root_deps,
                ..
            }) => {
                deps.extend(root_deps.iter().cloned());
                BorrowOrigin::Internal
            }
            None if root_decl.is_param() && projected && is_reference(root_decl) => {
                BorrowOrigin::External {
                    lifetimes: root_decl
                        .type_lifetimes()
                        .iter()
                        .map(|lifetime| lifetime.to_string())
                        .collect(),
                }
            }
            None => BorrowOrigin::Internal,
        };

        let mut seen = vec![];
        deps.retain(|dep| {
            let fresh = !seen.contains(dep);
            seen.push(*dep);
            fresh
        });

        Some(Borrow {
            mutability,
            place: place.clone(),
            root,
            deps,
            origin,
        })
    }

    /// Walks a place expression down to the local it is rooted in, pushing
    /// every local it reads. Index operands must be literals or immutable
    /// locals, so that evaluating the place again yields the same place.
    fn place_root(&self, place: &Expr, deps: &mut Vec<Local>) -> Option<Local> {
        match place {
            Expr::Path(path) if path.qself.is_none() => {
                let ident = path.path.get_ident()?;
                let local = self.resolve(&ident.to_string())?;
                deps.insert(0, local);
                Some(local)
            }
            Expr::Paren(paren) => self.place_root(&paren.expr, deps),
            Expr::Field(field) => self.place_root(&field.base, deps),
            Expr::Unary(unary) if matches!(unary.op, UnOp::Deref(_)) => {
                self.place_root(&unary.expr, deps)
            }
            Expr::Index(index) => {
                match strip_parens(&index.index) {
                    Expr::Lit(_) => {}
                    Expr::Path(path) if path.qself.is_none() => {
                        let ident = path.path.get_ident()?;
                        let local = self.resolve(&ident.to_string())?;
                        if self.cfg.local_decl_data(local).mutability.is_mut() {
                            return None;
                        }
                        deps.push(local);
                    }
                    _ => return None,
                }
                self.place_root(&index.expr, deps)
            }
            _ => None,
        }
    }
}

fn is_reference(decl: &LocalDecl) -> bool {
    matches!(decl.ty, Some(syn::Type::Reference(_)))
}

/// No lifetimes, and nothing left for inference to fill in with one.
fn is_owned_type(ty: &Type) -> bool {
    struct Opaque(bool);

    impl<'ast> Visit<'ast> for Opaque {
        fn visit_type(&mut self, ty: &'ast Type) {
            match ty {
                Type::Infer(_) | Type::ImplTrait(_) | Type::TraitObject(_) => self.0 = true,
                ty => visit::visit_type(self, ty),
            }
        }
    }

    let mut opaque = Opaque(false);
    opaque.visit_type(ty);
    !opaque.0 && lifetimes_of(ty).is_empty()
}

fn strip_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => strip_parens(&paren.expr),
        Expr::Group(group) => strip_parens(&group.expr),
        expr => expr,
    }
}
