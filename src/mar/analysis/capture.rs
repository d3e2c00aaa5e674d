//! What each suspension point keeps in the state object, and how.

use syn::Ident;

use crate::error::{Error, Result};
use crate::mar::analysis::{contains, locals_of, remove_all, Initialization, Liveness};
use crate::mar::repr::*;
use crate::signature::LifetimeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureKind {
    /// Moved into the state object.
    ByValue,
    /// A borrow of another frame local. Only the borrowed local is kept; the
    /// borrow is taken again on resume.
    Internal { root: Local },
    /// A borrow of something the caller owns, kept as is.
    External { lifetimes: Vec<String> },
}

#[derive(Clone, Debug)]
pub struct Capture {
    pub local: Local,
    pub ident: Ident,
    pub kind: CaptureKind,
}

impl Capture {
    pub fn is_by_ref(&self) -> bool {
        self.kind != CaptureKind::ByValue
    }
}

/// The captures of every reachable suspension point, in local order.
#[derive(Clone, Debug, Default)]
pub struct CaptureSet {
    points: Vec<(SuspensionId, Vec<Capture>)>,
}

impl CaptureSet {
    pub fn compute(mar: &Mar, liveness: &Liveness, init: &Initialization) -> Self {
        let mut points = vec![];

        for (id, point) in mar.live_suspension_points() {
            let (source, resume) = match (point.block, point.resume) {
                (Some(source), Some(resume)) => (source, resume),
                _ => continue,
            };

            let mut live = liveness.live_in[resume].clone();
            remove_all(&mut live, &mar[source].terminator().edge_defs(resume));

            let captures = locals_of(&live)
                .into_iter()
                .filter(|local| contains(&init.init_out[source], *local))
                .map(|local| {
                    let decl = mar.local_decl_data(local);
                    Capture {
                        local,
                        ident: decl.ident.clone(),
                        kind: capture_kind(decl),
                    }
                })
                .collect::<Vec<_>>();

            debug!(
                "captures at {}: [{}]",
                id,
                captures
                    .iter()
                    .map(|capture| capture.ident.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            points.push((id, captures));
        }

        CaptureSet { points }
    }

    #[cfg(test)]
    pub(crate) fn from_points(points: Vec<(SuspensionId, Vec<Capture>)>) -> Self {
        CaptureSet { points }
    }

    pub fn get(&self, id: SuspensionId) -> Option<&[Capture]> {
        self.points
            .iter()
            .find(|(point, _)| *point == id)
            .map(|(_, captures)| captures.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SuspensionId, &[Capture])> {
        self.points.iter().map(|(id, captures)| (*id, captures.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rejects captures no strategy can store: borrows whose lifetime the
    /// declared return type does not name, and reassignable borrows of
    /// frame locals.
    pub fn validate(&self, mar: &Mar, lifetimes: &LifetimeSet) -> Result<()> {
        for (id, captures) in self.iter() {
            let point = mar.suspension_point(id);

            for capture in captures {
                let decl = mar.local_decl_data(capture.local);

                match &capture.kind {
                    CaptureKind::ByValue => {}
                    CaptureKind::Internal { .. } => {
                        if decl.mutability.is_mut() {
                            return Err(Error::MutableSelfReference {
                                span: point.span,
                                point: id,
                                binding: capture.ident.to_string(),
                            });
                        }
                    }
                    CaptureKind::External { lifetimes: needed } => {
                        if let Some(lifetime) = needed.iter().find(|lifetime| !lifetimes.contains(lifetime)) {
                            return Err(Error::UncoveredBorrow {
                                span: point.span,
                                point: id,
                                binding: capture.ident.to_string(),
                                lifetime: lifetime.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn capture_kind(decl: &LocalDecl) -> CaptureKind {
    match &decl.borrow {
        Some(Borrow {
            origin: BorrowOrigin::Internal,
            root,
            ..
        }) => CaptureKind::Internal { root: *root },
        Some(Borrow {
            origin: BorrowOrigin::External { lifetimes },
            ..
        }) => CaptureKind::External {
            lifetimes: lifetimes.clone(),
        },
        None if decl.is_param() && decl.has_reference_type() => CaptureKind::External {
            lifetimes: decl
                .type_lifetimes()
                .iter()
                .map(|lifetime| lifetime.to_string())
                .collect(),
        },
        None => CaptureKind::ByValue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proc_macro2::Span;
    use syn::parse_quote;

    fn decl(name: &str, kind: LocalKind, ty: Option<syn::Type>) -> LocalDecl {
        LocalDecl::new(Ident::new(name, Span::call_site()), Mutability::Not, kind).with_ty(ty)
    }

    #[test]
    fn test_capture_kind() {
        assert_eq!(capture_kind(&decl("x", LocalKind::Var, None)), CaptureKind::ByValue);
        assert_eq!(
            capture_kind(&decl("x", LocalKind::Param, Some(parse_quote!(u32)))),
            CaptureKind::ByValue
        );
        assert_eq!(
            capture_kind(&decl("s", LocalKind::Param, Some(parse_quote!(&'a str)))),
            CaptureKind::External {
                lifetimes: vec!["'a".to_string()]
            }
        );
        assert_eq!(
            capture_kind(&decl("s", LocalKind::SelfParam, Some(parse_quote!(&Self)))),
            CaptureKind::External {
                lifetimes: vec!["'_".to_string()]
            }
        );

        let mut borrower = decl("r", LocalKind::Var, None);
        borrower.borrow = Some(Borrow {
            mutability: Mutability::Not,
            place: parse_quote!(v),
            root: Local::new(0),
            deps: vec![Local::new(0)],
            origin: BorrowOrigin::Internal,
        });
        assert_eq!(capture_kind(&borrower), CaptureKind::Internal { root: Local::new(0) });
    }
}
