//! Picks the memory representation of the state object and checks the
//! captures against it.

use std::fmt;

use crate::directive::{ResolvedDirectives, StrategyDirective};
use crate::error::{Error, Result};
use crate::mar::analysis::{CaptureKind, CaptureSet};
use crate::mar::repr::Mar;
use crate::signature::{HeapHandle, SignatureInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The state object may move between resumes. It implements `Unpin`.
    Movable,
    /// The state object stays put once first resumed, so borrows of its own
    /// fields may cross suspension points.
    Pinned,
    /// A pinned state object behind a heap handle of the given shape.
    HeapIndirected(HeapHandle),
}

impl Strategy {
    /// Whether captured borrows of frame locals are allowed.
    pub fn permits_self_reference(self) -> bool {
        !matches!(self, Strategy::Movable)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Strategy::Movable => write!(f, "movable"),
            Strategy::Pinned => write!(f, "pinned"),
            Strategy::HeapIndirected(_) => write!(f, "heap_indirected"),
        }
    }
}

/// Combines the directive with what the return type implies. A heap handle
/// return type asks for `HeapIndirected` on its own; without any request
/// the pinned representation is used.
pub fn select(directives: &ResolvedDirectives, signature: &SignatureInfo) -> Result<Strategy> {
    let strategy = match (directives.strategy, signature.heap) {
        (StrategyDirective::Movable, Some(_)) => {
            return Err(Error::MovableHeapConflict {
                span: directives.strategy_span.unwrap_or(signature.span),
            });
        }
        (StrategyDirective::Movable, None) => Strategy::Movable,
        (StrategyDirective::HeapIndirected, heap) => {
            Strategy::HeapIndirected(heap.unwrap_or(HeapHandle::PinnedBox))
        }
        (StrategyDirective::Unspecified, Some(heap)) => Strategy::HeapIndirected(heap),
        (StrategyDirective::Unspecified, None) => Strategy::Pinned,
    };

    debug!("strategy: {}", strategy);

    Ok(strategy)
}

/// Rejects captures the chosen representation cannot hold. A movable state
/// object also refuses values read out of a frame local through a method
/// call, index or field, since they may borrow it.
pub fn validate(strategy: Strategy, mar: &Mar, captures: &CaptureSet) -> Result<()> {
    if strategy.permits_self_reference() {
        return Ok(());
    }

    for (point, point_captures) in captures.iter() {
        if let Some(capture) = point_captures.iter().find(|capture| match capture.kind {
            CaptureKind::Internal { .. } => true,
            CaptureKind::ByValue => mar.local_decl_data(capture.local).derived_from.is_some(),
            CaptureKind::External { .. } => false,
        }) {
            return Err(Error::MovableSelfReference {
                span: mar.suspension_point(point).span,
                point,
                binding: capture.ident.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Directives;
    use crate::error::ErrorKind;
    use crate::mar::analysis::Capture;
    use crate::mar::indexed_vec::Idx;
    use crate::mar::repr::*;
    use crate::mar::test_util::mar_from_edges;
    use crate::signature::{analyze, AliasTable};
    use proc_macro2::Span;
    use syn::parse_quote;

    fn signature(ret: syn::ReturnType) -> SignatureInfo {
        analyze(&ret, &AliasTable::new(), None).unwrap()
    }

    fn directives(tokens: proc_macro2::TokenStream) -> ResolvedDirectives {
        syn::parse2::<Directives>(tokens).unwrap().resolve().unwrap()
    }

    #[test]
    fn test_select() {
        let plain = signature(parse_quote!(-> impl Future<Output = Result<u32, ()>>));
        let boxed = signature(parse_quote!(-> BoxFuture<'static, Result<u32, ()>>));

        assert_eq!(select(&directives(quote::quote!()), &plain).unwrap(), Strategy::Pinned);
        assert_eq!(select(&directives(quote::quote!(pinned)), &plain).unwrap(), Strategy::Pinned);
        assert_eq!(select(&directives(quote::quote!(movable)), &plain).unwrap(), Strategy::Movable);
        assert_eq!(
            select(&directives(quote::quote!(heap_indirected)), &plain).unwrap(),
            Strategy::HeapIndirected(HeapHandle::PinnedBox)
        );
        assert_eq!(
            select(&directives(quote::quote!()), &boxed).unwrap(),
            Strategy::HeapIndirected(HeapHandle::PinnedBox)
        );

        let err = select(&directives(quote::quote!(movable)), &boxed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectiveConflict);
    }

    #[test]
    fn test_movable_rejects_self_reference() {
        let mut mar = mar_from_edges(&[&[]]);
        let point = mar.suspension_points.push(SuspensionPoint {
            kind: SuspensionKind::Await,
            expr: parse_quote!(fut),
            span: Span::call_site(),
            in_loop: false,
            block: Some(START_BLOCK),
            resume: Some(START_BLOCK),
        });

        let captures = CaptureSet::from_points(vec![(
            point,
            vec![Capture {
                local: Local::new(1),
                ident: parse_quote!(r),
                kind: CaptureKind::Internal { root: Local::new(0) },
            }],
        )]);

        assert!(validate(Strategy::Pinned, &mar, &captures).is_ok());
        assert!(validate(Strategy::HeapIndirected(HeapHandle::Box), &mar, &captures).is_ok());

        let err = validate(Strategy::Movable, &mar, &captures).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CaptureValidation);
        assert_eq!(
            err.to_string(),
            "movable strategy incompatible with captured self-reference `r` at suspension point 0"
        );
    }

    #[test]
    fn test_movable_rejects_derived_value() {
        let mut mar = mar_from_edges(&[&[]]);
        let point = mar.suspension_points.push(SuspensionPoint {
            kind: SuspensionKind::Await,
            expr: parse_quote!(fut),
            span: Span::call_site(),
            in_loop: false,
            block: Some(START_BLOCK),
            resume: Some(START_BLOCK),
        });
        let owner = mar
            .local_decls
            .push(LocalDecl::new(parse_quote!(v), Mutability::Not, LocalKind::Param));
        let mut slice = LocalDecl::new(parse_quote!(s), Mutability::Not, LocalKind::Var);
        slice.derived_from = Some(owner);
        let slice = mar.local_decls.push(slice);

        let captures = CaptureSet::from_points(vec![(
            point,
            vec![Capture {
                local: slice,
                ident: parse_quote!(s),
                kind: CaptureKind::ByValue,
            }],
        )]);

        assert!(validate(Strategy::Pinned, &mar, &captures).is_ok());
        let err = validate(Strategy::Movable, &mar, &captures).unwrap_err();
        assert!(matches!(err, Error::MovableSelfReference { ref binding, .. } if binding == "s"));
    }
}
