//! Recovers the requested capability, implied strategy and lifetime set from
//! a declared return type.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use proc_macro2::Span;
use quote::ToTokens;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{
    AngleBracketedGenericArguments, GenericArgument, Ident, Lifetime, PathArguments, ReturnType,
    Type, TypeParamBound,
};

use crate::error::{Error, Result};

/// Aliases are resolved through at most this many indirections.
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityKind {
    SingleResult,
    Sequence,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CapabilityKind::SingleResult => write!(f, "future"),
            CapabilityKind::Sequence => write!(f, "stream"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Capability {
    SingleResult { ok: Type, err: Option<Type> },
    Sequence { item: Type, err: Option<Type> },
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::SingleResult { .. } => CapabilityKind::SingleResult,
            Capability::Sequence { .. } => CapabilityKind::Sequence,
        }
    }

    pub fn err_type(&self) -> Option<&Type> {
        match self {
            Capability::SingleResult { err, .. } | Capability::Sequence { err, .. } => err.as_ref(),
        }
    }
}

/// How a heap-indirected handle is produced from the state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapHandle {
    /// `Pin<Box<dyn ..>>` and the `Box*Future` / `Box*Stream` aliases.
    PinnedBox,
    /// `Box<dyn ..>`.
    Box,
}

/// The lifetimes named by the declared return type. `'static` is always a
/// member.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifetimeSet {
    lifetimes: BTreeSet<String>,
}

impl LifetimeSet {
    pub fn from_type(ty: &Type) -> Self {
        struct Collect<'a>(&'a mut BTreeSet<String>);

        impl<'a, 'ast> Visit<'ast> for Collect<'a> {
            fn visit_lifetime(&mut self, lifetime: &'ast Lifetime) {
                self.0.insert(lifetime.ident.to_string());
            }

            fn visit_type_reference(&mut self, ty: &'ast syn::TypeReference) {
                if ty.lifetime.is_none() {
                    self.0.insert("_".to_string());
                }
                visit::visit_type_reference(self, ty);
            }
        }

        let mut lifetimes = BTreeSet::new();
        lifetimes.insert("static".to_string());
        Collect(&mut lifetimes).visit_type(ty);

        LifetimeSet { lifetimes }
    }

    pub fn contains(&self, lifetime: &str) -> bool {
        self.lifetimes.contains(lifetime.trim_start_matches('\''))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lifetimes.iter().map(String::as_str)
    }
}

/// Named aliases whose definitions live elsewhere, keyed by the alias name.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    aliases: BTreeMap<String, Type>,
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable::default()
    }

    pub fn insert(&mut self, name: &Ident, bound: Type) {
        self.aliases.insert(name.to_string(), bound);
    }

    pub fn get(&self, name: &Ident) -> Option<&Type> {
        self.aliases.get(&name.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct SignatureInfo {
    pub capability: Capability,
    /// `Result<T, E>` as produced by every resume that completes or yields.
    pub output: Type,
    pub heap: Option<HeapHandle>,
    pub lifetimes: LifetimeSet,
    pub span: Span,
}

/// Analyzes the declared return type. `bound` is the definition of the
/// return type when it is a named alias not present in `aliases`.
pub fn analyze(
    output: &ReturnType,
    aliases: &AliasTable,
    bound: Option<&Type>,
) -> Result<SignatureInfo> {
    let ty = match output {
        ReturnType::Type(_, ty) => &**ty,
        ReturnType::Default => {
            return Err(Error::UnrecognizedReturnType {
                span: output.span(),
            });
        }
    };

    let analyzer = Analyzer { aliases, bound };
    let (capability, result, heap) = analyzer.recognize(ty, 0)?;

    let info = SignatureInfo {
        capability,
        output: result,
        heap,
        lifetimes: LifetimeSet::from_type(ty),
        span: ty.span(),
    };

    debug!(
        "signature: capability={} heap={:?} lifetimes={:?}",
        info.capability.kind(),
        info.heap,
        info.lifetimes.iter().collect::<Vec<_>>()
    );

    Ok(info)
}

struct Analyzer<'a> {
    aliases: &'a AliasTable,
    bound: Option<&'a Type>,
}

impl<'a> Analyzer<'a> {
    fn recognize(&self, ty: &Type, depth: usize) -> Result<(Capability, Type, Option<HeapHandle>)> {
        let unrecognized = || Error::UnrecognizedReturnType { span: ty.span() };

        match ty {
            Type::Paren(paren) => self.recognize(&paren.elem, depth),
            Type::Group(group) => self.recognize(&group.elem, depth),
            Type::ImplTrait(impl_trait) => {
                let (capability, result) = self.from_bounds(impl_trait.bounds.iter(), ty.span())?;
                Ok((capability, result, None))
            }
            Type::Path(path) if path.qself.is_none() => {
                let segment = path.path.segments.last().ok_or_else(unrecognized)?;
                let args = angle_args(&segment.arguments);

                match segment.ident.to_string().as_str() {
                    "Pin" => {
                        let pointee = first_type_arg(args).ok_or_else(unrecognized)?;
                        match self.boxed_trait_object(pointee)? {
                            Some((capability, result)) => {
                                Ok((capability, result, Some(HeapHandle::PinnedBox)))
                            }
                            None => Err(unrecognized()),
                        }
                    }
                    "Box" => match self.boxed_trait_object(ty)? {
                        Some((capability, result)) => Ok((capability, result, Some(HeapHandle::Box))),
                        None => Err(unrecognized()),
                    },
                    "BoxFuture" | "LocalBoxFuture" => {
                        let result = first_type_arg(args).ok_or_else(unrecognized)?;
                        let capability = single_result(result)?;
                        Ok((capability, result.clone(), Some(HeapHandle::PinnedBox)))
                    }
                    "BoxStream" | "LocalBoxStream" => {
                        let result = first_type_arg(args).ok_or_else(unrecognized)?;
                        let capability = sequence(result)?;
                        Ok((capability, result.clone(), Some(HeapHandle::PinnedBox)))
                    }
                    _ => {
                        if depth >= MAX_ALIAS_DEPTH {
                            return Err(unrecognized());
                        }

                        let target = self
                            .aliases
                            .get(&segment.ident)
                            .or(if depth == 0 { self.bound } else { None })
                            .ok_or_else(unrecognized)?;

                        debug!("signature: resolving alias `{}`", segment.ident);

                        self.recognize(target, depth + 1)
                    }
                }
            }
            _ => Err(unrecognized()),
        }
    }

    /// `Box<dyn Trait>`, returning `None` for any other type.
    fn boxed_trait_object(&self, ty: &Type) -> Result<Option<(Capability, Type)>> {
        let path = match ty {
            Type::Path(path) if path.qself.is_none() => path,
            _ => return Ok(None),
        };
        let segment = match path.path.segments.last() {
            Some(segment) if segment.ident == "Box" => segment,
            _ => return Ok(None),
        };

        match first_type_arg(angle_args(&segment.arguments)) {
            Some(Type::TraitObject(object)) => {
                self.from_bounds(object.bounds.iter(), object.span()).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn from_bounds<'b, I>(&self, bounds: I, span: Span) -> Result<(Capability, Type)>
    where
        I: Iterator<Item = &'b TypeParamBound>,
    {
        let mut found = None;

        for bound in bounds {
            let trait_bound = match bound {
                TypeParamBound::Trait(trait_bound) => trait_bound,
                _ => continue,
            };
            let segment = match trait_bound.path.segments.last() {
                Some(segment) => segment,
                None => continue,
            };
            let args = angle_args(&segment.arguments);

            let recognized = match segment.ident.to_string().as_str() {
                "Future" => {
                    let result = assoc_type(args, "Output")
                        .ok_or(Error::UnrecognizedReturnType { span: segment.span() })?;
                    Some((single_result(result)?, result.clone()))
                }
                "Stream" => {
                    let result = assoc_type(args, "Item")
                        .ok_or(Error::UnrecognizedReturnType { span: segment.span() })?;
                    Some((sequence(result)?, result.clone()))
                }
                "TryFuture" => {
                    let (ok, err) = try_pair(args, segment.span())?;
                    let result: Type = syn::parse_quote!(::core::result::Result<#ok, #err>);
                    Some((
                        Capability::SingleResult {
                            ok: ok.clone(),
                            err: Some(err.clone()),
                        },
                        result,
                    ))
                }
                "TryStream" => {
                    let (ok, err) = try_pair(args, segment.span())?;
                    let result: Type = syn::parse_quote!(::core::result::Result<#ok, #err>);
                    Some((
                        Capability::Sequence {
                            item: ok.clone(),
                            err: Some(err.clone()),
                        },
                        result,
                    ))
                }
                _ => None,
            };

            if let Some(recognized) = recognized {
                if found.is_some() {
                    // Both a future and a stream: no single capability.
                    return Err(Error::UnrecognizedReturnType { span });
                }
                found = Some(recognized);
            }
        }

        found.ok_or(Error::UnrecognizedReturnType { span })
    }
}

fn angle_args(arguments: &PathArguments) -> Option<&AngleBracketedGenericArguments> {
    match arguments {
        PathArguments::AngleBracketed(args) => Some(args),
        _ => None,
    }
}

fn first_type_arg(args: Option<&AngleBracketedGenericArguments>) -> Option<&Type> {
    args?.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn assoc_type<'a>(args: Option<&'a AngleBracketedGenericArguments>, name: &str) -> Option<&'a Type> {
    args?.args.iter().find_map(|arg| match arg {
        GenericArgument::AssocType(assoc) if assoc.ident == name => Some(&assoc.ty),
        _ => None,
    })
}

fn try_pair(args: Option<&AngleBracketedGenericArguments>, span: Span) -> Result<(&Type, &Type)> {
    match (assoc_type(args, "Ok"), assoc_type(args, "Error")) {
        (Some(ok), Some(err)) => Ok((ok, err)),
        _ => Err(Error::UnrecognizedReturnType { span }),
    }
}

/// Splits `Result<T, E>` (any path ending in `Result`) into its arguments.
fn result_parts(ty: &Type) -> Option<(Type, Option<Type>)> {
    let ty = match ty {
        Type::Paren(paren) => &*paren.elem,
        Type::Group(group) => &*group.elem,
        ty => ty,
    };
    let path = match ty {
        Type::Path(path) if path.qself.is_none() => path,
        _ => return None,
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }

    let mut types = angle_args(&segment.arguments)?
        .args
        .iter()
        .filter_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty.clone()),
            _ => None,
        });

    let ok = types.next()?;
    let err = types.next();
    Some((ok, err))
}

fn single_result(result: &Type) -> Result<Capability> {
    match result_parts(result) {
        Some((ok, err)) => Ok(Capability::SingleResult { ok, err }),
        None => Err(Error::NotAResult {
            span: result.span(),
            capability: "future",
            found: result.to_token_stream().to_string(),
        }),
    }
}

fn sequence(result: &Type) -> Result<Capability> {
    match result_parts(result) {
        Some((item, err)) => Ok(Capability::Sequence { item, err }),
        None => Err(Error::NotAResult {
            span: result.span(),
            capability: "stream",
            found: result.to_token_stream().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use syn::parse_quote;

    fn analyze_ty(ty: Type) -> Result<SignatureInfo> {
        let output: ReturnType = parse_quote!(-> #ty);
        analyze(&output, &AliasTable::new(), None)
    }

    #[test]
    fn test_future() {
        let info = analyze_ty(parse_quote!(impl Future<Output = Result<String, io::Error>>)).unwrap();
        assert_eq!(
            info.capability,
            Capability::SingleResult {
                ok: parse_quote!(String),
                err: Some(parse_quote!(io::Error)),
            }
        );
        assert_eq!(info.heap, None);
        assert_eq!(info.output, parse_quote!(Result<String, io::Error>));
    }

    #[test]
    fn test_qualified_paths() {
        let info = analyze_ty(parse_quote!(
            impl ::core::future::Future<Output = ::std::result::Result<u8, ()>> + Send + 'a
        ))
        .unwrap();
        assert_eq!(info.capability.kind(), CapabilityKind::SingleResult);
        assert!(info.lifetimes.contains("'a"));
        assert!(info.lifetimes.contains("'static"));
        assert!(!info.lifetimes.contains("'b"));

        let info = analyze_ty(parse_quote!(impl futures::stream::Stream<Item = io::Result<u32>>)).unwrap();
        assert_eq!(
            info.capability,
            Capability::Sequence {
                item: parse_quote!(u32),
                err: None,
            }
        );
    }

    #[test]
    fn test_try_traits() {
        let info = analyze_ty(parse_quote!(impl TryStream<Ok = u32, Error = String>)).unwrap();
        assert_eq!(
            info.capability,
            Capability::Sequence {
                item: parse_quote!(u32),
                err: Some(parse_quote!(String)),
            }
        );

        let info = analyze_ty(parse_quote!(impl TryFuture<Ok = (), Error = E>)).unwrap();
        assert_eq!(info.capability.kind(), CapabilityKind::SingleResult);
        assert_eq!(info.output, parse_quote!(::core::result::Result<(), E>));
    }

    #[test]
    fn test_heap_indirected() {
        let info = analyze_ty(parse_quote!(
            Pin<Box<dyn Future<Output = Result<u8, String>> + Send + 'a>>
        ))
        .unwrap();
        assert_eq!(info.heap, Some(HeapHandle::PinnedBox));
        assert!(info.lifetimes.contains("'a"));

        let info = analyze_ty(parse_quote!(Box<dyn Stream<Item = Result<u8, String>> + Unpin>)).unwrap();
        assert_eq!(info.heap, Some(HeapHandle::Box));
        assert_eq!(info.capability.kind(), CapabilityKind::Sequence);

        let info = analyze_ty(parse_quote!(BoxFuture<'static, Result<(), ()>>)).unwrap();
        assert_eq!(info.heap, Some(HeapHandle::PinnedBox));
        assert_eq!(info.capability.kind(), CapabilityKind::SingleResult);

        let info = analyze_ty(parse_quote!(LocalBoxStream<'a, Result<i32, String>>)).unwrap();
        assert_eq!(info.capability.kind(), CapabilityKind::Sequence);
    }

    #[test]
    fn test_alias() {
        let output: ReturnType = parse_quote!(-> Fetch<'a>);
        let mut aliases = AliasTable::new();
        aliases.insert(
            &parse_quote!(Fetch),
            parse_quote!(Pin<Box<dyn Future<Output = Result<Vec<u8>, String>> + 'a>>),
        );
        let info = analyze(&output, &aliases, None).unwrap();
        assert_eq!(info.heap, Some(HeapHandle::PinnedBox));
        assert!(info.lifetimes.contains("'a"));

        let bound: Type = parse_quote!(impl Stream<Item = Result<u8, ()>>);
        let info = analyze(&output, &AliasTable::new(), Some(&bound)).unwrap();
        assert_eq!(info.capability.kind(), CapabilityKind::Sequence);

        let err = analyze(&output, &AliasTable::new(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature);
    }

    #[test]
    fn test_self_alias_terminates() {
        let output: ReturnType = parse_quote!(-> Loop);
        let mut aliases = AliasTable::new();
        aliases.insert(&parse_quote!(Loop), parse_quote!(Loop));
        let err = analyze(&output, &aliases, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature);
    }

    #[test]
    fn test_rejections() {
        for ty in [
            parse_quote!(u32),
            parse_quote!(impl Iterator<Item = u32>),
            parse_quote!(impl Future),
            parse_quote!(impl Future<Output = Result<u8, ()>> + Stream<Item = Result<u8, ()>>),
            parse_quote!(Box<u32>),
        ] {
            let err = analyze_ty(ty).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Signature);
        }

        let err = analyze_ty(parse_quote!(impl Future<Output = u32>)).unwrap_err();
        assert!(matches!(err, Error::NotAResult { .. }));

        let output: ReturnType = parse_quote!();
        let err = analyze(&output, &AliasTable::new(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature);
    }

    #[test]
    fn test_elided_reference_lifetime() {
        let info = analyze_ty(parse_quote!(impl Future<Output = Result<&str, ()>>)).unwrap();
        assert!(info.lifetimes.contains("'_"));
    }
}
