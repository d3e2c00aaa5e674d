use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::{Block, FnArg, Ident, ItemFn, Item, Pat, Stmt};

use crate::error::{Error, Result};
use crate::mar::extract::Extraction;
use crate::mar::indexed_vec::IndexVec;
use crate::mar::repr::*;
use crate::signature::CapabilityKind;

pub use self::simplify::simplify_body;

#[derive(Debug)]
pub struct CFG {
    basic_blocks: IndexVec<BasicBlock, BasicBlockData>,
    local_decls: IndexVec<Local, LocalDecl>,
}

pub struct Builder {
    capability: CapabilityKind,
    cfg: CFG,
    points: IndexVec<SuspensionId, SuspensionPoint>,
    scopes: Vec<scope::Scope>,
    loop_scopes: Vec<scope::LoopScope>,
    items: Vec<Item>,
}

/// Where the value of an expression goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Evaluated for its effects.
    Ignore,
    Local(Local),
    /// The value the function completes with.
    Return,
}

/// The block lowering continues in, paired with a value.
#[must_use]
pub struct BlockAnd<T>(BasicBlock, T);

pub trait BlockAndExtension {
    fn and<T>(self, v: T) -> BlockAnd<T>;
    fn unit(self) -> BlockAnd<()>;
}

impl BlockAndExtension for BasicBlock {
    fn and<T>(self, v: T) -> BlockAnd<T> {
        BlockAnd(self, v)
    }

    fn unit(self) -> BlockAnd<()> {
        BlockAnd(self, ())
    }
}

/// Update a block pointer and return the value.
/// Use it like `let x = unpack!(block = self.foo(block)?);`.
macro_rules! unpack {
    ($x:ident = $c:expr) => {{
        let BlockAnd(b, v) = $c;
        $x = b;
        v
    }};

    ($c:expr) => {{
        let BlockAnd(b, ()) = $c;
        b
    }};
}

///////////////////////////////////////////////////////////////////////////
// construct() -- the main entry point for building MAR for a function

pub fn construct(item: &ItemFn, capability: CapabilityKind, extraction: Extraction) -> Result<Mar> {
    let Extraction { body, points } = extraction;
    let body = simplify_body(body, capability);

    let mut builder = Builder {
        capability,
        cfg: CFG {
            basic_blocks: IndexVec::new(),
            local_decls: IndexVec::new(),
        },
        points,
        scopes: vec![],
        loop_scopes: vec![],
        items: vec![],
    };

    let span = item.span();

    builder.push_scope();

    // Register the arguments as declarations.
    let mut params = vec![];
    let mut pattern_params = vec![];

    for (index, input) in item.sig.inputs.iter().enumerate() {
        match input {
            FnArg::Receiver(receiver) => {
                let mutability = if receiver.mutability.is_some() {
                    Mutability::Mut
                } else {
                    Mutability::Not
                };
                let decl = LocalDecl::new(Ident::from(receiver.self_token), mutability, LocalKind::SelfParam)
                    .with_ty(Some((*receiver.ty).clone()));
                params.push(builder.declare(decl));
            }
            FnArg::Typed(pat_type) => match &*pat_type.pat {
                Pat::Ident(pat_ident) if pat_ident.subpat.is_none() && pat_ident.by_ref.is_none() => {
                    let mutability = if pat_ident.mutability.is_some() {
                        Mutability::Mut
                    } else {
                        Mutability::Not
                    };
                    let decl = LocalDecl::new(pat_ident.ident.clone(), mutability, LocalKind::Param)
                        .with_ty(Some((*pat_type.ty).clone()));
                    params.push(builder.declare(decl));
                }
                pat => {
                    let ident = Ident::new(&format!("__stateful_arg{}", index), pat.span());
                    let decl = LocalDecl::new(ident, Mutability::Not, LocalKind::Param)
                        .with_ty(Some((*pat_type.ty).clone()));
                    let holder = builder.declare(decl);
                    params.push(holder);
                    pattern_params.push((holder, pat.clone()));
                }
            },
        }
    }

    let start = builder.start_new_block(span, Some("Start"));
    assert_eq!(start, START_BLOCK);
    let mut block = START_BLOCK;

    for (holder, pat) in pattern_params {
        let init = builder.local_expr(holder);
        let decls = builder.declare_pat(&pat, None);
        builder.push_let(block, pat.span(), pat, None, Some(init), None, decls);
    }

    if builder.capability == CapabilityKind::Sequence && !has_tail(&body) {
        unpack!(block = builder.ast_block(Destination::Ignore, block, &body)?);
        let value = builder.operand(syn::parse_quote_spanned!(span=> ::core::result::Result::Ok(())));
        builder.terminate(span, block, TerminatorKind::Return { value });
        block = builder.start_new_block(span, Some("AfterReturn"));
    } else {
        unpack!(block = builder.ast_block(Destination::Return, block, &body)?);
    }

    // Everything returned above, so whatever block lowering ended in is
    // unreachable. Close it so the graph is well formed.
    let value = builder.operand(syn::parse_quote_spanned!(span=> ()));
    builder.terminate(span, block, TerminatorKind::Return { value });

    builder.pop_scope();

    let mut mar = Mar {
        span,
        ident: item.sig.ident.clone(),
        capability,
        params,
        local_decls: builder.cfg.local_decls,
        basic_blocks: builder.cfg.basic_blocks,
        suspension_points: builder.points,
        items: builder.items,
    };
    mar.relink_suspension_points();

    // No block has been dropped yet, so every point must have a terminator.
    if let Some((id, point)) = mar
        .suspension_points
        .iter_enumerated()
        .find(|(_, point)| point.block.is_none())
    {
        return Err(Error::internal(
            point.span,
            format!("suspension point {} was not lowered", id),
        ));
    }

    debug!(
        "construct: {} blocks, {} locals",
        mar.basic_blocks.len(),
        mar.local_decls.len()
    );

    Ok(mar)
}

/// Whether the body ends in an expression that produces its value.
fn has_tail(body: &Block) -> bool {
    matches!(body.stmts.last(), Some(Stmt::Expr(_, None)))
        || matches!(body.stmts.last(), Some(Stmt::Macro(mac)) if mac.semi_token.is_none())
}

impl Builder {
    pub fn start_new_block(&mut self, span: Span, name: Option<&'static str>) -> BasicBlock {
        let scope = self.visible_locals();
        self.cfg.start_new_block(span, name, scope)
    }

    pub fn is_inside_loop(&self) -> bool {
        !self.loop_scopes.is_empty()
    }
}

///////////////////////////////////////////////////////////////////////////
// Builder methods are broken up into modules, depending on what kind
// of thing is being translated.

mod block;
mod borrow;
mod cfg;
mod expr;
mod matches;
mod scope;
mod simplify;
mod stmt;
mod suspend;
mod transition;
mod uses;

pub use self::uses::pat_bindings;
