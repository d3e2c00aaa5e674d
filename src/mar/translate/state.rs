//! The layout of the state enum: which locals each variant carries.

use proc_macro2::Span;
use quote::format_ident;
use syn::{Ident, ItemEnum};

use crate::mar::analysis::{locals_of, CaptureSet, Initialization, Liveness, LocalSet};
use crate::mar::indexed_vec::IndexVec;
use crate::mar::repr::*;

/// Fields of the variant that resumes a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockLayout {
    /// Stored locals, in index order.
    pub fields: Vec<Local>,
    /// Borrows of stored locals taken again on entry, in declaration order.
    pub rederive: Vec<Local>,
}

#[derive(Debug)]
pub struct StateLayout {
    blocks: IndexVec<BasicBlock, Option<BlockLayout>>,
    /// Stored locals of each suspended variant, after its pending future.
    points: Vec<(SuspensionId, SuspensionKind, Vec<Local>)>,
}

impl StateLayout {
    pub fn compute(
        mar: &Mar,
        order: &[BasicBlock],
        liveness: &Liveness,
        init: &Initialization,
        captures: &CaptureSet,
    ) -> Self {
        let mut blocks = IndexVec::from_raw(vec![None; mar.basic_blocks.len()]);

        for &bb in order {
            let layout = if bb == START_BLOCK {
                BlockLayout {
                    fields: mar.params.clone(),
                    rederive: vec![],
                }
            } else {
                let mut entry: LocalSet = liveness.live_in[bb].clone();
                entry.intersect(&init.init_in[bb]);
                split(mar, locals_of(&entry))
            };

            debug!("layout: {:?} stores {:?}, rederives {:?}", bb, layout.fields, layout.rederive);

            blocks[bb] = Some(layout);
        }

        let points = captures
            .iter()
            .map(|(id, point_captures)| {
                let kind = mar.suspension_point(id).kind;
                let locals = point_captures.iter().map(|capture| capture.local).collect();
                (id, kind, split(mar, locals).fields)
            })
            .collect();

        StateLayout { blocks, points }
    }

    pub fn block(&self, bb: BasicBlock) -> Option<&BlockLayout> {
        self.blocks[bb].as_ref()
    }

    pub fn point(&self, id: SuspensionId) -> &[Local] {
        self.points
            .iter()
            .find(|(point, _, _)| *point == id)
            .map(|(_, _, fields)| fields.as_slice())
            .unwrap_or(&[])
    }

    /// Every local carried by some variant, in index order.
    pub fn stored_locals(&self) -> Vec<Local> {
        let mut locals: Vec<Local> = self
            .blocks
            .iter()
            .flatten()
            .flat_map(|layout| layout.fields.iter().cloned())
            .chain(self.points.iter().flat_map(|(_, _, fields)| fields.iter().cloned()))
            .collect();
        locals.sort();
        locals.dedup();
        locals
    }

    /// The state enum. Every field is generic, so the enum can live inside
    /// the function body and still hold values of types only inference
    /// knows.
    pub fn state_enum(&self, mar: &Mar, span: Span) -> ItemEnum {
        let mut params: Vec<Ident> = self.stored_locals().into_iter().map(local_param).collect();

        let mut variants = vec![];

        for (bb, layout) in self.blocks.iter_enumerated() {
            if let Some(layout) = layout {
                let ident = state_id(mar, bb);
                let fields = layout.fields.iter().cloned().map(local_param);
                variants.push(quote::quote_spanned!(span=> #ident(#(#fields),*)));
            }
        }

        for (id, kind, fields) in &self.points {
            let ident = suspend_id(*id, *kind);
            let fields = fields.iter().cloned().map(local_param);
            match kind {
                SuspensionKind::Await => {
                    let future = future_param(*id);
                    params.push(future.clone());
                    variants.push(quote::quote_spanned!(span=> #ident(#future, #(#fields),*)));
                }
                SuspensionKind::Yield => {
                    variants.push(quote::quote_spanned!(span=> #ident(#(#fields),*)));
                }
            }
        }

        let ident = Ident::new(STATE_ENUM, span);
        let generics = if params.is_empty() {
            quote::quote!()
        } else {
            quote::quote!(<#(#params),*>)
        };

        syn::parse_quote_spanned! {span=>
            #[allow(non_camel_case_types, dead_code)]
            enum #ident #generics {
                #(#variants,)*
                Done,
            }
        }
    }
}

pub const STATE_ENUM: &str = "__StatefulState";

/// The variant a block resumes from.
pub fn state_id(mar: &Mar, bb: BasicBlock) -> Ident {
    match mar[bb].name {
        Some(name) => format_ident!("State{}{}", bb.index(), name),
        None => format_ident!("State{}", bb.index()),
    }
}

/// The variant a machine suspended at `id` is in.
pub fn suspend_id(id: SuspensionId, kind: SuspensionKind) -> Ident {
    match kind {
        SuspensionKind::Await => format_ident!("Await{}", id.index()),
        SuspensionKind::Yield => format_ident!("Yield{}", id.index()),
    }
}

fn local_param(local: Local) -> Ident {
    format_ident!("L{}", local.index())
}

fn future_param(id: SuspensionId) -> Ident {
    format_ident!("F{}", id.index())
}

/// Splits the locals a variant must keep into the ones it stores and the
/// borrows of frame locals it takes again instead. A borrow's dependencies
/// are stored in its place.
fn split(mar: &Mar, locals: Vec<Local>) -> BlockLayout {
    let mut layout = BlockLayout::default();

    for local in locals {
        layout.add(mar, local);
        if let Some(borrow) = &mar.local_decl_data(local).borrow {
            if borrow.origin == BorrowOrigin::Internal {
                for &dep in &borrow.deps {
                    layout.add(mar, dep);
                }
            }
        }
    }

    layout.fields.sort();
    layout.rederive.sort();
    layout
}

impl BlockLayout {
    fn add(&mut self, mar: &Mar, local: Local) {
        let list = if is_internal_borrow(mar.local_decl_data(local)) {
            &mut self.rederive
        } else {
            &mut self.fields
        };
        if !list.contains(&local) {
            list.push(local);
        }
    }
}

pub fn is_internal_borrow(decl: &LocalDecl) -> bool {
    matches!(
        decl.borrow,
        Some(Borrow {
            origin: BorrowOrigin::Internal,
            ..
        })
    )
}

/// Whether `local` is among `fields`.
pub fn is_stored(layout: &BlockLayout, local: Local) -> bool {
    layout.fields.contains(&local)
}
