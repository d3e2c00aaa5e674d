//! Emits the state machine for a lowered function.
//!
//! The body becomes three items and an expression. `__StatefulState` is an
//! enum with one variant per block and per suspension point, each carrying
//! the locals stored across it. `__StatefulMachine` owns the current state
//! and a resume closure, and implements `Future` or `Stream`. The closure
//! takes the state out, runs blocks until the machine suspends or completes,
//! and leaves the next state behind.

use proc_macro2::{Span, TokenStream};
use quote::quote_spanned;
use syn::visit_mut::VisitMut;
use syn::{Expr, FnArg, Ident, ItemEnum, ItemFn, Lifetime, Pat};

use crate::error::Result;
use crate::mar::analysis::{CaptureSet, Initialization, Liveness};
use crate::mar::repr::*;
use crate::mar::traversal::reverse_postorder;
use crate::signature::{CapabilityKind, HeapHandle, SignatureInfo};
use crate::strategy::Strategy;

use self::rename::SelfRenamer;
use self::shortcut::ShortcutRewriter;

pub use self::state::{BlockLayout, StateLayout, STATE_ENUM};

mod block;
mod rename;
mod shortcut;
mod state;
mod stmt;

const MACHINE: &str = "__StatefulMachine";

pub struct Translation {
    pub item: ItemFn,
    pub state: ItemEnum,
}

pub struct Builder<'a> {
    mar: &'a Mar,
    layout: StateLayout,
    strategy: Strategy,
}

impl<'a> Builder<'a> {
    fn rewriter(&self) -> ShortcutRewriter {
        ShortcutRewriter::new(self.mar.capability)
    }
}

pub fn translate(
    item: &ItemFn,
    mar: &Mar,
    signature: &SignatureInfo,
    strategy: Strategy,
    liveness: &Liveness,
    init: &Initialization,
    captures: &CaptureSet,
) -> Result<Translation> {
    let span = mar.span;
    let order = reverse_postorder(mar);
    let layout = StateLayout::compute(mar, &order, liveness, init, captures);
    let state = layout.state_enum(mar, span);

    let builder = Builder { mar, layout, strategy };

    let mut arms = vec![];
    for &bb in &order {
        arms.extend(builder.block_arms(bb)?);
    }
    arms.push(builder.done_arm(span));

    let state_enum = Ident::new(STATE_ENUM, span);
    let state_var = state_param(span);
    let cx = cx_param(span);
    let label = resume_label(span);

    let mut resume: Expr = syn::parse_quote_spanned! {span=>
        |#state_var, #cx| #label: loop {
            match ::core::mem::replace(#state_var, #state_enum::Done) {
                #(#arms)*
            }
        }
    };
    SelfRenamer.visit_expr_mut(&mut resume);

    let mut item = item.clone();
    let args = start_args(&mut item);
    let start = state::state_id(mar, START_BLOCK);

    let machine = Ident::new(MACHINE, span);
    let machine_items = machine_items(span, mar.capability, strategy);
    let output = &signature.output;
    let items = &mar.items;

    let construct = quote_spanned! {span=>
        #machine::<_, _, #output>::new(#state_enum::#start(#(#args),*), #resume)
    };
    let value = match strategy {
        Strategy::Movable | Strategy::Pinned => quote_spanned!(span=> __stateful_machine),
        Strategy::HeapIndirected(HeapHandle::PinnedBox) => {
            quote_spanned!(span=> ::std::boxed::Box::pin(__stateful_machine))
        }
        Strategy::HeapIndirected(HeapHandle::Box) => {
            quote_spanned!(span=> ::std::boxed::Box::new(__stateful_machine))
        }
    };

    item.block = Box::new(syn::parse_quote_spanned! {span=>
        {
            #(#items)*

            #state

            #machine_items

            #[allow(unused_mut, unused_variables, unused_assignments, unreachable_code, unused_labels)]
            let __stateful_machine = #construct;
            #value
        }
    });

    debug!(
        "translate: {} arms, {} state variants",
        arms.len(),
        state.variants.len()
    );

    Ok(Translation { item, state })
}

/// The values the start variant is built from. Pattern parameters are
/// renamed to their holders and `mut` is dropped from the rest, since the
/// resume function binds them again.
fn start_args(item: &mut ItemFn) -> Vec<TokenStream> {
    let mut args = vec![];

    for (index, input) in item.sig.inputs.iter_mut().enumerate() {
        match input {
            FnArg::Receiver(receiver) => {
                let self_token = receiver.self_token;
                args.push(quote::quote!(#self_token));
            }
            FnArg::Typed(pat_type) => match &mut *pat_type.pat {
                Pat::Ident(pat_ident) if pat_ident.subpat.is_none() && pat_ident.by_ref.is_none() => {
                    pat_ident.mutability = None;
                    let ident = &pat_ident.ident;
                    args.push(quote::quote!(#ident));
                }
                pat => {
                    let holder = Ident::new(&format!("__stateful_arg{}", index), Span::call_site());
                    *pat = syn::parse_quote!(#holder);
                    args.push(quote::quote!(#holder));
                }
            },
        }
    }

    args
}

/// The type driving the resume function, and its trait impls.
fn machine_items(span: Span, capability: CapabilityKind, strategy: Strategy) -> TokenStream {
    let machine = Ident::new(MACHINE, span);

    let pinned = matches!(strategy, Strategy::Pinned | Strategy::HeapIndirected(HeapHandle::PinnedBox));

    let (pinned_field, pinned_init, project, unpin) = if pinned {
        (
            quote_spanned!(span=> _pinned: ::core::marker::PhantomPinned,),
            quote_spanned!(span=> _pinned: ::core::marker::PhantomPinned,),
            quote_spanned! {span=>
                // SAFETY: the state holds nothing whose address matters.
                // Pending futures are boxed and borrows of stored locals are
                // taken again on every resume.
                let this = unsafe { ::core::pin::Pin::get_unchecked_mut(self) };
            },
            TokenStream::new(),
        )
    } else {
        (
            TokenStream::new(),
            TokenStream::new(),
            quote_spanned!(span=> let this = ::core::pin::Pin::get_mut(self);),
            quote_spanned!(span=> impl<S, F, O> ::core::marker::Unpin for #machine<S, F, O> {}),
        )
    };

    let (poll_output, driver) = match capability {
        CapabilityKind::SingleResult => {
            let poll_output = quote_spanned!(span=> ::core::task::Poll<O>);
            let driver = quote_spanned! {span=>
                impl<S, F, O> ::core::future::Future for #machine<S, F, O>
                where
                    F: ::core::ops::FnMut(&mut S, &mut ::core::task::Context<'_>) -> #poll_output,
                {
                    type Output = O;

                    fn poll(
                        self: ::core::pin::Pin<&mut Self>,
                        cx: &mut ::core::task::Context<'_>,
                    ) -> #poll_output {
                        #project
                        (this.resume)(&mut this.state, cx)
                    }
                }
            };
            (poll_output, driver)
        }
        CapabilityKind::Sequence => {
            let poll_output = quote_spanned!(span=> ::core::task::Poll<::core::option::Option<O>>);
            let driver = quote_spanned! {span=>
                impl<S, F, O> ::futures::stream::Stream for #machine<S, F, O>
                where
                    F: ::core::ops::FnMut(&mut S, &mut ::core::task::Context<'_>) -> #poll_output,
                {
                    type Item = O;

                    fn poll_next(
                        self: ::core::pin::Pin<&mut Self>,
                        cx: &mut ::core::task::Context<'_>,
                    ) -> #poll_output {
                        #project
                        (this.resume)(&mut this.state, cx)
                    }
                }
            };
            (poll_output, driver)
        }
    };

    quote_spanned! {span=>
        struct #machine<S, F, O> {
            state: S,
            resume: F,
            _marker: ::core::marker::PhantomData<fn() -> O>,
            #pinned_field
        }

        impl<S, F, O> #machine<S, F, O>
        where
            F: ::core::ops::FnMut(&mut S, &mut ::core::task::Context<'_>) -> #poll_output,
        {
            fn new(state: S, resume: F) -> Self {
                #machine {
                    state,
                    resume,
                    _marker: ::core::marker::PhantomData,
                    #pinned_init
                }
            }
        }

        #unpin

        #driver
    }
}

pub(crate) fn state_param(span: Span) -> Ident {
    Ident::new("__state", span)
}

pub(crate) fn cx_param(span: Span) -> Ident {
    Ident::new("__cx", span)
}

pub(crate) fn resume_label(span: Span) -> Lifetime {
    Lifetime::new("'__stateful_resume", span)
}
