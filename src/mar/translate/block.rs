use std::collections::HashMap;

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote_spanned};
use syn::ext::IdentExt;
use syn::Ident;

use crate::error::{Error, Result};
use crate::mar::repr::*;
use crate::mar::translate::rename::{BindingRenamer, SELF_NAME};
use crate::mar::translate::state::{is_stored, state_id, suspend_id, BlockLayout};
use crate::mar::translate::{cx_param, resume_label, state_param, Builder, STATE_ENUM};
use crate::signature::CapabilityKind;
use crate::strategy::Strategy;

/// The names locals go by at some point of a block.
pub struct Names<'m> {
    mar: &'m Mar,
    names: HashMap<Local, Ident>,
    /// Locals declared after entry, in order.
    declared: Vec<Local>,
}

impl<'m> Names<'m> {
    /// On entry every local in scope is bound. One hidden by a later
    /// declaration of the same name gets a name of its own.
    pub fn entry(mar: &'m Mar, bb: BasicBlock) -> Self {
        let scope = &mar[bb].scope;
        let mut names = HashMap::new();

        for (index, &local) in scope.iter().enumerate() {
            let ident = &mar.local_decl_data(local).ident;
            let hidden = scope[index + 1..]
                .iter()
                .any(|&later| mar.local_decl_data(later).ident == *ident);

            let name = if hidden {
                format_ident!("__stateful_{}_{}", ident.unraw(), local.index(), span = ident.span())
            } else {
                plain_name(mar.local_decl_data(local))
            };
            names.insert(local, name);
        }

        Names {
            mar,
            names,
            declared: vec![],
        }
    }

    /// Names a set of stored locals by index, for the arms of suspended
    /// variants where no user code runs.
    pub fn captured(mar: &'m Mar, locals: &[Local]) -> Self {
        let names = locals
            .iter()
            .map(|&local| (local, format_ident!("__stateful_cap{}", local.index())))
            .collect();

        Names {
            mar,
            names,
            declared: vec![],
        }
    }

    pub fn declare(&mut self, local: Local) {
        let name = plain_name(self.mar.local_decl_data(local));
        self.names.insert(local, name);
        self.declared.push(local);
    }

    pub fn get(&self, local: Local) -> Option<&Ident> {
        self.names.get(&local)
    }

    /// Whether the name `local` goes by was taken over by a later
    /// declaration in the block.
    fn is_shadowed(&self, local: Local) -> bool {
        if self.declared.contains(&local) {
            return false;
        }
        match self.names.get(&local) {
            Some(name) => self
                .declared
                .iter()
                .any(|declared| self.names.get(declared) == Some(name)),
            None => false,
        }
    }
}

fn plain_name(decl: &LocalDecl) -> Ident {
    if decl.kind == LocalKind::SelfParam {
        Ident::new(SELF_NAME, decl.ident.span())
    } else {
        decl.ident.clone()
    }
}

impl<'a> Builder<'a> {
    /// The arm resuming `bb`, followed by the arm of the suspended variant
    /// it ends in, if any.
    pub fn block_arms(&self, bb: BasicBlock) -> Result<Vec<TokenStream>> {
        let layout = match self.layout.block(bb) {
            Some(layout) => layout,
            None => return Ok(vec![]),
        };
        let data = &self.mar[bb];
        let span = data.span;

        debug!("block_arms: {:?} {:?}", bb, data.name);

        let mut names = Names::entry(self.mar, bb);
        let variant = state_id(self.mar, bb);
        let fields = layout
            .fields
            .iter()
            .map(|&local| self.binding(&names, local))
            .collect::<Result<Vec<_>>>()?;

        let mut body = self.entry(bb, layout, &names)?;

        for statement in &data.statements {
            body.extend(self.stmt(bb, statement, &mut names)?);
        }

        let terminator = data.terminator();
        body.extend(self.terminator(bb, terminator, &names)?);

        let state_enum = Ident::new(STATE_ENUM, span);
        let mut arms = vec![quote_spanned! {span=>
            #state_enum::#variant(#(#fields),*) => {
                #(#body)*
            }
        }];

        match &terminator.kind {
            TerminatorKind::Await {
                point,
                destination,
                target,
                ..
            } => arms.push(self.await_arm(*point, *destination, *target)?),
            TerminatorKind::Yield { point, target, .. } => arms.push(self.yield_arm(*point, *target)?),
            _ => {}
        }

        Ok(arms)
    }

    /// `mut x` or `x`, as the pattern binding a stored local.
    fn binding(&self, names: &Names, local: Local) -> Result<TokenStream> {
        let decl = self.mar.local_decl_data(local);
        let name = names
            .get(local)
            .ok_or_else(|| Error::internal(decl.span, format!("`{}` is stored but not in scope", decl.ident)))?;

        Ok(if decl.mutability.is_mut() {
            quote_spanned!(decl.span=> mut #name)
        } else {
            quote_spanned!(decl.span=> #name)
        })
    }

    /// Takes borrows of stored locals again, then declares the locals in
    /// scope that the block initializes.
    fn entry(&self, bb: BasicBlock, layout: &BlockLayout, names: &Names) -> Result<Vec<TokenStream>> {
        let mut stmts = vec![];

        for &local in &layout.rederive {
            let decl = self.mar.local_decl_data(local);
            let borrow = match &decl.borrow {
                Some(borrow) => borrow,
                None => continue,
            };
            let name = names
                .get(local)
                .ok_or_else(|| Error::internal(decl.span, format!("borrow `{}` is not in scope", decl.ident)))?;

            let renames = borrow
                .deps
                .iter()
                .filter_map(|&dep| {
                    let dep_decl = self.mar.local_decl_data(dep);
                    names.get(dep).map(|name| (dep_decl.ident.to_string(), name.clone()))
                })
                .collect::<HashMap<_, _>>();

            let mut place = borrow.place.clone();
            BindingRenamer { names: &renames }.rename_expr(&mut place);

            let span = decl.span;
            let mutability = decl.mutability.is_mut().then(|| quote_spanned!(span=> mut));
            let borrow_mut = borrow.mutability.is_mut().then(|| quote_spanned!(span=> mut));
            stmts.push(quote_spanned! {span=>
                let #mutability #name = &#borrow_mut #place;
            });
        }

        let data = &self.mar[bb];
        let declared_here: Vec<Local> = data
            .statements
            .iter()
            .flat_map(|statement| match &statement.kind {
                StatementKind::Let { decls, .. } => decls.clone(),
                StatementKind::Declare { local } => vec![*local],
                _ => vec![],
            })
            .collect();
        let assigned = assigned_locals(&data.statements);

        for &local in &data.scope {
            if is_stored(layout, local)
                || layout.rederive.contains(&local)
                || declared_here.contains(&local)
                || !assigned.contains(&local)
            {
                continue;
            }

            if let Some(name) = names.get(local) {
                stmts.push(self.declaration(local, name));
            }
        }

        Ok(stmts)
    }

    /// `let mut x: T;`
    pub fn declaration(&self, local: Local, name: &Ident) -> TokenStream {
        let decl = self.mar.local_decl_data(local);
        let span = decl.span;
        let mutability = decl.mutability.is_mut().then(|| quote_spanned!(span=> mut));
        match &decl.ty {
            Some(ty) => quote_spanned!(span=> let #mutability #name: #ty;),
            None => quote_spanned!(span=> let #mutability #name;),
        }
    }

    fn terminator(&self, bb: BasicBlock, terminator: &Terminator, names: &Names) -> Result<Vec<TokenStream>> {
        let span = terminator.span;

        let stmts = match &terminator.kind {
            TerminatorKind::Goto { target } => vec![self.goto(span, *target, names, &HashMap::new())?],
            TerminatorKind::If {
                cond,
                targets: (then_block, else_block),
            } => {
                let cond = self.user_expr(&cond.expr);
                let then_goto = self.goto(span, *then_block, names, &HashMap::new())?;
                let else_goto = self.goto(span, *else_block, names, &HashMap::new())?;
                vec![quote_spanned! {span=>
                    if #cond {
                        #then_goto
                    } else {
                        #else_goto
                    }
                }]
            }
            TerminatorKind::Match { discr, arms } => {
                let discr = self.user_expr(&discr.expr);
                let arms = arms
                    .iter()
                    .map(|arm| self.match_arm(span, arm, names))
                    .collect::<Result<Vec<_>>>()?;
                vec![quote_spanned! {span=>
                    match #discr {
                        #(#arms)*
                    }
                }]
            }
            TerminatorKind::Await { point, future, .. } => {
                let future = self.user_expr(&future.expr);
                let future = match self.strategy {
                    Strategy::Movable => quote_spanned! {span=>
                        ::core::future::IntoFuture::into_future(#future)
                    },
                    Strategy::Pinned | Strategy::HeapIndirected(_) => quote_spanned! {span=>
                        ::std::boxed::Box::pin(::core::future::IntoFuture::into_future(#future))
                    },
                };
                let suspended = self.suspended(span, *point, names, quote_spanned!(span=> __stateful_future,))?;
                let label = resume_label(span);
                vec![quote_spanned! {span=>
                    let __stateful_future = #future;
                    #suspended
                    continue #label;
                }]
            }
            TerminatorKind::Yield { point, value, .. } => {
                let value = self.user_expr(&value.expr);
                let suspended = self.suspended(span, *point, names, TokenStream::new())?;
                vec![quote_spanned! {span=>
                    let __stateful_item = #value;
                    #suspended
                    return ::core::task::Poll::Ready(::core::option::Option::Some(
                        ::core::result::Result::Ok(__stateful_item),
                    ));
                }]
            }
            TerminatorKind::Return { value } => {
                let value = self.user_expr(&value.expr);
                let complete = self.rewriter().complete(&value);
                vec![quote_spanned!(span=> return #complete;)]
            }
        };

        debug!("terminator: {:?} ends in {}", bb, kind_name(&terminator.kind));

        Ok(stmts)
    }

    fn match_arm(&self, span: Span, arm: &Arm, names: &Names) -> Result<TokenStream> {
        // Bindings get names no local in the matching block can have.
        let mut renames = HashMap::new();
        let mut overrides = HashMap::new();
        for &binding in &arm.bindings {
            let ident = &self.mar.local_decl_data(binding).ident;
            let name = format_ident!("__stateful_bind_{}_{}", ident.unraw(), binding.index(), span = ident.span());
            renames.insert(ident.to_string(), name.clone());
            overrides.insert(binding, name);
        }

        let mut renamer = BindingRenamer { names: &renames };
        let mut pat = arm.pat.clone();
        renamer.rename_pat(&mut pat);
        let guard = arm.guard.as_ref().map(|guard| {
            let mut guard = self.user_expr(&guard.expr);
            renamer.rename_expr(&mut guard);
            quote_spanned!(span=> if #guard)
        });

        let goto = self.goto(span, arm.target, names, &overrides)?;

        Ok(quote_spanned! {span=>
            #pat #guard => {
                #goto
            }
        })
    }

    /// Moves into the variant resuming `target` and runs it.
    fn goto(
        &self,
        span: Span,
        target: BasicBlock,
        names: &Names,
        overrides: &HashMap<Local, Ident>,
    ) -> Result<TokenStream> {
        let layout = self
            .layout
            .block(target)
            .ok_or_else(|| Error::internal(span, format!("jump to unreachable block {:?}", target)))?;

        let fields = layout
            .fields
            .iter()
            .map(|&local| self.exit_name(span, local, names, overrides, None))
            .collect::<Result<Vec<_>>>()?;

        let state_enum = Ident::new(STATE_ENUM, span);
        let variant = state_id(self.mar, target);
        let state = state_param(span);
        let label = resume_label(span);

        Ok(quote_spanned! {span=>
            *#state = #state_enum::#variant(#(#fields),*);
            continue #label;
        })
    }

    /// Stores the suspended variant of `point`, with `future` before its
    /// captures.
    fn suspended(&self, span: Span, point: SuspensionId, names: &Names, future: TokenStream) -> Result<TokenStream> {
        let kind = self.mar.suspension_point(point).kind;
        let fields = self
            .layout
            .point(point)
            .iter()
            .map(|&local| self.exit_name(span, local, names, &HashMap::new(), Some(point)))
            .collect::<Result<Vec<_>>>()?;

        let state_enum = Ident::new(STATE_ENUM, span);
        let variant = suspend_id(point, kind);
        let state = state_param(span);

        Ok(quote_spanned! {span=>
            *#state = #state_enum::#variant(#future #(#fields),*);
        })
    }

    fn exit_name(
        &self,
        span: Span,
        local: Local,
        names: &Names,
        overrides: &HashMap<Local, Ident>,
        point: Option<SuspensionId>,
    ) -> Result<Ident> {
        if let Some(name) = overrides.get(&local) {
            return Ok(name.clone());
        }

        let decl = self.mar.local_decl_data(local);

        if names.is_shadowed(local) {
            return Err(match point {
                Some(point) => Error::ShadowedCapture {
                    span: decl.span,
                    point,
                    binding: decl.ident.to_string(),
                },
                None => Error::internal(span, format!("`{}` is shadowed at a block boundary", decl.ident)),
            });
        }

        names
            .get(local)
            .cloned()
            .ok_or_else(|| Error::internal(span, format!("`{}` is not in scope where it is stored", decl.ident)))
    }

    fn await_arm(&self, point: SuspensionId, destination: Local, target: BasicBlock) -> Result<TokenStream> {
        let span = self.mar.suspension_point(point).span;
        let captured = self.layout.point(point);
        let names = Names::captured(self.mar, captured);
        let caps = captured.iter().filter_map(|&local| names.get(local)).collect::<Vec<_>>();

        let mut overrides = HashMap::new();
        overrides.insert(destination, Ident::new("__stateful_value", span));
        let resume = self.goto(span, target, &names, &overrides)?;

        let cx = cx_param(span);
        let poll = match self.strategy {
            Strategy::Movable => quote_spanned! {span=>
                ::core::future::Future::poll(::core::pin::Pin::new(&mut __stateful_future), #cx)
            },
            Strategy::Pinned | Strategy::HeapIndirected(_) => quote_spanned! {span=>
                ::core::future::Future::poll(__stateful_future.as_mut(), #cx)
            },
        };

        let state_enum = Ident::new(STATE_ENUM, span);
        let variant = suspend_id(point, SuspensionKind::Await);
        let state = state_param(span);

        Ok(quote_spanned! {span=>
            #state_enum::#variant(mut __stateful_future, #(#caps),*) => {
                match #poll {
                    ::core::task::Poll::Ready(__stateful_value) => {
                        #resume
                    }
                    ::core::task::Poll::Pending => {
                        *#state = #state_enum::#variant(__stateful_future, #(#caps),*);
                        return ::core::task::Poll::Pending;
                    }
                }
            }
        })
    }

    fn yield_arm(&self, point: SuspensionId, target: BasicBlock) -> Result<TokenStream> {
        let span = self.mar.suspension_point(point).span;
        let captured = self.layout.point(point);
        let names = Names::captured(self.mar, captured);
        let caps = captured.iter().filter_map(|&local| names.get(local)).collect::<Vec<_>>();
        let resume = self.goto(span, target, &names, &HashMap::new())?;

        let state_enum = Ident::new(STATE_ENUM, span);
        let variant = suspend_id(point, SuspensionKind::Yield);

        Ok(quote_spanned! {span=>
            #state_enum::#variant(#(#caps),*) => {
                #resume
            }
        })
    }

    /// What polling a finished machine does.
    pub fn done_arm(&self, span: Span) -> TokenStream {
        let state_enum = Ident::new(STATE_ENUM, span);
        match self.mar.capability {
            CapabilityKind::SingleResult => quote_spanned! {span=>
                #state_enum::Done => {
                    ::core::panic!("`resumable` future polled after completion")
                }
            },
            CapabilityKind::Sequence => quote_spanned! {span=>
                #state_enum::Done => {
                    return ::core::task::Poll::Ready(::core::option::Option::None);
                }
            },
        }
    }
}

/// Locals a block assigns without declaring them.
fn assigned_locals(statements: &[Statement]) -> Vec<Local> {
    let mut assigned = vec![];
    for statement in statements {
        let declared: &[Local] = match &statement.kind {
            StatementKind::Let { decls, .. } => decls,
            _ => &[],
        };
        for local in &statement.inits {
            if !declared.contains(local) && !assigned.contains(local) {
                assigned.push(*local);
            }
        }
    }
    assigned
}

fn kind_name(kind: &TerminatorKind) -> &'static str {
    match kind {
        TerminatorKind::Goto { .. } => "goto",
        TerminatorKind::If { .. } => "if",
        TerminatorKind::Match { .. } => "match",
        TerminatorKind::Await { .. } => "await",
        TerminatorKind::Yield { .. } => "yield",
        TerminatorKind::Return { .. } => "return",
    }
}
