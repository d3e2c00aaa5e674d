/*!
### Lexical scopes

Every block, match arm and loop body pushes a scope. Locals declared in it are
visible until it is popped. A new basic block records the locals visible when
it is started; that list is what the state variant for the block may hold.

### Loop scopes

In addition to the normal scope stack, we track a loop scope stack that contains only loops. It
tracks where a `break` and `continue` should go to.
*/

use proc_macro2::Span;
use syn::{Expr, Ident, Lifetime, Pat, Type};

use crate::mar::build::{Builder, Destination};
use crate::mar::repr::*;

#[derive(Debug, Default)]
pub struct Scope {
    /// Declarations created in this scope, in order.
    locals: Vec<Local>,
}

#[derive(Clone, Debug)]
pub struct LoopScope {
    pub label: Option<Lifetime>,
    pub continue_block: BasicBlock,
    pub break_block: BasicBlock,
    /// Where `break value` sends its value.
    pub destination: Destination,
}

impl Builder {
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the innermost scope, returning the locals that went out of scope.
    pub fn pop_scope(&mut self) -> Vec<Local> {
        self.scopes.pop().map(|scope| scope.locals).unwrap_or_default()
    }

    pub fn declare(&mut self, decl: LocalDecl) -> Local {
        debug!("declare: {} {:?}", decl.ident, decl.kind);
        let local = self.cfg.push_decl(decl);
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.push(local);
        }
        local
    }

    pub fn declare_temp(&mut self, span: Span) -> Local {
        let index = self.cfg.local_decls.len();
        let ident = Ident::new(&format!("__stateful_tmp{}", index), span);
        self.declare(LocalDecl::new(ident, Mutability::Not, LocalKind::Temp))
    }

    /// Declares every binding of `pat`. A `ty` annotates a lone identifier.
    pub fn declare_pat(&mut self, pat: &Pat, ty: Option<&Type>) -> Vec<Local> {
        let bindings = super::pat_bindings(pat);
        let lone = bindings.len() == 1;

        bindings
            .into_iter()
            .map(|(ident, mutability)| {
                let decl = LocalDecl::new(ident, mutability, LocalKind::Var)
                    .with_ty(if lone { ty.cloned() } else { None });
                self.declare(decl)
            })
            .collect()
    }

    /// Resolves a name to the innermost visible local.
    pub fn resolve(&self, name: &str) -> Option<Local> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.locals.iter().rev())
            .find(|local| self.cfg.local_decl_data(**local).ident == name)
            .cloned()
    }

    pub fn visible_locals(&self) -> Vec<Local> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.locals.iter().cloned())
            .collect()
    }

    pub fn local_expr(&self, local: Local) -> Expr {
        let ident = &self.cfg.local_decl_data(local).ident;
        syn::parse_quote!(#ident)
    }

    /// Start a loop scope, which tracks where `continue` and `break`
    /// should branch to. See module comment for more details.
    pub fn in_loop_scope<F, R>(&mut self, loop_scope: LoopScope, f: F) -> R
    where
        F: FnOnce(&mut Builder) -> R,
    {
        self.loop_scopes.push(loop_scope);
        let result = f(self);
        self.loop_scopes.pop();
        result
    }

    /// Finds the loop a `break` or `continue` refers to.
    pub fn find_loop_scope(&self, label: Option<&Lifetime>) -> Option<&LoopScope> {
        match label {
            None => self.loop_scopes.last(),
            Some(label) => self.loop_scopes.iter().rev().find(|loop_scope| {
                loop_scope
                    .label
                    .as_ref()
                    .map_or(false, |l| l.ident == label.ident)
            }),
        }
    }

    pub fn loop_labels(&self) -> Vec<Lifetime> {
        self.loop_scopes
            .iter()
            .filter_map(|loop_scope| loop_scope.label.clone())
            .collect()
    }
}
