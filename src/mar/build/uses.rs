//! Resolves the free variables of verbatim code to locals.

use proc_macro2::{TokenStream, TokenTree};
use syn::visit::{self, Visit};
use syn::{BinOp, Expr, Ident, Item, Macro, Pat, Stmt};

use crate::mar::build::Builder;
use crate::mar::repr::*;

/// What a piece of verbatim code does to the locals around it.
#[derive(Debug, Default)]
pub struct Summary {
    pub uses: Vec<Local>,
    /// Overwritten before being read, by a top-level `x = ..;`.
    pub kills: Vec<Local>,
    /// Assigned somewhere inside.
    pub inits: Vec<Local>,
}

impl Builder {
    pub fn summarize_expr(&self, expr: &Expr) -> Summary {
        let mut collector = UseCollector::new(self);
        collector.visit_expr(expr);
        collector.finish(vec![])
    }

    pub fn summarize_stmt(&self, stmt: &Stmt) -> Summary {
        let mut collector = UseCollector::new(self);
        let mut kills = vec![];

        match stmt {
            // `x = value;` does not read `x`.
            Stmt::Expr(Expr::Assign(assign), _) => {
                match self.assigned_local(&assign.left) {
                    Some(local) => {
                        kills.push(local);
                        collector.inits.push(local);
                    }
                    None => collector.visit_expr(&assign.left),
                }
                collector.visit_expr(&assign.right);
            }
            _ => collector.visit_stmt(stmt),
        }

        collector.finish(kills)
    }

    /// Adds the locals a borrow recipe reads whenever its borrower is read.
    pub fn close_over_borrows(&self, uses: &mut Vec<Local>) {
        let mut i = 0;
        while i < uses.len() {
            let local = uses[i];
            if let Some(borrow) = &self.cfg.local_decl_data(local).borrow {
                for dep in &borrow.deps {
                    if !uses.contains(dep) {
                        uses.push(*dep);
                    }
                }
            }
            i += 1;
        }
        uses.sort();
        uses.dedup();
    }

    fn assigned_local(&self, place: &Expr) -> Option<Local> {
        match place {
            Expr::Path(path) if path.qself.is_none() => {
                path.path.get_ident().and_then(|ident| self.resolve(&ident.to_string()))
            }
            Expr::Paren(paren) => self.assigned_local(&paren.expr),
            _ => None,
        }
    }
}

/// The identifiers a pattern binds, with their mutability. Identifiers that
/// start with an uppercase letter are taken to be constants or unit variants.
pub fn pat_bindings(pat: &Pat) -> Vec<(Ident, Mutability)> {
    struct Bindings(Vec<(Ident, Mutability)>);

    impl<'ast> Visit<'ast> for Bindings {
        fn visit_pat_ident(&mut self, pat: &'ast syn::PatIdent) {
            let is_constant = pat.subpat.is_none()
                && pat
                    .ident
                    .to_string()
                    .chars()
                    .next()
                    .map_or(false, char::is_uppercase);

            if !is_constant {
                let mutability = if pat.mutability.is_some() {
                    Mutability::Mut
                } else {
                    Mutability::Not
                };
                self.0.push((pat.ident.clone(), mutability));
            }

            visit::visit_pat_ident(self, pat);
        }

        // Every alternative binds the same names.
        fn visit_pat_or(&mut self, pat: &'ast syn::PatOr) {
            if let Some(first) = pat.cases.first() {
                self.visit_pat(first);
            }
        }

        fn visit_expr(&mut self, _expr: &'ast Expr) {}
    }

    let mut bindings = Bindings(vec![]);
    bindings.visit_pat(pat);
    bindings.0
}

struct UseCollector<'a> {
    builder: &'a Builder,
    /// Names bound inside the code being visited, innermost last.
    shadowed: Vec<Vec<String>>,
    uses: Vec<Local>,
    inits: Vec<Local>,
}

impl<'a> UseCollector<'a> {
    fn new(builder: &'a Builder) -> Self {
        UseCollector {
            builder,
            shadowed: vec![],
            uses: vec![],
            inits: vec![],
        }
    }

    fn finish(mut self, kills: Vec<Local>) -> Summary {
        self.builder.close_over_borrows(&mut self.uses);
        self.inits.sort();
        self.inits.dedup();

        Summary {
            uses: self.uses,
            kills,
            inits: self.inits,
        }
    }

    fn lookup(&self, name: &str) -> Option<Local> {
        if self
            .shadowed
            .iter()
            .any(|frame| frame.iter().any(|shadow| shadow == name))
        {
            return None;
        }
        self.builder.resolve(name)
    }

    fn use_name(&mut self, name: &str) {
        if let Some(local) = self.lookup(name) {
            if !self.uses.contains(&local) {
                self.uses.push(local);
            }
        }
    }

    fn bind_pat(&mut self, pat: &Pat) {
        let names = pat_bindings(pat).into_iter().map(|(ident, _)| ident.to_string());
        if let Some(frame) = self.shadowed.last_mut() {
            frame.extend(names);
        }
    }

    fn scan_tokens(&mut self, tokens: TokenStream) {
        for token in tokens {
            match token {
                TokenTree::Ident(ident) => self.use_name(&ident.to_string()),
                TokenTree::Group(group) => self.scan_tokens(group.stream()),
                TokenTree::Literal(literal) => {
                    let stream = TokenStream::from(TokenTree::Literal(literal));
                    if let Ok(lit) = syn::parse2::<syn::LitStr>(stream) {
                        for name in inline_format_args(&lit.value()) {
                            self.use_name(&name);
                        }
                    }
                }
                TokenTree::Punct(_) => {}
            }
        }
    }
}

impl<'a, 'ast> Visit<'ast> for UseCollector<'a> {
    fn visit_expr_path(&mut self, path: &'ast syn::ExprPath) {
        if path.qself.is_none() {
            if let Some(ident) = path.path.get_ident() {
                self.use_name(&ident.to_string());
            }
        }
        visit::visit_expr_path(self, path);
    }

    fn visit_expr_assign(&mut self, assign: &'ast syn::ExprAssign) {
        match self.builder.assigned_local(&assign.left) {
            Some(local) if self.lookup(&self.builder.cfg.local_decl_data(local).ident.to_string()) == Some(local) => {
                self.inits.push(local);
            }
            _ => self.visit_expr(&assign.left),
        }
        self.visit_expr(&assign.right);
    }

    fn visit_expr_binary(&mut self, binary: &'ast syn::ExprBinary) {
        // Compound assignment reads its target first.
        if is_compound_assign(&binary.op) {
            if let Some(local) = self.builder.assigned_local(&binary.left) {
                self.inits.push(local);
            }
        }
        visit::visit_expr_binary(self, binary);
    }

    fn visit_block(&mut self, block: &'ast syn::Block) {
        self.shadowed.push(vec![]);
        for stmt in &block.stmts {
            match stmt {
                Stmt::Local(local) => {
                    if let Some(init) = &local.init {
                        self.visit_expr(&init.expr);
                        if let Some((_, diverge)) = &init.diverge {
                            self.visit_expr(diverge);
                        }
                    }
                    self.bind_pat(&local.pat);
                }
                stmt => self.visit_stmt(stmt),
            }
        }
        self.shadowed.pop();
    }

    fn visit_expr_closure(&mut self, closure: &'ast syn::ExprClosure) {
        self.shadowed.push(vec![]);
        for input in &closure.inputs {
            self.bind_pat(input);
        }
        self.visit_expr(&closure.body);
        self.shadowed.pop();
    }

    fn visit_arm(&mut self, arm: &'ast syn::Arm) {
        self.shadowed.push(vec![]);
        self.bind_pat(&arm.pat);
        if let Some((_, guard)) = &arm.guard {
            self.visit_expr(guard);
        }
        self.visit_expr(&arm.body);
        self.shadowed.pop();
    }

    fn visit_expr_for_loop(&mut self, for_loop: &'ast syn::ExprForLoop) {
        self.visit_expr(&for_loop.expr);
        self.shadowed.push(vec![]);
        self.bind_pat(&for_loop.pat);
        self.visit_block(&for_loop.body);
        self.shadowed.pop();
    }

    fn visit_expr_if(&mut self, expr_if: &'ast syn::ExprIf) {
        match &*expr_if.cond {
            Expr::Let(let_) => {
                self.visit_expr(&let_.expr);
                self.shadowed.push(vec![]);
                self.bind_pat(&let_.pat);
                self.visit_block(&expr_if.then_branch);
                self.shadowed.pop();
            }
            cond => {
                self.visit_expr(cond);
                self.visit_block(&expr_if.then_branch);
            }
        }
        if let Some((_, else_branch)) = &expr_if.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, expr_while: &'ast syn::ExprWhile) {
        match &*expr_while.cond {
            Expr::Let(let_) => {
                self.visit_expr(&let_.expr);
                self.shadowed.push(vec![]);
                self.bind_pat(&let_.pat);
                self.visit_block(&expr_while.body);
                self.shadowed.pop();
            }
            cond => {
                self.visit_expr(cond);
                self.visit_block(&expr_while.body);
            }
        }
    }

    fn visit_expr_let(&mut self, let_: &'ast syn::ExprLet) {
        self.visit_expr(&let_.expr);
    }

    fn visit_local(&mut self, local: &'ast syn::Local) {
        // A `let` outside of a block, i.e. the statement itself.
        if let Some(init) = &local.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
        }
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        if !crate::mar::extract::is_placeholder_macro(mac) {
            self.scan_tokens(mac.tokens.clone());
        }
    }

    fn visit_pat(&mut self, _pat: &'ast Pat) {}

    fn visit_type(&mut self, _ty: &'ast syn::Type) {}

    fn visit_item(&mut self, _item: &'ast Item) {}
}

fn is_compound_assign(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

/// The identifiers captured inline by a format string, as in `"{name:?}"`.
pub fn inline_format_args(format: &str) -> Vec<String> {
    let mut names = vec![];
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '}' || c == ':' {
                break;
            }
            name.push(c);
            chars.next();
        }

        let name = name.trim();
        let is_ident = name
            .chars()
            .next()
            .map_or(false, |c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');

        if is_ident {
            names.push(name.to_string());
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_inline_format_args() {
        assert_eq!(inline_format_args("{a} {b:?} {{c}} {0} {} {d_1:>4}"), vec!["a", "b", "d_1"]);
    }

    #[test]
    fn test_pat_bindings() {
        let names = |pat: Pat| -> Vec<String> {
            pat_bindings(&pat)
                .into_iter()
                .map(|(ident, _)| ident.to_string())
                .collect()
        };

        assert_eq!(names(parse_quote!((a, mut b))), vec!["a", "b"]);
        assert_eq!(names(parse_quote!(Some(x))), vec!["x"]);
        assert_eq!(names(parse_quote!(None)), Vec::<String>::new());
        assert_eq!(names(parse_quote!(Point { x, y: ref why })), vec!["x", "why"]);
        assert_eq!(names(parse_quote!(A(v) | B(v))), vec!["v"]);
        assert_eq!(names(parse_quote!(all @ [first, ..])), vec!["all", "first"]);

        let muts: Vec<Mutability> = pat_bindings(&parse_quote!((a, mut b)))
            .into_iter()
            .map(|(_, m)| m)
            .collect();
        assert_eq!(muts, vec![Mutability::Not, Mutability::Mut]);
    }
}
