use syn::visit::{self, Visit};
use syn::{Block, Expr, Item, Lifetime, Macro, Stmt};

use crate::mar::build::Builder;
use crate::mar::extract::is_placeholder_macro;

impl Builder {
    /// Whether lowering `node` has to split the current block: it holds a
    /// suspension point, or a `break`/`continue` leaving a lowered loop.
    pub fn contains_transition<E: ContainsTransition + ?Sized>(&self, node: &E) -> bool {
        node.contains_transition(&Context::Lowered {
            inside_loop: self.is_inside_loop(),
            labels: self.loop_labels(),
        })
    }
}

/// Which loops count as lowered.
pub enum Context {
    /// Exactly the loops on the builder's stack.
    Lowered { inside_loop: bool, labels: Vec<Lifetime> },
    /// Any loop the node is nested in; used before lowering starts.
    Any,
}

impl Context {
    fn escapes_to(&self, label: Option<&Lifetime>) -> bool {
        match (self, label) {
            (Context::Any, _) => true,
            (Context::Lowered { inside_loop, .. }, None) => *inside_loop,
            (Context::Lowered { labels, .. }, Some(label)) => {
                labels.iter().any(|l| l.ident == label.ident)
            }
        }
    }
}

pub trait ContainsTransition {
    fn contains_transition(&self, cx: &Context) -> bool;
}

impl ContainsTransition for Block {
    fn contains_transition(&self, cx: &Context) -> bool {
        let mut visitor = ContainsTransitionVisitor::new(cx);
        visitor.visit_block(self);
        visitor.contains_transition
    }
}

impl ContainsTransition for Stmt {
    fn contains_transition(&self, cx: &Context) -> bool {
        let mut visitor = ContainsTransitionVisitor::new(cx);
        visitor.visit_stmt(self);
        visitor.contains_transition
    }
}

impl ContainsTransition for Expr {
    fn contains_transition(&self, cx: &Context) -> bool {
        let mut visitor = ContainsTransitionVisitor::new(cx);
        visitor.visit_expr(self);
        visitor.contains_transition
    }
}

struct ContainsTransitionVisitor<'a> {
    cx: &'a Context,
    /// Loops (and labeled blocks) entered while visiting.
    inner_loops: usize,
    inner_labels: Vec<Lifetime>,
    contains_transition: bool,
}

impl<'a> ContainsTransitionVisitor<'a> {
    fn new(cx: &'a Context) -> Self {
        ContainsTransitionVisitor {
            cx,
            inner_loops: 0,
            inner_labels: vec![],
            contains_transition: false,
        }
    }

    fn jump(&mut self, label: Option<&Lifetime>) {
        let escapes = match label {
            None => self.inner_loops == 0,
            Some(label) => !self.inner_labels.iter().any(|l| l.ident == label.ident),
        };

        if escapes && self.cx.escapes_to(label) {
            self.contains_transition = true;
        }
    }

    fn in_loop<F: FnOnce(&mut Self)>(&mut self, label: Option<&syn::Label>, counts: bool, f: F) {
        if counts {
            self.inner_loops += 1;
        }
        if let Some(label) = label {
            self.inner_labels.push(label.name.clone());
        }
        f(self);
        if label.is_some() {
            self.inner_labels.pop();
        }
        if counts {
            self.inner_loops -= 1;
        }
    }
}

impl<'a, 'ast> Visit<'ast> for ContainsTransitionVisitor<'a> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.contains_transition {
            return;
        }

        match expr {
            Expr::Break(break_) => {
                self.jump(break_.label.as_ref());
                visit::visit_expr_break(self, break_);
            }
            Expr::Continue(continue_) => self.jump(continue_.label.as_ref()),
            Expr::Loop(loop_) => self.in_loop(loop_.label.as_ref(), true, |this| {
                this.visit_block(&loop_.body)
            }),
            Expr::While(while_) => self.in_loop(while_.label.as_ref(), true, |this| {
                this.visit_expr(&while_.cond);
                this.visit_block(&while_.body);
            }),
            Expr::ForLoop(for_) => {
                self.visit_expr(&for_.expr);
                self.in_loop(for_.label.as_ref(), true, |this| this.visit_block(&for_.body));
            }
            Expr::Block(block) if block.label.is_some() => {
                self.in_loop(block.label.as_ref(), false, |this| this.visit_block(&block.block))
            }
            // Their own scopes: neither suspensions nor jumps cross them.
            Expr::Closure(_) | Expr::Async(_) | Expr::Const(_) => {}
            _ => visit::visit_expr(self, expr),
        }
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        if is_placeholder_macro(mac) {
            self.contains_transition = true;
        }
    }

    fn visit_item(&mut self, _item: &'ast Item) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn lowered(inside_loop: bool, labels: Vec<Lifetime>) -> Context {
        Context::Lowered { inside_loop, labels }
    }

    #[test]
    fn test_placeholder() {
        let expr: Expr = parse_quote!(foo(__stateful_suspend!(0)));
        assert!(expr.contains_transition(&lowered(false, vec![])));

        let expr: Expr = parse_quote!(foo(|| __stateful_suspend!(0)));
        assert!(!expr.contains_transition(&lowered(false, vec![])));
    }

    #[test]
    fn test_break() {
        let expr: Expr = parse_quote!(if done { break; });
        assert!(expr.contains_transition(&lowered(true, vec![])));
        assert!(!expr.contains_transition(&lowered(false, vec![])));
        assert!(expr.contains_transition(&Context::Any));

        let expr: Expr = parse_quote!(loop { if done { break; } });
        assert!(!expr.contains_transition(&lowered(true, vec![])));

        let expr: Expr = parse_quote!(loop { break 'outer; });
        assert!(expr.contains_transition(&lowered(true, vec![parse_quote!('outer)])));
        assert!(!expr.contains_transition(&lowered(true, vec![parse_quote!('other)])));

        let expr: Expr = parse_quote!('inner: loop { break 'inner; });
        assert!(!expr.contains_transition(&lowered(true, vec![parse_quote!('inner)])));
    }
}
