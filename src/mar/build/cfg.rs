use proc_macro2::Span;
use syn::{Expr, Pat, Type};

use crate::mar::build::{Builder, CFG};
use crate::mar::repr::*;

impl CFG {
    pub fn block_data(&self, block: BasicBlock) -> &BasicBlockData {
        &self.basic_blocks[block]
    }

    pub fn block_data_mut(&mut self, block: BasicBlock) -> &mut BasicBlockData {
        &mut self.basic_blocks[block]
    }

    pub fn start_new_block(&mut self, span: Span, name: Option<&'static str>, scope: Vec<Local>) -> BasicBlock {
        self.basic_blocks.push(BasicBlockData::new(span, name, scope))
    }

    pub fn push(&mut self, block: BasicBlock, statement: Statement) {
        self.block_data_mut(block).statements.push(statement);
    }

    pub fn terminate(&mut self, block: BasicBlock, terminator: Terminator) {
        assert!(
            self.block_data(block).terminator.is_none(),
            "terminate: block {:?} already has a terminator set",
            block
        );
        self.block_data_mut(block).terminator = Some(terminator);
    }

    pub fn local_decl_data(&self, local: Local) -> &LocalDecl {
        &self.local_decls[local]
    }

    pub fn local_decl_data_mut(&mut self, local: Local) -> &mut LocalDecl {
        &mut self.local_decls[local]
    }

    pub fn push_decl(&mut self, decl: LocalDecl) -> Local {
        self.local_decls.push(decl)
    }
}

impl Builder {
    pub fn terminate(&mut self, span: Span, block: BasicBlock, kind: TerminatorKind) {
        debug!("terminate: {:?} {:?}", block, kind_name(&kind));
        self.cfg.terminate(block, Terminator { span, kind });
    }

    pub fn goto(&mut self, span: Span, block: BasicBlock, target: BasicBlock) {
        self.terminate(span, block, TerminatorKind::Goto { target });
    }

    /// A statement without transitions, copied through unchanged.
    pub fn push_verbatim(&mut self, block: BasicBlock, stmt: syn::Stmt) {
        let summary = self.summarize_stmt(&stmt);
        self.cfg.push(
            block,
            Statement {
                span: syn::spanned::Spanned::span(&stmt),
                kind: StatementKind::Expr(stmt),
                uses: summary.uses,
                kills: summary.kills,
                inits: summary.inits,
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_let(
        &mut self,
        block: BasicBlock,
        span: Span,
        pat: Pat,
        ty: Option<Type>,
        init: Option<Expr>,
        diverge: Option<Expr>,
        decls: Vec<Local>,
    ) {
        let mut uses = vec![];
        let mut inits = vec![];
        if let Some(init) = &init {
            let summary = self.summarize_expr(init);
            uses.extend(summary.uses);
            inits.extend(summary.inits);
            inits.extend(decls.iter().cloned());
        }
        if let Some(diverge) = &diverge {
            uses.extend(self.summarize_expr(diverge).uses);
        }
        uses.sort();
        uses.dedup();

        self.cfg.push(
            block,
            Statement {
                span,
                kind: StatementKind::Let {
                    pat,
                    ty,
                    init,
                    diverge,
                    decls: decls.clone(),
                },
                uses,
                kills: decls,
                inits,
            },
        );
    }

    pub fn push_declare(&mut self, block: BasicBlock, span: Span, local: Local) {
        self.cfg.push(
            block,
            Statement {
                span,
                kind: StatementKind::Declare { local },
                uses: vec![],
                kills: vec![],
                inits: vec![],
            },
        );
    }

    pub fn push_assign(&mut self, block: BasicBlock, span: Span, local: Local, value: Expr) {
        let summary = self.summarize_expr(&value);
        let mut inits = summary.inits;
        inits.push(local);

        self.cfg.push(
            block,
            Statement {
                span,
                kind: StatementKind::Assign { local, value },
                uses: summary.uses,
                kills: vec![local],
                inits,
            },
        );
    }

    /// Wraps a verbatim expression with the locals it reads.
    pub fn operand(&self, expr: Expr) -> Operand {
        let uses = self.summarize_expr(&expr).uses;
        Operand { expr, uses }
    }
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
