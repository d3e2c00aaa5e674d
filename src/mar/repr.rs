use std::fmt;

use proc_macro2::Span;
use syn::{Expr, Ident, Item, Lifetime, Pat, Type};

use crate::mar::indexed_vec::IndexVec;
use crate::signature::CapabilityKind;

/// Lowered representation of a single function.
pub struct Mar {
    pub span: Span,

    pub ident: Ident,

    pub capability: CapabilityKind,

    /// One local per parameter, in declaration order. Receivers come first.
    pub params: Vec<Local>,

    pub local_decls: IndexVec<Local, LocalDecl>,

    /// List of basic blocks. References to basic block use a newtyped index type `BasicBlock`
    /// that indexes into this vector.
    pub basic_blocks: IndexVec<BasicBlock, BasicBlockData>,

    /// Suspension points in the order the extractor numbered them.
    pub suspension_points: IndexVec<SuspensionId, SuspensionPoint>,

    /// Items declared inside the body. They cannot see locals, so they are
    /// hoisted out of the resume function unchanged.
    pub items: Vec<Item>,
}

impl Mar {
    pub fn all_basic_blocks(&self) -> Vec<BasicBlock> {
        self.basic_blocks.indices().collect()
    }

    pub fn basic_blocks(&self) -> &IndexVec<BasicBlock, BasicBlockData> {
        &self.basic_blocks
    }

    pub fn basic_block_data(&self, bb: BasicBlock) -> &BasicBlockData {
        &self.basic_blocks[bb]
    }

    pub fn basic_block_data_mut(&mut self, bb: BasicBlock) -> &mut BasicBlockData {
        &mut self.basic_blocks[bb]
    }

    pub fn local_decl_data(&self, local: Local) -> &LocalDecl {
        &self.local_decls[local]
    }

    pub fn suspension_point(&self, id: SuspensionId) -> &SuspensionPoint {
        &self.suspension_points[id]
    }

    /// Re-derives each suspension point's source and resume blocks from the
    /// terminators, after passes have renumbered or dropped blocks.
    pub fn relink_suspension_points(&mut self) {
        for point in self.suspension_points.iter_mut() {
            point.block = None;
            point.resume = None;
        }

        for (bb, data) in self.basic_blocks.iter_enumerated() {
            let (point, target) = match data.terminator.as_ref().map(|t| &t.kind) {
                Some(TerminatorKind::Await { point, target, .. }) => (*point, *target),
                Some(TerminatorKind::Yield { point, target, .. }) => (*point, *target),
                _ => continue,
            };
            let point = &mut self.suspension_points[point];
            point.block = Some(bb);
            point.resume = Some(target);
        }
    }

    /// The suspension points that survived simplification.
    pub fn live_suspension_points(&self) -> impl Iterator<Item = (SuspensionId, &SuspensionPoint)> {
        self.suspension_points
            .iter_enumerated()
            .filter(|(_, point)| point.block.is_some())
    }
}

impl std::ops::Index<BasicBlock> for Mar {
    type Output = BasicBlockData;

    fn index(&self, index: BasicBlock) -> &BasicBlockData {
        &self.basic_blocks[index]
    }
}

/// Where execution begins
pub const START_BLOCK: BasicBlock = BasicBlock(0);

///////////////////////////////////////////////////////////////////////////
// Locals

newtype_index!(Local, "_{}");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    Not,
    Mut,
}

impl Mutability {
    pub fn is_mut(self) -> bool {
        self == Mutability::Mut
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalKind {
    /// A named parameter, or the holder of a pattern parameter.
    Param,
    /// `self` in any of its forms.
    SelfParam,
    /// A binding introduced in the body.
    Var,
    /// A temporary introduced by lowering.
    Temp,
}

#[derive(Clone, Debug)]
pub struct LocalDecl {
    pub ident: Ident,
    pub mutability: Mutability,
    pub kind: LocalKind,
    pub ty: Option<Type>,
    /// Set when the local was initialized with `&place` or `&mut place`.
    pub borrow: Option<Borrow>,
    /// The frame local a method call, index or field initializer read from.
    /// The value may hold a borrow of it that no `&` spells out.
    pub derived_from: Option<Local>,
    pub span: Span,
}

impl LocalDecl {
    pub fn new(ident: Ident, mutability: Mutability, kind: LocalKind) -> Self {
        let span = ident.span();
        LocalDecl {
            ident,
            mutability,
            kind,
            ty: None,
            borrow: None,
            derived_from: None,
            span,
        }
    }

    pub fn with_ty(mut self, ty: Option<Type>) -> Self {
        self.ty = ty;
        self
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, LocalKind::Param | LocalKind::SelfParam)
    }

    /// The lifetimes written in (or elided from) the declared type.
    pub fn type_lifetimes(&self) -> Vec<Lifetime> {
        self.ty.as_ref().map(lifetimes_of).unwrap_or_default()
    }

    pub fn has_reference_type(&self) -> bool {
        !self.type_lifetimes().is_empty()
    }
}

/// Collects the lifetimes of a type. An elided reference lifetime is
/// reported as `'_`.
pub fn lifetimes_of(ty: &Type) -> Vec<Lifetime> {
    use syn::visit::{self, Visit};

    struct Collect(Vec<Lifetime>);

    impl<'ast> Visit<'ast> for Collect {
        fn visit_lifetime(&mut self, lifetime: &'ast Lifetime) {
            if !self.0.iter().any(|l| l.ident == lifetime.ident) {
                self.0.push(lifetime.clone());
            }
        }

        fn visit_type_reference(&mut self, ty: &'ast syn::TypeReference) {
            if ty.lifetime.is_none() {
                let elided = Lifetime::new("'_", ty.and_token.span);
                self.visit_lifetime(&elided);
            }
            visit::visit_type_reference(self, ty);
        }
    }

    let mut collect = Collect(vec![]);
    collect.visit_type(ty);
    collect.0
}

/// A local initialized by borrowing a place.
#[derive(Clone, Debug)]
pub struct Borrow {
    pub mutability: Mutability,
    /// The borrowed place, as written. Its idents name `deps`.
    pub place: Expr,
    /// The local the place is rooted in.
    pub root: Local,
    /// Every local the place mentions, root first.
    pub deps: Vec<Local>,
    pub origin: BorrowOrigin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BorrowOrigin {
    /// Points into the frame, and so into the state object once suspended.
    Internal,
    /// Points through a reference the caller supplied.
    External { lifetimes: Vec<String> },
}

///////////////////////////////////////////////////////////////////////////
// Suspension points

newtype_index!(SuspensionId, "SP({})");

impl fmt::Display for SuspensionId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspensionKind {
    /// `expr.await`
    Await,
    /// `yield_!(expr)`
    Yield,
}

#[derive(Clone, Debug)]
pub struct SuspensionPoint {
    pub kind: SuspensionKind,
    /// The awaited future or the yielded value. Nested points appear as
    /// placeholders.
    pub expr: Expr,
    pub span: Span,
    /// Inside a loop body: one static point, many dynamic visits.
    pub in_loop: bool,
    /// The block whose terminator suspends, `None` once found unreachable.
    pub block: Option<BasicBlock>,
    /// The block execution resumes in.
    pub resume: Option<BasicBlock>,
}

///////////////////////////////////////////////////////////////////////////
// BasicBlock

newtype_index!(BasicBlock, "BB({})");

///////////////////////////////////////////////////////////////////////////
// BasicBlock and Terminator

#[derive(Debug)]
pub struct BasicBlockData {
    pub name: Option<&'static str>,
    pub span: Span,
    /// Locals in scope on entry, in declaration order.
    pub scope: Vec<Local>,
    pub statements: Vec<Statement>,
    pub terminator: Option<Terminator>,
}

impl BasicBlockData {
    pub fn new(span: Span, name: Option<&'static str>, scope: Vec<Local>) -> Self {
        BasicBlockData {
            name,
            span,
            scope,
            statements: vec![],
            terminator: None,
        }
    }

    pub fn terminator(&self) -> &Terminator {
        self.terminator.as_ref().expect("invalid terminator state")
    }

    pub fn terminator_mut(&mut self) -> &mut Terminator {
        self.terminator.as_mut().expect("invalid terminator state")
    }
}

#[derive(Debug)]
pub struct Terminator {
    pub span: Span,
    pub kind: TerminatorKind,
}

#[derive(Debug)]
pub enum TerminatorKind {
    /// block should have one successor in the graph; we jump there
    Goto { target: BasicBlock },

    /// jump to branch 0 if this expression evaluates to true
    If {
        cond: Operand,
        targets: (BasicBlock, BasicBlock),
    },

    /// evaluate the discriminant and jump to the first matching arm
    Match { discr: Operand, arms: Vec<Arm> },

    /// start awaiting `future`; once it completes its value lands in
    /// `destination` and execution continues at `target`.
    Await {
        point: SuspensionId,
        future: Operand,
        destination: Local,
        target: BasicBlock,
    },

    /// hand `value` to the consumer, then continue at `target`.
    Yield {
        point: SuspensionId,
        value: Operand,
        target: BasicBlock,
    },

    /// transition to terminal with `value`.
    Return { value: Operand },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BasicBlock> {
        match self.kind {
            TerminatorKind::Goto { target } => vec![target],
            TerminatorKind::If { targets: (then, else_), .. } => vec![then, else_],
            TerminatorKind::Match { ref arms, .. } => arms.iter().map(|arm| arm.target).collect(),
            TerminatorKind::Await { target, .. } => vec![target],
            TerminatorKind::Yield { target, .. } => vec![target],
            TerminatorKind::Return { .. } => vec![],
        }
    }

    pub fn successors_mut(&mut self) -> Vec<&mut BasicBlock> {
        match self.kind {
            TerminatorKind::Goto { ref mut target } => vec![target],
            TerminatorKind::If {
                targets: (ref mut then, ref mut else_),
                ..
            } => vec![then, else_],
            TerminatorKind::Match { ref mut arms, .. } => {
                arms.iter_mut().map(|arm| &mut arm.target).collect()
            }
            TerminatorKind::Await { ref mut target, .. } => vec![target],
            TerminatorKind::Yield { ref mut target, .. } => vec![target],
            TerminatorKind::Return { .. } => vec![],
        }
    }

    /// The operands the terminator reads before control leaves the block.
    pub fn operands(&self) -> Vec<&Operand> {
        match self.kind {
            TerminatorKind::Goto { .. } => vec![],
            TerminatorKind::If { ref cond, .. } => vec![cond],
            TerminatorKind::Match { ref discr, ref arms } => {
                let mut operands = vec![discr];
                operands.extend(arms.iter().filter_map(|arm| arm.guard.as_ref()));
                operands
            }
            TerminatorKind::Await { ref future, .. } => vec![future],
            TerminatorKind::Yield { ref value, .. } => vec![value],
            TerminatorKind::Return { ref value } => vec![value],
        }
    }

    /// Locals defined on the edge into `target`.
    pub fn edge_defs(&self, target: BasicBlock) -> Vec<Local> {
        match self.kind {
            TerminatorKind::Await {
                destination,
                target: resume,
                ..
            } if resume == target => vec![destination],
            TerminatorKind::Match { ref arms, .. } => arms
                .iter()
                .filter(|arm| arm.target == target)
                .flat_map(|arm| arm.bindings.iter().cloned())
                .collect(),
            _ => vec![],
        }
    }
}

#[derive(Debug)]
pub struct Arm {
    pub pat: Pat,
    pub guard: Option<Operand>,
    /// The locals the pattern binds.
    pub bindings: Vec<Local>,
    pub target: BasicBlock,
}

/// An expression copied through verbatim, with the locals it reads.
#[derive(Clone, Debug)]
pub struct Operand {
    pub expr: Expr,
    pub uses: Vec<Local>,
}

///////////////////////////////////////////////////////////////////////////
// Statements

#[derive(Debug)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
    /// Locals read.
    pub uses: Vec<Local>,
    /// Locals unconditionally overwritten.
    pub kills: Vec<Local>,
    /// Locals assigned anywhere inside, `kills` included.
    pub inits: Vec<Local>,
}

#[derive(Debug)]
pub enum StatementKind {
    /// A statement without transitions, copied through unchanged.
    Expr(syn::Stmt),

    /// `let pat = init;`, declaring `decls`.
    Let {
        pat: Pat,
        ty: Option<Type>,
        init: Option<Expr>,
        /// A diverging `else` block.
        diverge: Option<Expr>,
        decls: Vec<Local>,
    },

    /// `let x;`, a declaration whose initialization comes later.
    Declare { local: Local },

    /// `local = value;`
    Assign { local: Local, value: Expr },
}
