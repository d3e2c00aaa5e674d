use proc_macro2::{Span, TokenStream};
use thiserror::Error;

use crate::mar::repr::SuspensionId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The four families of rejection, in the order they are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Signature,
    DirectiveConflict,
    CaptureValidation,
    Scope,
    Internal,
}

/// Everything that can make a transformation fail. Each variant carries the
/// span it is reported against; the engine stops at the first one.
#[derive(Debug, Error)]
pub enum Error {
    #[error("`resumable` may only be applied to functions with a body")]
    NotAFunction { span: Span },

    #[error("`resumable` functions must not be `async`; the generated state machine replaces the async body")]
    AlreadyAsync { span: Span },

    #[error("`resumable` functions must not be `const`")]
    ConstFn { span: Span },

    #[error("return type does not declare a recognized asynchronous capability: expected `impl Future<Output = Result<T, E>>`, `impl Stream<Item = Result<T, E>>` or a boxed form")]
    UnrecognizedReturnType { span: Span },

    #[error("the {capability} result type must be a `Result`, found `{found}`")]
    NotAResult {
        span: Span,
        capability: &'static str,
        found: String,
    },

    #[error("malformed directive: {message}")]
    MalformedDirective { span: Span, message: String },

    #[error("conflicting strategy directives: `{first}` and `{second}`")]
    ConflictingDirectives {
        span: Span,
        first: &'static str,
        second: &'static str,
    },

    #[error("duplicate `bound` directive")]
    DuplicateBound { span: Span },

    #[error("`movable` conflicts with the heap-indirected return type")]
    MovableHeapConflict { span: Span },

    #[error("suspension point escapes transformable scope")]
    EscapedSuspension { span: Span },

    #[error("`yield_!` is only valid in a function returning a stream")]
    YieldInSingleResult { span: Span },

    #[error("malformed `yield_!`: {message}")]
    MalformedSuspension { span: Span, message: String },

    #[error("{what} cannot contain a suspension point")]
    UnsupportedSuspension { span: Span, what: &'static str },

    #[error("movable strategy incompatible with captured self-reference `{binding}` at suspension point {point}")]
    MovableSelfReference {
        span: Span,
        point: SuspensionId,
        binding: String,
    },

    #[error("borrow crosses suspension point without being reflected in the declared return type's lifetime parameters: `{binding}` at suspension point {point} needs `{lifetime}`")]
    UncoveredBorrow {
        span: Span,
        point: SuspensionId,
        binding: String,
        lifetime: String,
    },

    #[error("mutable binding `{binding}` holds a borrow of the frame and cannot be carried across suspension point {point}")]
    MutableSelfReference {
        span: Span,
        point: SuspensionId,
        binding: String,
    },

    #[error("`{binding}` is shadowed before suspension point {point} and cannot be carried across it")]
    ShadowedCapture {
        span: Span,
        point: SuspensionId,
        binding: String,
    },

    #[error("internal error: {message}")]
    Internal { span: Span, message: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAFunction { .. }
            | Error::AlreadyAsync { .. }
            | Error::ConstFn { .. }
            | Error::UnrecognizedReturnType { .. }
            | Error::NotAResult { .. }
            | Error::MalformedDirective { .. } => ErrorKind::Signature,
            Error::ConflictingDirectives { .. }
            | Error::DuplicateBound { .. }
            | Error::MovableHeapConflict { .. } => ErrorKind::DirectiveConflict,
            Error::MovableSelfReference { .. }
            | Error::UncoveredBorrow { .. }
            | Error::MutableSelfReference { .. }
            | Error::ShadowedCapture { .. } => ErrorKind::CaptureValidation,
            Error::EscapedSuspension { .. }
            | Error::YieldInSingleResult { .. }
            | Error::MalformedSuspension { .. }
            | Error::UnsupportedSuspension { .. } => ErrorKind::Scope,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn span(&self) -> Span {
        match *self {
            Error::NotAFunction { span }
            | Error::AlreadyAsync { span }
            | Error::ConstFn { span }
            | Error::UnrecognizedReturnType { span }
            | Error::NotAResult { span, .. }
            | Error::MalformedDirective { span, .. }
            | Error::ConflictingDirectives { span, .. }
            | Error::DuplicateBound { span }
            | Error::MovableHeapConflict { span }
            | Error::EscapedSuspension { span }
            | Error::YieldInSingleResult { span }
            | Error::MalformedSuspension { span, .. }
            | Error::UnsupportedSuspension { span, .. }
            | Error::MovableSelfReference { span, .. }
            | Error::UncoveredBorrow { span, .. }
            | Error::MutableSelfReference { span, .. }
            | Error::ShadowedCapture { span, .. }
            | Error::Internal { span, .. } => span,
        }
    }

    pub(crate) fn internal(span: Span, message: impl Into<String>) -> Self {
        Error::Internal {
            span,
            message: message.into(),
        }
    }

    pub fn to_syn_error(&self) -> syn::Error {
        syn::Error::new(self.span(), self.to_string())
    }

    /// Renders the error as a `compile_error!` invocation at its span.
    pub fn to_compile_error(&self) -> TokenStream {
        self.to_syn_error().to_compile_error()
    }
}

impl From<Error> for syn::Error {
    fn from(err: Error) -> Self {
        err.to_syn_error()
    }
}
