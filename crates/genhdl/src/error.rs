//! Structured compile errors, one variant per kind named in the error
//! handling design: unsupported constructs, arity mismatches, namespace
//! violations, and internal invariant breaks.
//!
//! Variant shape (`Syntax`/`NotImplemented`/`NotSupported`/`Import`, each
//! carrying `{msg, position}`) and a hand-rolled `Display` with manual `From`
//! impls keyed by pipeline stage, no `thiserror`, matching the rest of this
//! codebase's error types.

use std::{borrow::Cow, fmt};

use crate::pos::SourceSpan;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, CompileError>;

/// A structured compile error: a kind tag plus a human message, always
/// fatal, never silently recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An AST node outside the accepted subset (raised at parse).
    UnsupportedConstruct { msg: Cow<'static, str>, at: Option<SourceSpan> },
    /// A yield tuple width disagrees with the declared output arity, or a
    /// tail call's argument count differs from the callee's parameter count
    /// (raised at CFG build).
    ArityMismatch { msg: Cow<'static, str>, at: Option<SourceSpan> },
    /// More than one generator procedure, more than four procedures, or a
    /// duplicate/unknown procedure name in the namespace.
    NamespaceViolation { msg: Cow<'static, str> },
    /// An unreachable case in the IR (e.g. unknown expression variant).
    /// Always a compiler bug, never user input.
    InternalInvariant { msg: Cow<'static, str> },
}

impl CompileError {
    pub fn unsupported(msg: impl Into<Cow<'static, str>>, at: SourceSpan) -> Self {
        Self::UnsupportedConstruct {
            msg: msg.into(),
            at: Some(at),
        }
    }

    pub fn unsupported_here(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedConstruct {
            msg: msg.into(),
            at: None,
        }
    }

    pub fn arity_mismatch(msg: impl Into<Cow<'static, str>>, at: SourceSpan) -> Self {
        Self::ArityMismatch {
            msg: msg.into(),
            at: Some(at),
        }
    }

    /// Same as `arity_mismatch`, for call sites past the parser (CFG
    /// building, inlining) that no longer carry a `SourceSpan` for the
    /// statement in question.
    pub fn arity_mismatch_here(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ArityMismatch { msg: msg.into(), at: None }
    }

    pub fn namespace_violation(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NamespaceViolation { msg: msg.into() }
    }

    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalInvariant { msg: msg.into() }
    }

    /// A short machine-stable kind tag, for callers that want to branch on
    /// kind without matching the whole enum (mirrors `ExcType`'s role).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedConstruct { .. } => "UnsupportedConstruct",
            Self::ArityMismatch { .. } => "ArityMismatch",
            Self::NamespaceViolation { .. } => "NamespaceViolation",
            Self::InternalInvariant { .. } => "InternalInvariant",
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedConstruct { msg, at: Some(at) } => {
                write!(f, "unsupported construct at {at}: {msg}")
            }
            Self::UnsupportedConstruct { msg, at: None } => write!(f, "unsupported construct: {msg}"),
            Self::ArityMismatch { msg, at: Some(at) } => write!(f, "arity mismatch at {at}: {msg}"),
            Self::ArityMismatch { msg, at: None } => write!(f, "arity mismatch: {msg}"),
            Self::NamespaceViolation { msg } => write!(f, "namespace violation: {msg}"),
            Self::InternalInvariant { msg } => write!(f, "internal invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = CompileError::namespace_violation("more than one generator procedure: [a, b]");
        assert_eq!(err.kind(), "NamespaceViolation");
        assert!(err.to_string().contains("more than one generator"));
    }
}
