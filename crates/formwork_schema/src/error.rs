//! Error types for schema definition and submission checking.
//!
//! Two families are kept apart so callers can answer them differently:
//! - [`SchemaError`]: the definition itself is wrong (bad composite, bad form,
//!   unresolved reference). These are configuration bugs.
//! - [`SubmissionError`]: a user-provided submission does not match a valid
//!   form. These are expected and must be turned into a rejection.

use std::fmt;

use thiserror::Error;

use crate::arity::Arity;
use crate::defaults::KEY_SEPARATOR;

/// Location of a node inside a field tree, as the list of ids from the root.
///
/// Displayed with the same separator as submission keys, so the path of a
/// submission error can be matched against the offending key directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A new path with one more segment. The receiver is left untouched.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, usually the id of the offending field.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let sep = KEY_SEPARATOR.to_string();
        write!(f, "{}", self.0.join(&sep))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A composite, form or field definition is not acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A structural invariant is broken (blank name, duplicate id/order,
    /// bad arity, mandatory self-reference, leftover recursion token...).
    #[error("Invalid definition at '{path}': {reason}")]
    InvalidDefinition { path: FieldPath, reason: String },

    /// A composite id could not be resolved against the known composites.
    #[error("Composite not found: {id}")]
    ReferenceNotFound { id: String },

    /// A form and the composite it embeds have diverged.
    #[error("Schema mismatch at '{path}': {reason}")]
    SchemaMismatch { path: FieldPath, reason: String },
}

impl SchemaError {
    pub fn invalid(path: &FieldPath, reason: impl Into<String>) -> Self {
        SchemaError::InvalidDefinition {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(path: &FieldPath, reason: impl Into<String>) -> Self {
        SchemaError::SchemaMismatch {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub fn not_found(id: impl fmt::Display) -> Self {
        SchemaError::ReferenceNotFound { id: id.to_string() }
    }
}

/// A submission was rejected while being decoded or checked against a form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error("Field '{path}' has arity {arity}, but {count} answer(s) were given")]
    ArityViolation {
        path: FieldPath,
        arity: Arity,
        count: usize,
    },

    #[error("Field '{path}' expects {expected}: {reason}")]
    TypeMismatch {
        path: FieldPath,
        expected: String,
        reason: String,
    },

    #[error("Field '{path}' is a union without option '{option}' (allowed: {allowed:?})")]
    UnknownUnionOption {
        path: FieldPath,
        option: String,
        allowed: Vec<String>,
    },

    #[error("Answer '{key}' under '{path}' does not correspond to any field")]
    UnknownField { path: FieldPath, key: String },

    #[error("Malformed submission: {reason}")]
    MalformedSubmission { reason: String },

    /// The form or its composites are broken; not the submitter's fault.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl SubmissionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SubmissionError::MalformedSubmission {
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(
        path: &FieldPath,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SubmissionError::TypeMismatch {
            path: path.clone(),
            expected: expected.into(),
            reason: reason.into(),
        }
    }

    /// `true` when the submitter can fix the problem (reject with a 4xx),
    /// `false` when the server configuration is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SubmissionError::Schema(_))
    }

    /// The field the error is attached to, when there is one.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            SubmissionError::ArityViolation { path, .. }
            | SubmissionError::TypeMismatch { path, .. }
            | SubmissionError::UnknownUnionOption { path, .. }
            | SubmissionError::UnknownField { path, .. } => Some(path),
            SubmissionError::Schema(SchemaError::InvalidDefinition { path, .. })
            | SubmissionError::Schema(SchemaError::SchemaMismatch { path, .. }) => Some(path),
            SubmissionError::Schema(SchemaError::ReferenceNotFound { .. })
            | SubmissionError::MalformedSubmission { .. } => None,
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;
pub type SubmissionResult<T> = Result<T, SubmissionError>;
