//! Error types for the fill pipeline.
//!
//! [`FillError`] is fatal and aborts the pipeline; it always names the
//! [`Stage`] that failed. Per-field problems never become errors: they are
//! logged and collected as [`FieldIssue`]s in the fill report.

use crate::storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Open,
    AssignText,
    SerializeIntermediate,
    Overlay,
    Flatten,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Open => "open",
            Stage::AssignText => "assign_text",
            Stage::SerializeIntermediate => "serialize_intermediate",
            Stage::Overlay => "overlay",
            Stage::Flatten => "flatten",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable category of a [`FillError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Storage,
    Parse,
    Serialization,
    Worker,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Storage => "storage",
            ErrorKind::Parse => "parse",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Worker => "worker",
        }
    }
}

#[derive(Debug, Error)]
pub enum FillError {
    #[error("{stage}: storage failure: {source}")]
    Storage {
        stage: Stage,
        #[source]
        source: StorageError,
    },

    #[error("{stage}: cannot parse document: {source}")]
    Parse {
        stage: Stage,
        #[source]
        source: lopdf::Error,
    },

    #[error("{stage}: cannot serialize document: {source}")]
    Serialization {
        stage: Stage,
        #[source]
        source: lopdf::Error,
    },

    /// The worker running the pipeline panicked or was cancelled.
    #[error("fill worker failed: {0}")]
    Worker(String),
}

impl FillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FillError::Storage { .. } => ErrorKind::Storage,
            FillError::Parse { .. } => ErrorKind::Parse,
            FillError::Serialization { .. } => ErrorKind::Serialization,
            FillError::Worker(_) => ErrorKind::Worker,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            FillError::Storage { stage, .. }
            | FillError::Parse { stage, .. }
            | FillError::Serialization { stage, .. } => Some(*stage),
            FillError::Worker(_) => None,
        }
    }
}

/// Failure while mutating one resolved node.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("field node is not a dictionary")]
    NotADictionary,

    #[error(transparent)]
    Pdf(#[from] lopdf::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIssueKind {
    /// The value map names an id the schema does not define.
    SchemaMismatch,
    /// No document node matched the id.
    ResolutionFailure,
    /// The node was found but could not be mutated.
    AssignmentFailure,
    /// The overlay mark could not be placed.
    OverlayFailure,
}

impl FieldIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldIssueKind::SchemaMismatch => "schema_mismatch",
            FieldIssueKind::ResolutionFailure => "resolution_failure",
            FieldIssueKind::AssignmentFailure => "assignment_failure",
            FieldIssueKind::OverlayFailure => "overlay_failure",
        }
    }
}

/// A non-fatal, per-field problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field_id: String,
    pub kind: FieldIssueKind,
    pub detail: String,
}

impl FieldIssue {
    pub fn new(field_id: impl Into<String>, kind: FieldIssueKind, detail: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field_id, self.kind.as_str(), self.detail)
    }
}
