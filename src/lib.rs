//! Fill interactive PDF forms from an extracted field schema and a sparse
//! value map.
//!
//! Text-like fields are written into the form interactively; checkbox and
//! radio values are drawn as vector marks above the page content, because
//! interactive states do not render reliably in every viewer. The result can
//! optionally be flattened. See [`pipeline`] for the stage layout.

pub mod assign;
pub mod config;
pub mod document;
pub mod error;
pub mod flatten;
pub mod form_schema;
pub mod overlay;
pub mod pipeline;
pub mod resolver;
pub mod service;
pub mod storage;

#[cfg(test)]
mod test_fixtures;

pub use config::{FillConfig, FillStrategy, PipelineOptions};
pub use document::{FieldNode, FormDocument, NodeSource, Resolution, ResolvedField};
pub use error::{ErrorKind, FieldIssue, FieldIssueKind, FillError, Stage};
pub use form_schema::{CurrentValues, FieldDefinition, FieldType, FieldValue, FormSchema, Rect};
pub use pipeline::{FillOutcome, FillReport, FillRequest, HybridFillPipeline};
pub use resolver::{FieldResolver, MatchRule, ResolverOptions};
pub use service::{FillJob, FillService, PreviewError, PreviewGenerator};
pub use storage::{FsStorage, Location, MemoryStorage, Storage, StorageError};
