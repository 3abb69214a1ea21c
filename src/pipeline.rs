//! The hybrid fill pipeline.
//!
//! ```text
//! OPEN ──▶ ASSIGN_TEXT ──▶ SERIALIZE_INTERMEDIATE ──▶ OVERLAY ──▶ [FLATTEN] ──▶ PERSIST
//! (read)   (resolve+set)    (bytes)                   (reopen)    (reopen)      (write)
//! ```
//!
//! Storage is touched only at OPEN and PERSIST; every stage in between works
//! on a private in-memory copy. Stage failures are fatal and carry their
//! [`Stage`]; per-field failures are logged, recorded in the [`FillReport`],
//! and never stop the pipeline. Nothing is persisted unless every earlier
//! stage succeeded.

use crate::assign::Assignment;
use crate::config::{FillStrategy, PipelineOptions};
use crate::document::FormDocument;
use crate::error::{FieldIssue, FieldIssueKind, FillError, Stage};
use crate::form_schema::{CurrentValues, FormSchema};
use crate::resolver::FieldResolver;
use crate::storage::{Location, Storage};
use std::sync::Arc;

/// How many available field names to log when an id does not resolve.
const NAME_SAMPLE: usize = 10;

#[derive(Debug, Clone)]
pub struct FillRequest {
    pub schema: FormSchema,
    pub values: CurrentValues,
    /// Where the original document is stored.
    pub source: Location,
    pub flatten: bool,
    /// Logical output namespace, e.g. `forms/<id>`.
    pub namespace: String,
}

/// Per-run counters and the non-fatal issues met along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    pub text_assigned: usize,
    pub states_assigned: usize,
    pub marks_drawn: usize,
    pub flattened: bool,
    pub issues: Vec<FieldIssue>,
}

impl FillReport {
    fn issue(&mut self, field_id: &str, kind: FieldIssueKind, detail: String) {
        tracing::warn!(field_id, stage = %Stage::AssignText, kind = kind.as_str(), "{detail}");
        self.issues.push(FieldIssue::new(field_id, kind, detail));
    }

    pub fn issues_of(&self, kind: FieldIssueKind) -> impl Iterator<Item = &FieldIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }
}

#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub location: Location,
    pub report: FillReport,
}

pub struct HybridFillPipeline {
    storage: Arc<dyn Storage>,
    options: PipelineOptions,
    resolver: FieldResolver,
}

impl HybridFillPipeline {
    pub fn new(storage: Arc<dyn Storage>, options: PipelineOptions) -> Self {
        Self {
            storage,
            options,
            resolver: FieldResolver::new(options.resolver),
        }
    }

    /// Run every stage, from reading the original to persisting the result.
    pub fn run(&self, request: &FillRequest) -> Result<FillOutcome, FillError> {
        let span = tracing::info_span!("fill", namespace = %request.namespace);
        let _guard = span.enter();

        let original = self
            .storage
            .resolve(&request.source)
            .map_err(|source| FillError::Storage {
                stage: Stage::Open,
                source,
            })?;
        tracing::info!(stage = %Stage::Open, source = %request.source, bytes = original.len(), "loaded original");

        let (bytes, report) =
            self.fill_bytes(&original, &request.schema, &request.values, request.flatten)?;

        let location = self
            .storage
            .persist(&bytes, &request.namespace)
            .map_err(|source| FillError::Storage {
                stage: Stage::Persist,
                source,
            })?;
        tracing::info!(
            stage = %Stage::Persist,
            %location,
            bytes = bytes.len(),
            issues = report.issues.len(),
            "fill complete"
        );
        Ok(FillOutcome { location, report })
    }

    /// The in-memory stages: original bytes in, final bytes out.
    pub fn fill_bytes(
        &self,
        original: &[u8],
        schema: &FormSchema,
        values: &CurrentValues,
        flatten: bool,
    ) -> Result<(Vec<u8>, FillReport), FillError> {
        let mut report = FillReport::default();

        let mut doc = FormDocument::open(original).map_err(|source| FillError::Parse {
            stage: Stage::Open,
            source,
        })?;

        self.assign_fields(&mut doc, schema, values, &mut report);

        let intermediate = doc.serialize().map_err(|source| FillError::Serialization {
            stage: Stage::SerializeIntermediate,
            source,
        })?;
        drop(doc);

        let mut doc = FormDocument::open(&intermediate).map_err(|source| FillError::Parse {
            stage: Stage::Overlay,
            source,
        })?;
        if self.options.strategy == FillStrategy::Hybrid {
            let overlay = doc.render_overlay(schema, values);
            report.marks_drawn = overlay.marks_drawn;
            report.issues.extend(overlay.issues);
            tracing::info!(
                stage = %Stage::Overlay,
                marks = overlay.marks_drawn,
                pages = overlay.pages_touched,
                "overlay merged"
            );
        }
        let mut bytes = doc.serialize().map_err(|source| FillError::Serialization {
            stage: Stage::Overlay,
            source,
        })?;
        drop(doc);

        if flatten {
            let mut doc = FormDocument::open(&bytes).map_err(|source| FillError::Parse {
                stage: Stage::Flatten,
                source,
            })?;
            report.flattened = doc.flatten().map_err(|source| FillError::Parse {
                stage: Stage::Flatten,
                source,
            })?;
            bytes = doc.serialize().map_err(|source| FillError::Serialization {
                stage: Stage::Flatten,
                source,
            })?;
            tracing::info!(stage = %Stage::Flatten, had_form = report.flattened, "flattened");
        }

        Ok((bytes, report))
    }

    fn assign_fields(
        &self,
        doc: &mut FormDocument,
        schema: &FormSchema,
        values: &CurrentValues,
        report: &mut FillReport,
    ) {
        let lookup = schema.lookup();
        let assign_toggles = self.options.strategy == FillStrategy::Direct;
        let mut available: Option<Vec<String>> = None;

        for (field_id, value) in values {
            let Some(def) = lookup.get(field_id.as_str()) else {
                report.issue(
                    field_id,
                    FieldIssueKind::SchemaMismatch,
                    "id not in schema".to_string(),
                );
                continue;
            };
            let interactive =
                def.field_type.is_text_like() || (assign_toggles && def.field_type.is_toggle());
            if !interactive {
                continue;
            }

            let resolved = doc.resolve_field(&self.resolver, def);
            let Some(found) = resolved.resolution else {
                let names = available.get_or_insert_with(|| doc.field_names());
                let sample: Vec<&str> = names.iter().take(NAME_SAMPLE).map(String::as_str).collect();
                report.issue(
                    field_id,
                    FieldIssueKind::ResolutionFailure,
                    format!(
                        "no field node matches (stripped {:?}); {} named nodes, first: {:?}",
                        self.resolver.key(field_id).stripped,
                        names.len(),
                        sample
                    ),
                );
                continue;
            };

            match doc.assign(found.node, resolved.definition.field_type, value) {
                Ok(Assignment::Text(_)) => {
                    report.text_assigned += 1;
                    tracing::debug!(
                        field_id = field_id.as_str(),
                        stage = %Stage::AssignText,
                        field_type = resolved.definition.field_type.as_str(),
                        node = found.name.as_str(),
                        rule = %found.rule,
                        source = found.source.as_str(),
                        "assigned text"
                    );
                }
                Ok(Assignment::State(state)) => {
                    report.states_assigned += 1;
                    tracing::debug!(
                        field_id = field_id.as_str(),
                        stage = %Stage::AssignText,
                        field_type = resolved.definition.field_type.as_str(),
                        node = found.name.as_str(),
                        rule = %found.rule,
                        state = state.as_str(),
                        "assigned state"
                    );
                }
                Ok(Assignment::Skipped) => {
                    tracing::debug!(field_id = field_id.as_str(), stage = %Stage::AssignText, "empty value, skipped");
                }
                Err(e) => report.issue(field_id, FieldIssueKind::AssignmentFailure, e.to_string()),
            }
        }

        if report.text_assigned > 0 {
            if let Err(e) = doc.set_need_appearances() {
                // widget-only documents have no form dictionary to flag
                tracing::debug!(stage = %Stage::AssignText, error = %e, "NeedAppearances not set");
            }
        }
        tracing::info!(
            stage = %Stage::AssignText,
            values = values.len(),
            text = report.text_assigned,
            states = report.states_assigned,
            "assigned fields"
        );
    }
}
