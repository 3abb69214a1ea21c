//! Runs fill pipelines off the async executor.
//!
//! Each fill is one opaque unit of work submitted to the blocking pool,
//! gated by a semaphore so at most `max_concurrent` run at once. After a
//! successful fill an optional preview refresh is spawned into a supervised
//! task set; its outcome is only ever logged.

use crate::error::FillError;
use crate::form_schema::CurrentValues;
use crate::pipeline::{FillOutcome, FillRequest, HybridFillPipeline};
use crate::storage::Location;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview fill failed: {0}")]
    Fill(#[from] FillError),

    #[error("preview rendering failed: {0}")]
    Render(String),
}

/// Renders and disseminates preview images for a filled document.
pub trait PreviewGenerator: Send + Sync {
    /// Returns the number of images produced.
    fn generate(
        &self,
        form_id: &str,
        source: &Location,
        values: &CurrentValues,
    ) -> Result<usize, PreviewError>;
}

#[derive(Debug, Clone)]
pub struct FillJob {
    pub form_id: String,
    pub request: FillRequest,
}

pub struct FillService {
    pipeline: Arc<HybridFillPipeline>,
    permits: Arc<Semaphore>,
    preview: Option<Arc<dyn PreviewGenerator>>,
    background: Mutex<JoinSet<()>>,
}

impl FillService {
    pub fn new(pipeline: Arc<HybridFillPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            preview: None,
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewGenerator>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Run the pipeline on the blocking pool and return its outcome.
    pub async fn fill(&self, job: FillJob) -> Result<FillOutcome, FillError> {
        let outcome = run_blocking(
            self.pipeline.clone(),
            self.permits.clone(),
            job.request.clone(),
        )
        .await?;

        if let Some(preview) = &self.preview {
            self.spawn_preview(preview.clone(), job);
        }
        Ok(outcome)
    }

    fn spawn_preview(&self, preview: Arc<dyn PreviewGenerator>, job: FillJob) {
        let pipeline = self.pipeline.clone();
        let permits = self.permits.clone();
        let mut tasks = self.background.lock().unwrap_or_else(|e| e.into_inner());

        // reap finished follow-ups so the set does not grow without bound
        while let Some(done) = tasks.try_join_next() {
            log_join(done);
        }

        tasks.spawn(async move {
            let form_id = job.form_id.clone();
            match refresh_preview(pipeline, permits, preview, job).await {
                Ok(images) => tracing::info!(form_id, images, "preview refreshed"),
                Err(e) => tracing::error!(form_id, error = %e, "preview refresh failed"),
            }
        });
    }

    /// Wait for outstanding preview refreshes.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut guard = self.background.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        while let Some(done) = tasks.join_next().await {
            log_join(done);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "preview task panicked");
    }
}

async fn run_blocking(
    pipeline: Arc<HybridFillPipeline>,
    permits: Arc<Semaphore>,
    request: FillRequest,
) -> Result<FillOutcome, FillError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| FillError::Worker(e.to_string()))?;
    tokio::task::spawn_blocking(move || pipeline.run(&request))
        .await
        .map_err(|e| FillError::Worker(e.to_string()))?
}

async fn refresh_preview(
    pipeline: Arc<HybridFillPipeline>,
    permits: Arc<Semaphore>,
    preview: Arc<dyn PreviewGenerator>,
    job: FillJob,
) -> Result<usize, PreviewError> {
    let FillJob { form_id, request } = job;
    let values = request.values.clone();

    let source = if values.is_empty() {
        request.source.clone()
    } else {
        let preview_request = FillRequest {
            flatten: false,
            namespace: format!("{}/preview", request.namespace),
            ..request
        };
        run_blocking(pipeline, permits.clone(), preview_request)
            .await?
            .location
    };

    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| PreviewError::Render(e.to_string()))?;
    tokio::task::spawn_blocking(move || preview.generate(&form_id, &source, &values))
        .await
        .map_err(|e| PreviewError::Render(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineOptions;
    use crate::form_schema::{FieldDefinition, FieldType, FormSchema, Rect};
    use crate::storage::{MemoryStorage, Storage};
    use crate::test_fixtures::{FixtureField, form_pdf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPreview {
        calls: Mutex<Vec<(String, Location)>>,
        fail: bool,
    }

    impl PreviewGenerator for RecordingPreview {
        fn generate(
            &self,
            form_id: &str,
            source: &Location,
            _values: &CurrentValues,
        ) -> Result<usize, PreviewError> {
            self.calls
                .lock()
                .unwrap()
                .push((form_id.to_string(), source.clone()));
            if self.fail {
                return Err(PreviewError::Render("renderer offline".into()));
            }
            Ok(1)
        }
    }

    fn setup(values: CurrentValues) -> (Arc<MemoryStorage>, FillJob) {
        let storage = Arc::new(MemoryStorage::new());
        let source = storage.insert("mem://orig.pdf", form_pdf(&[FixtureField::text("1001")], 1));
        let job = FillJob {
            form_id: "abc".into(),
            request: FillRequest {
                schema: FormSchema::new(vec![FieldDefinition {
                    id: "f_1001".into(),
                    field_type: FieldType::Text,
                    page: 1,
                    rect: Rect::from([0.0; 4]),
                }]),
                values,
                source,
                flatten: true,
                namespace: "forms/abc".into(),
            },
        };
        (storage, job)
    }

    fn service(storage: Arc<MemoryStorage>) -> FillService {
        let pipeline = HybridFillPipeline::new(storage, PipelineOptions::default());
        FillService::new(Arc::new(pipeline), 2)
    }

    #[tokio::test]
    async fn preview_runs_unflattened_fill_into_preview_namespace() {
        let mut values = CurrentValues::new();
        values.insert("f_1001".into(), "Jane".into());
        let (storage, job) = setup(values);
        let preview = Arc::new(RecordingPreview::default());
        let service = service(storage.clone()).with_preview(preview.clone());

        let outcome = service.fill(job).await.unwrap();
        service.shutdown().await;

        assert!(outcome.location.as_str().starts_with("mem://forms/abc/"));
        let calls = preview.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "abc");
        assert!(calls[0].1.as_str().starts_with("mem://forms/abc/preview/"));
        // the preview copy keeps its form
        let bytes = storage.resolve(&calls[0].1).unwrap();
        assert!(crate::document::FormDocument::open(&bytes)
            .unwrap()
            .has_interactive_form());
    }

    #[tokio::test]
    async fn preview_of_empty_values_uses_original() {
        let (storage, job) = setup(CurrentValues::new());
        let source = job.request.source.clone();
        let preview = Arc::new(RecordingPreview::default());
        let service = service(storage.clone()).with_preview(preview.clone());

        service.fill(job).await.unwrap();
        service.shutdown().await;

        assert_eq!(preview.calls.lock().unwrap()[0].1, source);
        assert!(storage.list("forms/abc/preview").is_empty());
    }

    #[tokio::test]
    async fn preview_failure_does_not_affect_fill() {
        let (storage, job) = setup(CurrentValues::new());
        let preview = Arc::new(RecordingPreview {
            fail: true,
            ..Default::default()
        });
        let service = service(storage).with_preview(preview.clone());
        assert!(service.fill(job).await.is_ok());
        service.shutdown().await;
        assert_eq!(preview.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_fills_of_one_form_are_independent() {
        let (storage, job) = setup({
            let mut v = CurrentValues::new();
            v.insert("f_1001".into(), "x".into());
            v
        });
        let service = Arc::new(service(storage.clone()));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = service.clone();
            let job = job.clone();
            let finished = finished.clone();
            handles.push(tokio::spawn(async move {
                let outcome = service.fill(job).await.unwrap();
                finished.fetch_add(1, Ordering::SeqCst);
                outcome.location
            }));
        }
        let mut locations = Vec::new();
        for h in handles {
            locations.push(h.await.unwrap());
        }
        locations.sort();
        locations.dedup();
        assert_eq!(locations.len(), 6);
        assert_eq!(finished.load(Ordering::SeqCst), 6);
        assert_eq!(storage.list("forms/abc").len(), 6);
    }

    #[tokio::test]
    async fn fatal_errors_propagate() {
        let (storage, mut job) = setup(CurrentValues::new());
        job.request.source = Location::from("mem://gone.pdf");
        let err = service(storage).fill(job).await.unwrap_err();
        assert_eq!(err.stage(), Some(crate::error::Stage::Open));
    }
}
