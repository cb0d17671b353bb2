use crate::config::BatchConfig;
use crate::logging::{BatchSpan, CorrelationScope};
use crate::pipeline::engine::{AlignmentEngine, EngineResult, PreparedReference};
use crate::pipeline::traits::{JsonResultSink, ResultSink};
use crate::pipeline::types::{AlignmentMethod, AlignmentResult, AlignmentStatus, ReferenceFormSpec};
use crate::utils::load_image;
use crate::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// One captured document queued for alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub document_id: String,
    pub image_path: PathBuf,
}

impl BatchItem {
    pub fn new(document_id: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            document_id: document_id.into(),
            image_path: image_path.into(),
        }
    }

    /// Use the file stem as the document identity
    pub fn from_path(path: &Path) -> Self {
        let document_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(document_id, path)
    }
}

/// Collect every image file in `directory`, sorted by path
pub fn collect_batch_items(directory: &Path) -> Result<Vec<BatchItem>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.iter().map(|p| BatchItem::from_path(p)).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemOutcome {
    pub document_id: String,
    pub image_path: PathBuf,
    pub working_directory: PathBuf,
    pub result: Option<AlignmentResult>,
    /// Set when the document could not be processed at all
    pub error: Option<String>,
}

impl BatchItemOutcome {
    pub fn status(&self) -> Option<AlignmentStatus> {
        self.result.as_ref().map(|r| r.status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[BatchItemOutcome]) -> Self {
        outcomes.iter().fold(
            Self {
                total: outcomes.len(),
                ..Self::default()
            },
            |mut summary, outcome| {
                match outcome.status() {
                    Some(AlignmentStatus::Success) => summary.succeeded += 1,
                    Some(AlignmentStatus::PartialSuccess) => summary.partial += 1,
                    Some(AlignmentStatus::Failed) => summary.failed += 1,
                    None => summary.errored += 1,
                }
                summary
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub reference: String,
    pub method: AlignmentMethod,
    pub workers: usize,
    pub outcomes: Vec<BatchItemOutcome>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Aligns many documents against one reference on a bounded worker pool.
///
/// Documents are isolated from each other: a failure or fault in one is
/// recorded in its outcome and never stops the others.
pub struct BatchProcessor {
    engine: Arc<AlignmentEngine>,
    config: BatchConfig,
    sink: Option<Arc<dyn ResultSink>>,
}

impl BatchProcessor {
    pub fn new(engine: AlignmentEngine, config: BatchConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
            sink: None,
        }
    }

    /// Replace the default JSON sink
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn engine(&self) -> &AlignmentEngine {
        &self.engine
    }

    pub fn worker_count(&self) -> usize {
        if self.config.workers == 0 {
            rayon::current_num_threads()
        } else {
            self.config.workers
        }
    }

    /// Prepare the reference, then run the batch.
    ///
    /// A broken reference aborts here, before any captured image is read.
    pub fn run_with_spec(
        &self,
        spec: ReferenceFormSpec,
        items: &[BatchItem],
        output_root: &Path,
    ) -> EngineResult<BatchReport> {
        let reference = self.engine.prepare_reference(spec)?;
        Ok(self.run(&reference, items, output_root)?)
    }

    pub fn run(&self, reference: &PreparedReference, items: &[BatchItem], output_root: &Path) -> Result<BatchReport> {
        std::fs::create_dir_all(output_root)?;

        let workers = self.worker_count();
        let span = BatchSpan::new(items.len(), workers);
        let _entered = span.span().enter();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("align-worker-{}", i))
            .build()?;

        let sink: Option<Arc<dyn ResultSink>> = match &self.sink {
            Some(sink) => Some(Arc::clone(sink)),
            None if self.config.write_result_json => Some(Arc::new(JsonResultSink::new(output_root))),
            None => None,
        };

        let parent = span.span().clone();
        let outcomes: Vec<BatchItemOutcome> = pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let _entered = parent.enter();
                    self.process_item(reference, item, output_root, sink.as_deref())
                })
                .collect()
        });

        let summary = BatchSummary::from_outcomes(&outcomes);
        span.record_summary(summary.succeeded, summary.partial, summary.failed, summary.errored);

        Ok(BatchReport {
            generated_at: Utc::now(),
            reference: reference.label().to_string(),
            method: reference.method(),
            workers,
            outcomes,
            summary,
        })
    }

    fn process_item(
        &self,
        reference: &PreparedReference,
        item: &BatchItem,
        output_root: &Path,
        sink: Option<&dyn ResultSink>,
    ) -> BatchItemOutcome {
        let _correlation = CorrelationScope::begin();
        let working_directory = output_root.join(&item.document_id);
        let document_span = crate::correlation_span!(tracing::Level::INFO, "document", document = %item.document_id);
        let _entered = document_span.enter();
        tracing::debug!(path = %item.image_path.display(), "Processing document");

        let aligned = load_image(&item.image_path)
            .map_err(crate::error::AlignmentError::from)
            .and_then(|captured| self.engine.align(reference, &captured, &working_directory));

        match aligned {
            Ok(result) => {
                if let Some(sink) = sink {
                    if let Err(e) = sink.record(&item.document_id, &result) {
                        tracing::warn!(document = %item.document_id, error = %e, "Failed to record result");
                    }
                }
                BatchItemOutcome {
                    document_id: item.document_id.clone(),
                    image_path: item.image_path.clone(),
                    working_directory,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(document = %item.document_id, error = %e, "Document could not be processed");
                BatchItemOutcome {
                    document_id: item.document_id.clone(),
                    image_path: item.image_path.clone(),
                    working_directory,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
