use crate::algorithms::classifier::MatchStatistics;
use crate::pipeline::engine::PreparedReference;
use crate::pipeline::types::{
    AlignmentMethod, AlignmentResult, AlignmentStatus, CorrespondenceSet, Point2, RotationAttempt,
};
use crate::Result;
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the persisted result inside a document's working directory
pub const RESULT_FILE_NAME: &str = "alignment_result.json";

/// A registration strategy: turns a captured image into point
/// correspondences against the prepared reference
pub trait AlignmentStrategy: Send + Sync {
    fn method(&self) -> AlignmentMethod;

    fn correspond(
        &self,
        reference: &PreparedReference,
        captured: &GrayImage,
        observer: &dyn ProgressObserver,
    ) -> Result<StrategyReport>;
}

/// Everything a strategy hands back to the engine
#[derive(Debug, Clone)]
pub struct StrategyReport {
    pub statistics: MatchStatistics,
    /// The image the homography is applied to
    pub working_image: GrayImage,
    /// Points in `working_image`, paired index-wise with `target_points`
    pub source_points: Vec<Point2>,
    pub target_points: Vec<Point2>,
    pub accepted_rotation_angle: Option<f64>,
    pub rotation_attempts: Vec<RotationAttempt>,
    pub correspondence: Option<CorrespondenceSet>,
}

/// Progress notifications emitted while a single document is aligned
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentEvent {
    RotationEvaluated {
        angle: f64,
        marks_found: usize,
    },
    CorrespondenceResolved {
        matched: usize,
        unmatched_source: usize,
        unmatched_target: usize,
    },
    Classified {
        status: AlignmentStatus,
        fully_aligned: bool,
    },
}

pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &AlignmentEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &AlignmentEvent) {}
}

/// Keeps every event in memory, mostly useful for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AlignmentEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlignmentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_event(&self, event: &AlignmentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Durable home for alignment results, keyed by document identity
pub trait ResultSink: Send + Sync {
    fn record(&self, document_id: &str, result: &AlignmentResult) -> Result<()>;
}

/// Writes each result as pretty JSON into `<root>/<document_id>/`
#[derive(Debug, Clone)]
pub struct JsonResultSink {
    root: PathBuf,
}

impl JsonResultSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn result_path(&self, document_id: &str) -> PathBuf {
        self.root.join(document_id).join(RESULT_FILE_NAME)
    }
}

impl ResultSink for JsonResultSink {
    fn record(&self, document_id: &str, result: &AlignmentResult) -> Result<()> {
        let path = self.result_path(document_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(result)?;
        std::fs::write(&path, content)?;
        tracing::debug!(document = document_id, path = %path.display(), "Alignment result recorded");
        Ok(())
    }
}
