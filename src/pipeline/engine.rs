use crate::algorithms::classifier::{AlignmentOutcomeClassifier, Classification, MatchStatistics};
use crate::algorithms::feature::{FeatureMatchAligner, FeatureSet};
use crate::algorithms::fiducial::FiducialMarkAligner;
use crate::algorithms::homography::HomographyEstimator;
use crate::algorithms::marks::AlignmentMarkDetector;
use crate::config::AlignmentConfig;
use crate::error::{AlignmentError, ConfigurationError};
use crate::logging::{get_correlation_id, AlignmentSpan};
use crate::pipeline::traits::{AlignmentEvent, AlignmentStrategy, NoopObserver, ProgressObserver};
use crate::pipeline::types::{
    AlignmentMark, AlignmentMethod, AlignmentResult, AlignmentStatus, ReferenceFormSpec,
    RotationAttemptRecord,
};
use crate::utils::validate_image_size;
use crate::visualization::DiagnosticWriter;
use image::GrayImage;
use std::path::Path;

pub type EngineResult<T> = std::result::Result<T, AlignmentError>;

/// A reference form that passed its own checks, with fiducials or keypoints
/// computed once.
///
/// Read-only after construction; share it across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PreparedReference {
    spec: ReferenceFormSpec,
    label: String,
    marks: Vec<AlignmentMark>,
    features: Option<FeatureSet>,
}

impl PreparedReference {
    pub fn new(spec: ReferenceFormSpec, config: &AlignmentConfig) -> EngineResult<Self> {
        validate_image_size(&spec.template_image)
            .map_err(|e| ConfigurationError::InvalidTemplate(e.to_string()))?;

        match spec.alignment_method {
            AlignmentMethod::FiducialMarks => {
                let expected = match spec.expected_mark_count {
                    Some(n) if n > 0 => n,
                    _ => return Err(ConfigurationError::MissingMarkCount.into()),
                };

                let detector = AlignmentMarkDetector::with_config(config.marks.clone());
                let marks = detector.detect(&spec.template_image)?;
                if marks.len() != expected {
                    tracing::error!(
                        found = marks.len(),
                        expected = expected,
                        "Reference template failed its mark count check"
                    );
                    return Err(ConfigurationError::MarkCountMismatch {
                        found: marks.len(),
                        expected,
                    }
                    .into());
                }

                tracing::debug!(marks = marks.len(), "Reference fiducials prepared");
                Ok(Self {
                    spec,
                    label: "reference".to_string(),
                    marks,
                    features: None,
                })
            }
            AlignmentMethod::AutomaticFeatureMatch => {
                let features = FeatureMatchAligner::new(config.features.clone()).extract(&spec.template_image)?;
                tracing::debug!(keypoints = features.len(), "Reference keypoints prepared");
                Ok(Self {
                    spec,
                    label: "reference".to_string(),
                    marks: Vec::new(),
                    features: Some(features),
                })
            }
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &ReferenceFormSpec {
        &self.spec
    }

    pub fn image(&self) -> &GrayImage {
        &self.spec.template_image
    }

    pub fn method(&self) -> AlignmentMethod {
        self.spec.alignment_method
    }

    pub fn expected_mark_count(&self) -> Option<usize> {
        match self.spec.alignment_method {
            AlignmentMethod::FiducialMarks => self.spec.expected_mark_count,
            AlignmentMethod::AutomaticFeatureMatch => None,
        }
    }

    /// Reference fiducials in reading order; empty in feature mode
    pub fn marks(&self) -> &[AlignmentMark] {
        &self.marks
    }

    pub fn features(&self) -> Option<&FeatureSet> {
        self.features.as_ref()
    }
}

/// Logs strategy progress on the alignment span before forwarding it
struct SpanObserver<'a> {
    span: &'a AlignmentSpan,
    inner: &'a dyn ProgressObserver,
}

impl ProgressObserver for SpanObserver<'_> {
    fn on_event(&self, event: &AlignmentEvent) {
        match *event {
            AlignmentEvent::RotationEvaluated { angle, marks_found } => {
                self.span.record_rotation_attempt(angle, marks_found)
            }
            AlignmentEvent::CorrespondenceResolved {
                matched,
                unmatched_source,
                unmatched_target,
            } => self
                .span
                .record_correspondence(matched, unmatched_source, unmatched_target),
            AlignmentEvent::Classified { .. } => {}
        }
        self.inner.on_event(event);
    }
}

/// Registers captured documents against a prepared reference form.
///
/// The engine holds configuration only. Each call is independent, so one
/// engine can serve many threads at once.
pub struct AlignmentEngine {
    config: AlignmentConfig,
    fiducial: FiducialMarkAligner,
    feature: FeatureMatchAligner,
    estimator: HomographyEstimator,
    classifier: AlignmentOutcomeClassifier,
}

impl Default for AlignmentEngine {
    fn default() -> Self {
        Self::new(AlignmentConfig::default())
    }
}

impl AlignmentEngine {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            fiducial: FiducialMarkAligner::new(&config),
            feature: FeatureMatchAligner::new(config.features.clone()),
            estimator: HomographyEstimator::new(config.homography.clone()),
            classifier: AlignmentOutcomeClassifier,
            config,
        }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Validate a reference form with this engine's settings
    pub fn prepare_reference(&self, spec: ReferenceFormSpec) -> EngineResult<PreparedReference> {
        PreparedReference::new(spec, &self.config)
    }

    fn strategy(&self, method: AlignmentMethod) -> &dyn AlignmentStrategy {
        match method {
            AlignmentMethod::FiducialMarks => &self.fiducial,
            AlignmentMethod::AutomaticFeatureMatch => &self.feature,
        }
    }

    pub fn align(
        &self,
        reference: &PreparedReference,
        captured: &GrayImage,
        working_directory: &Path,
    ) -> EngineResult<AlignmentResult> {
        self.align_with_observer(reference, captured, working_directory, &NoopObserver)
    }

    /// Align one captured image and write its diagnostics into `working_directory`.
    ///
    /// An image that cannot be aligned yields `Ok` with a `Failed` status;
    /// `Err` is reserved for malformed input and I/O or OpenCV faults.
    pub fn align_with_observer(
        &self,
        reference: &PreparedReference,
        captured: &GrayImage,
        working_directory: &Path,
        observer: &dyn ProgressObserver,
    ) -> EngineResult<AlignmentResult> {
        let strategy = self.strategy(reference.method());
        self.align_with_strategy(strategy, reference, captured, working_directory, observer)
    }

    /// Run the engine's estimation, classification and diagnostics on top of
    /// a caller-supplied strategy
    pub fn align_with_strategy(
        &self,
        strategy: &dyn AlignmentStrategy,
        reference: &PreparedReference,
        captured: &GrayImage,
        working_directory: &Path,
        observer: &dyn ProgressObserver,
    ) -> EngineResult<AlignmentResult> {
        validate_image_size(captured).map_err(|e| AlignmentError::InvalidInput(e.to_string()))?;

        let method = strategy.method();
        if method != reference.method() {
            return Err(AlignmentError::InvalidInput(format!(
                "a {} strategy cannot align against a {} reference",
                method,
                reference.method()
            )));
        }

        let span = AlignmentSpan::new(method, captured.dimensions(), get_correlation_id());
        let _entered = span.enter();

        let writer = DiagnosticWriter::new(working_directory)?;
        writer.discard_previous_outputs()?;
        let span_observer = SpanObserver {
            span: &span,
            inner: observer,
        };

        let report = strategy.correspond(reference, captured, &span_observer)?;

        let mut rotation_attempts = Vec::with_capacity(report.rotation_attempts.len());
        for attempt in &report.rotation_attempts {
            let image_path = writer.write_rotation_attempt(attempt)?;
            rotation_attempts.push(RotationAttemptRecord {
                rotation_angle: attempt.rotation_angle,
                marks_found: attempt.marks_found.clone(),
                image_path: Some(image_path),
            });
        }

        match report.statistics {
            MatchStatistics::FiducialMarks { marks_detected, .. } => {
                if let Some(angle) = report.accepted_rotation_angle {
                    span.record_rotation_choice(angle, marks_detected);
                }
            }
            MatchStatistics::AutomaticFeatureMatch {
                captured_keypoints,
                reference_keypoints,
                retained_matches,
            } => span.record_feature_matching(captured_keypoints, reference_keypoints, retained_matches),
        }

        let mut result = AlignmentResult {
            status: AlignmentStatus::Failed,
            method,
            accepted_rotation_angle: report.accepted_rotation_angle,
            matches_image_path: None,
            aligned_image_path: None,
            overlaid_image_path: None,
            fully_aligned: false,
            matched_points: report.source_points.len(),
            rotation_attempts,
            correspondence: report.correspondence.clone(),
            failure_reason: None,
            execution_time_ms: 0.0,
        };

        if let Some(failed) = self.classifier.precheck(&report.statistics) {
            return Ok(finish(result, failed, &span, observer));
        }

        result.matches_image_path = Some(writer.write_matches(
            &report.working_image,
            reference.image(),
            &report.source_points,
            &report.target_points,
        )?);

        let estimate = self
            .estimator
            .estimate(&report.source_points, &report.target_points)?;
        span.record_homography(
            report.source_points.len(),
            estimate.map(|e| e.inliers).unwrap_or(0),
            estimate.is_some(),
        );

        let classification = self.classifier.classify(&report.statistics, estimate.is_some());

        if let (true, Some(estimate)) = (classification.status.is_usable(), estimate) {
            let aligned = self.estimator.warp(
                &report.working_image,
                &estimate.homography,
                reference.image().dimensions(),
            )?;
            result.aligned_image_path = Some(writer.write_aligned(&aligned)?);
            result.overlaid_image_path = Some(writer.write_overlaid(reference.image(), &aligned)?);
        }

        Ok(finish(result, classification, &span, observer))
    }
}

fn finish(
    mut result: AlignmentResult,
    classification: Classification,
    span: &AlignmentSpan,
    observer: &dyn ProgressObserver,
) -> AlignmentResult {
    result.status = classification.status;
    result.fully_aligned = classification.fully_aligned;
    result.failure_reason = classification.failure_reason;
    result.execution_time_ms = span.record_outcome(result.status, result.fully_aligned);

    observer.on_event(&AlignmentEvent::Classified {
        status: result.status,
        fully_aligned: result.fully_aligned,
    });
    result
}
