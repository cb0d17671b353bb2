//! Structured spans for the alignment engine and batch runner

use crate::pipeline::types::{AlignmentMethod, AlignmentStatus};
use std::time::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

/// Target of the per-document alignment span and its events
pub const ENGINE_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::pipeline::engine");
/// Target of the batch span and its summary
pub const BATCH_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::pipeline::batch");

/// Span covering one alignment run of a captured document
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
}

impl AlignmentSpan {
    pub fn new(method: AlignmentMethod, image_size: (u32, u32), correlation_id: Option<Uuid>) -> Self {
        let method = method.to_string();
        let span = if let Some(corr_id) = correlation_id {
            span!(
                target: ENGINE_TARGET,
                Level::INFO,
                "alignment",
                method = %method,
                image_width = image_size.0,
                image_height = image_size.1,
                correlation_id = %corr_id,
                best_angle = field::Empty,
                marks_found = field::Empty,
                matched_points = field::Empty,
                status = field::Empty,
                execution_time_ms = field::Empty,
            )
        } else {
            span!(
                target: ENGINE_TARGET,
                Level::INFO,
                "alignment",
                method = %method,
                image_width = image_size.0,
                image_height = image_size.1,
                best_angle = field::Empty,
                marks_found = field::Empty,
                matched_points = field::Empty,
                status = field::Empty,
                execution_time_ms = field::Empty,
            )
        };

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn record_rotation_attempt(&self, angle: f64, marks_found: usize) {
        tracing::debug!(
            target: ENGINE_TARGET,
            parent: &self.span,
            angle = angle,
            marks_found = marks_found,
            "Rotation candidate evaluated"
        );
    }

    pub fn record_rotation_choice(&self, angle: f64, marks_found: usize) {
        self.span.record("best_angle", angle);
        self.span.record("marks_found", marks_found);
        tracing::info!(
            target: ENGINE_TARGET,
            parent: &self.span,
            angle = angle,
            marks_found = marks_found,
            "Best rotation selected"
        );
    }

    pub fn record_correspondence(&self, matched: usize, unmatched_source: usize, unmatched_target: usize) {
        tracing::info!(
            target: ENGINE_TARGET,
            parent: &self.span,
            matched = matched,
            unmatched_source = unmatched_source,
            unmatched_target = unmatched_target,
            "Partial detection resolved by normalized-position matching"
        );
    }

    pub fn record_feature_matching(&self, captured_keypoints: usize, reference_keypoints: usize, retained: usize) {
        tracing::debug!(
            target: ENGINE_TARGET,
            parent: &self.span,
            captured_keypoints = captured_keypoints,
            reference_keypoints = reference_keypoints,
            retained_matches = retained,
            "Feature matching completed"
        );
    }

    pub fn record_homography(&self, points: usize, inliers: usize, valid: bool) {
        self.span.record("matched_points", points);
        if valid {
            tracing::debug!(
                target: ENGINE_TARGET,
                parent: &self.span,
                points = points,
                inliers = inliers,
                "Homography estimated"
            );
        } else {
            tracing::warn!(
                target: ENGINE_TARGET,
                parent: &self.span,
                points = points,
                "Homography estimation degenerate"
            );
        }
    }

    /// Record the final classification; returns elapsed milliseconds
    pub fn record_outcome(&self, status: AlignmentStatus, fully_aligned: bool) -> f64 {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.span.record("status", field::display(status));
        self.span.record("execution_time_ms", elapsed_ms);

        match status {
            AlignmentStatus::Failed => tracing::warn!(
                target: ENGINE_TARGET,
                parent: &self.span,
                execution_time_ms = elapsed_ms,
                "Alignment failed"
            ),
            _ => tracing::info!(
                target: ENGINE_TARGET,
                parent: &self.span,
                status = %status,
                fully_aligned = fully_aligned,
                execution_time_ms = elapsed_ms,
                "Alignment completed"
            ),
        }
        elapsed_ms
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span covering a batch of documents against one reference form
pub struct BatchSpan {
    span: Span,
    start_time: Instant,
}

impl BatchSpan {
    pub fn new(documents: usize, workers: usize) -> Self {
        let span = span!(
            target: BATCH_TARGET,
            Level::INFO,
            "batch",
            documents = documents,
            workers = workers,
            succeeded = field::Empty,
            failed = field::Empty,
        );
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn record_summary(&self, succeeded: usize, partial: usize, failed: usize, errored: usize) {
        self.span.record("succeeded", succeeded);
        self.span.record("failed", failed + errored);
        tracing::info!(
            target: BATCH_TARGET,
            parent: &self.span,
            succeeded = succeeded,
            partial = partial,
            failed = failed,
            errored = errored,
            elapsed_ms = self.start_time.elapsed().as_millis() as u64,
            "Batch completed"
        );
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
