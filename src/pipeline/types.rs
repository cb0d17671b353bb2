use image::GrayImage;
use opencv::core::{Point2f, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Integer pixel rectangle in the coordinate space of some image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoxBounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }
}

impl From<Rect> for BoxBounds {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width.max(0) as u32,
            height: rect.height.max(0) as u32,
        }
    }
}

impl From<BoxBounds> for Rect {
    fn from(bounds: BoxBounds) -> Self {
        Rect::new(
            bounds.x,
            bounds.y,
            bounds.width as i32,
            bounds.height as i32,
        )
    }
}

/// Serializable 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<Point2f> for Point2 {
    fn from(pt: Point2f) -> Self {
        Self {
            x: pt.x as f64,
            y: pt.y as f64,
        }
    }
}

impl From<Point2> for Point2f {
    fn from(pt: Point2) -> Self {
        Point2f::new(pt.x as f32, pt.y as f32)
    }
}

/// A detected fiducial: a roughly square, mostly dark region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentMark {
    bounds: BoxBounds,
}

impl AlignmentMark {
    pub(crate) fn new(bounds: BoxBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> BoxBounds {
        self.bounds
    }

    pub fn x(&self) -> i32 {
        self.bounds.x
    }

    pub fn y(&self) -> i32 {
        self.bounds.y
    }

    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    pub fn center(&self) -> Point2 {
        Point2::new(
            self.bounds.x as f64 + self.bounds.width as f64 / 2.0,
            self.bounds.y as f64 + self.bounds.height as f64 / 2.0,
        )
    }

    /// Corners in the order top-left, top-right, bottom-left, bottom-right
    pub fn corners(&self) -> [Point2; 4] {
        let left = self.bounds.x as f64;
        let top = self.bounds.y as f64;
        let right = self.bounds.right() as f64;
        let bottom = self.bounds.bottom() as f64;
        [
            Point2::new(left, top),
            Point2::new(right, top),
            Point2::new(left, bottom),
            Point2::new(right, bottom),
        ]
    }
}

/// Marks found on the captured image at one candidate rotation
#[derive(Debug, Clone)]
pub struct RotationAttempt {
    pub rotation_angle: f64,
    pub marks_found: Vec<AlignmentMark>,
    /// The rotated frame the detector ran on
    pub debug_image: GrayImage,
}

impl RotationAttempt {
    pub fn mark_count(&self) -> usize {
        self.marks_found.len()
    }
}

/// Persisted view of a rotation attempt, kept for operator diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationAttemptRecord {
    pub rotation_angle: f64,
    pub marks_found: Vec<AlignmentMark>,
    pub image_path: Option<PathBuf>,
}

/// Source point that found a partner in the target list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub source_index: usize,
    pub target_index: usize,
    pub source: Point2,
    pub target: Point2,
    /// Distance between the two points after unit-square normalization
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedPoint {
    pub index: usize,
    pub point: Point2,
}

/// Result of pairing two point lists by normalized position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub matched_pairs: Vec<MatchedPair>,
    pub unmatched_source: Vec<UnmatchedPoint>,
    pub unmatched_target: Vec<UnmatchedPoint>,
}

impl CorrespondenceSet {
    pub fn is_empty(&self) -> bool {
        self.matched_pairs.is_empty()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.matched_pairs.iter().map(|p| p.distance).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    AutomaticFeatureMatch,
    FiducialMarks,
}

impl fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentMethod::AutomaticFeatureMatch => write!(f, "automatic-feature-match"),
            AlignmentMethod::FiducialMarks => write!(f, "fiducial-marks"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    Success,
    /// Reported upward as a warning: aligned output exists but is degraded
    PartialSuccess,
    Failed,
}

impl AlignmentStatus {
    pub fn is_usable(&self) -> bool {
        !matches!(self, AlignmentStatus::Failed)
    }
}

impl fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentStatus::Success => write!(f, "success"),
            AlignmentStatus::PartialSuccess => write!(f, "warning"),
            AlignmentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reference form as supplied by the caller
#[derive(Debug, Clone)]
pub struct ReferenceFormSpec {
    pub template_image: GrayImage,
    pub alignment_method: AlignmentMethod,
    /// Required (and positive) for `FiducialMarks`, ignored otherwise
    pub expected_mark_count: Option<usize>,
}

impl ReferenceFormSpec {
    pub fn fiducial(template_image: GrayImage, expected_mark_count: usize) -> Self {
        Self {
            template_image,
            alignment_method: AlignmentMethod::FiducialMarks,
            expected_mark_count: Some(expected_mark_count),
        }
    }

    pub fn feature_match(template_image: GrayImage) -> Self {
        Self {
            template_image,
            alignment_method: AlignmentMethod::AutomaticFeatureMatch,
            expected_mark_count: None,
        }
    }
}

/// Outcome of aligning one captured image against a reference form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub status: AlignmentStatus,
    pub method: AlignmentMethod,
    pub accepted_rotation_angle: Option<f64>,
    pub matches_image_path: Option<PathBuf>,
    pub aligned_image_path: Option<PathBuf>,
    pub overlaid_image_path: Option<PathBuf>,
    pub fully_aligned: bool,
    /// Point correspondences fed into homography estimation
    pub matched_points: usize,
    pub rotation_attempts: Vec<RotationAttemptRecord>,
    pub correspondence: Option<CorrespondenceSet>,
    pub failure_reason: Option<String>,
    pub execution_time_ms: f64,
}

impl AlignmentResult {
    pub fn is_failed(&self) -> bool {
        self.status == AlignmentStatus::Failed
    }
}
