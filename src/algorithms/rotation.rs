use crate::algorithms::marks::AlignmentMarkDetector;
use crate::config::RotationSearchConfig;
use crate::pipeline::types::RotationAttempt;
use crate::utils::{grayimage_to_mat, mat_to_grayimage};
use crate::Result;
use image::GrayImage;
use opencv::core::{Mat, Point2f, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

/// Outcome of trying every candidate rotation on a captured image
#[derive(Debug, Clone)]
pub struct RotationSearchResult {
    pub attempts: Vec<RotationAttempt>,
    /// Index into `attempts` of the selected candidate
    pub best_index: usize,
    /// Captured image rotated by the selected angle
    pub rotated_image: GrayImage,
}

impl RotationSearchResult {
    pub fn best(&self) -> &RotationAttempt {
        &self.attempts[self.best_index]
    }

    pub fn best_angle(&self) -> f64 {
        self.best().rotation_angle
    }
}

/// Exhaustive search over a fixed set of small rotations
pub struct RotationSearch {
    detector: AlignmentMarkDetector,
    angles: Vec<f64>,
}

impl RotationSearch {
    pub fn new(detector: AlignmentMarkDetector, config: &RotationSearchConfig) -> Self {
        Self {
            detector,
            angles: config.candidate_angles(),
        }
    }

    pub fn candidate_angles(&self) -> &[f64] {
        &self.angles
    }

    /// Evaluate every candidate angle; none are skipped.
    ///
    /// `on_attempt` is called after each candidate with its angle and mark count.
    pub fn search<F>(&self, captured: &GrayImage, mut on_attempt: F) -> Result<RotationSearchResult>
    where
        F: FnMut(f64, usize),
    {
        let captured_mat = grayimage_to_mat(captured)?;
        let mut attempts = Vec::with_capacity(self.angles.len());

        for &angle in &self.angles {
            let rotated = if angle == 0.0 {
                captured.clone()
            } else {
                mat_to_grayimage(&rotate_mat(&captured_mat, angle)?)?
            };

            let marks = self.detector.detect(&rotated)?;
            on_attempt(angle, marks.len());

            attempts.push(RotationAttempt {
                rotation_angle: angle,
                marks_found: marks,
                debug_image: rotated,
            });
        }

        let best_index = select_best_attempt(&attempts)
            .ok_or_else(|| anyhow::anyhow!("Rotation search requires at least one candidate angle"))?;

        let rotated_image = attempts[best_index].debug_image.clone();

        Ok(RotationSearchResult {
            attempts,
            best_index,
            rotated_image,
        })
    }
}

/// Pick the attempt with the most marks; equal counts prefer the angle
/// closest to zero, and equal magnitudes keep the earlier evaluated angle.
pub fn select_best_attempt(attempts: &[RotationAttempt]) -> Option<usize> {
    let counts: Vec<(f64, usize)> = attempts
        .iter()
        .map(|a| (a.rotation_angle, a.mark_count()))
        .collect();
    select_best_by_count(&counts)
}

pub(crate) fn select_best_by_count(candidates: &[(f64, usize)]) -> Option<usize> {
    let mut best: Option<usize> = None;

    for (i, &(angle, count)) in candidates.iter().enumerate() {
        let replace = match best {
            None => true,
            Some(b) => {
                let (best_angle, best_count) = candidates[b];
                count > best_count || (count == best_count && angle.abs() < best_angle.abs())
            }
        };
        if replace {
            best = Some(i);
        }
    }

    best
}

/// Rotate about the image center with bilinear interpolation, keeping the size
pub fn rotate_mat(image: &Mat, angle_degrees: f64) -> Result<Mat> {
    let center = Point2f::new(image.cols() as f32 / 2.0, image.rows() as f32 / 2.0);
    let rotation = imgproc::get_rotation_matrix_2d(center, angle_degrees, 1.0)?;

    let mut rotated = Mat::default();
    imgproc::warp_affine(
        image,
        &mut rotated,
        &rotation,
        image.size()?,
        imgproc::INTER_LINEAR,
        opencv::core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;
    Ok(rotated)
}

pub fn rotate_image(image: &GrayImage, angle_degrees: f64) -> Result<GrayImage> {
    if angle_degrees == 0.0 {
        return Ok(image.clone());
    }
    let mat = grayimage_to_mat(image)?;
    mat_to_grayimage(&rotate_mat(&mat, angle_degrees)?)
}
