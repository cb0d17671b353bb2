use crate::config::HomographyConfig;
use crate::pipeline::types::Point2;
use crate::utils::{grayimage_to_mat, mat_to_grayimage};
use crate::Result;
use image::GrayImage;
use opencv::calib3d;
use opencv::core::{self, Mat, Point2f, Scalar, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimum correspondences for a projective transform
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

/// 3x3 projective transform mapping captured pixels onto the reference frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub matrix: [[f64; 3]; 3],
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn from_mat(mat: &Mat) -> Result<Option<Self>> {
        if mat.empty() || mat.rows() != 3 || mat.cols() != 3 {
            return Ok(None);
        }

        let mut matrix = [[0.0; 3]; 3];
        for (r, row) in matrix.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = *mat.at_2d::<f64>(r as i32, c as i32)?;
            }
        }
        Ok(Some(Self { matrix }))
    }

    pub fn to_mat(&self) -> Result<Mat> {
        Ok(Mat::from_slice_2d(&self.matrix)?)
    }

    /// Determinant of the linear (upper-left 2x2) part
    pub fn linear_determinant(&self) -> f64 {
        let m = &self.matrix;
        m[0][0] * m[1][1] - m[0][1] * m[1][0]
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().flatten().all(|v| v.is_finite())
    }

    /// Degenerate transforms collapse the image and must not be applied
    pub fn is_degenerate(&self, min_determinant: f64) -> bool {
        !self.is_finite() || self.linear_determinant().abs() < min_determinant
    }

    pub fn apply(&self, point: Point2) -> Point2 {
        let m = &self.matrix;
        let w = m[2][0] * point.x + m[2][1] * point.y + m[2][2];
        Point2::new(
            (m[0][0] * point.x + m[0][1] * point.y + m[0][2]) / w,
            (m[1][0] * point.x + m[1][1] * point.y + m[1][2]) / w,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomographyEstimate {
    pub homography: Homography,
    pub points: usize,
    pub inliers: usize,
}

/// RANSAC homography fitting plus warping into the reference frame
#[derive(Debug, Clone, Default)]
pub struct HomographyEstimator {
    config: HomographyConfig,
}

impl HomographyEstimator {
    pub fn new(config: HomographyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HomographyConfig {
        &self.config
    }

    /// Fit a homography taking `source` points onto `target` points.
    ///
    /// Returns `None` when there are too few points, when OpenCV finds no
    /// model, or when the model is degenerate.
    pub fn estimate(&self, source: &[Point2], target: &[Point2]) -> Result<Option<HomographyEstimate>> {
        if source.len() != target.len() {
            anyhow::bail!(
                "Homography needs paired points, got {} source and {} target",
                source.len(),
                target.len()
            );
        }
        if source.len() < MIN_HOMOGRAPHY_POINTS {
            return Ok(None);
        }

        let src: Vector<Point2f> = source.iter().map(|&p| Point2f::from(p)).collect();
        let dst: Vector<Point2f> = target.iter().map(|&p| Point2f::from(p)).collect();

        let mut mask = Mat::default();
        let model = calib3d::find_homography(
            &src,
            &dst,
            &mut mask,
            calib3d::RANSAC,
            self.config.ransac_reproj_threshold,
        )?;

        let homography = match Homography::from_mat(&model)? {
            Some(h) => h,
            None => return Ok(None),
        };

        if homography.is_degenerate(self.config.min_determinant) {
            tracing::debug!(
                determinant = homography.linear_determinant(),
                "Rejected degenerate homography"
            );
            return Ok(None);
        }

        let inliers = if mask.empty() {
            source.len()
        } else {
            core::count_non_zero(&mask)? as usize
        };

        Ok(Some(HomographyEstimate {
            homography,
            points: source.len(),
            inliers,
        }))
    }

    /// Warp `image` into a frame of `size` (width, height)
    pub fn warp(&self, image: &GrayImage, homography: &Homography, size: (u32, u32)) -> Result<GrayImage> {
        let src = grayimage_to_mat(image)?;
        let m = homography.to_mat()?;

        let mut warped = Mat::default();
        imgproc::warp_perspective(
            &src,
            &mut warped,
            &m,
            Size::new(size.0 as i32, size.1 as i32),
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        mat_to_grayimage(&warped)
    }
}
