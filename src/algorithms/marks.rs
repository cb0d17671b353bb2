use crate::config::MarkDetectionConfig;
use crate::pipeline::types::{AlignmentMark, BoxBounds};
use crate::utils::grayimage_to_mat;
use crate::Result;
use image::GrayImage;
use opencv::core::{Mat, Point, Vector};
use opencv::imgproc;
use opencv::prelude::*;

/// Finds square, dark fiducials printed on a form.
///
/// The image is binarized with Otsu's method, every contour of the full
/// hierarchy is considered, and a contour is accepted when its bounding box
/// is roughly square and mostly dark.
#[derive(Debug, Clone, Default)]
pub struct AlignmentMarkDetector {
    config: MarkDetectionConfig,
}

impl AlignmentMarkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MarkDetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarkDetectionConfig {
        &self.config
    }

    pub fn detect(&self, image: &GrayImage) -> Result<Vec<AlignmentMark>> {
        let mat = grayimage_to_mat(image)?;
        self.detect_mat(&mat)
    }

    /// Detect marks on a single-channel 8-bit matrix
    pub fn detect_mat(&self, image: &Mat) -> Result<Vec<AlignmentMark>> {
        if image.empty() {
            return Ok(Vec::new());
        }

        let binary = binarize(image)?;
        let light = binary_to_mask(&binary)?;
        let cols = binary.cols() as usize;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            &binary,
            &mut contours,
            imgproc::RETR_TREE,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut marks = Vec::new();
        for contour in contours.iter() {
            let rect = imgproc::bounding_rect(&contour)?;
            if rect.width <= 0 || rect.height <= 0 {
                continue;
            }

            let bounds = BoxBounds::from(rect);
            let light_pixels = count_light_pixels(&light, cols, &bounds);
            if self.accepts(&bounds, light_pixels) {
                marks.push(AlignmentMark::new(bounds));
            }
        }

        tracing::trace!(
            contours = contours.len(),
            marks = marks.len(),
            "Alignment mark detection completed"
        );

        Ok(order_marks(marks))
    }

    /// Shape test applied to each contour's bounding box
    pub fn accepts(&self, bounds: &BoxBounds, light_pixels: u64) -> bool {
        if bounds.width == 0 || bounds.height == 0 {
            return false;
        }

        let side_ratio = bounds.height as f64 / bounds.width as f64;
        let fill_ratio = light_pixels as f64 / bounds.area() as f64;

        side_ratio >= self.config.min_side_ratio
            && side_ratio <= self.config.max_side_ratio
            && fill_ratio < self.config.max_fill_ratio
            && bounds.area() >= self.config.min_mark_area
    }
}

fn binarize(image: &Mat) -> Result<Mat> {
    let mut binary = Mat::default();
    imgproc::threshold(
        image,
        &mut binary,
        127.0,
        255.0,
        imgproc::THRESH_BINARY | imgproc::THRESH_OTSU,
    )?;
    Ok(binary)
}

/// Copy the binary image into a row-major bool buffer for fast box counting
fn binary_to_mask(binary: &Mat) -> Result<Vec<bool>> {
    if binary.is_continuous() {
        return Ok(binary.data_bytes()?.iter().map(|&v| v != 0).collect());
    }

    let mut mask = Vec::with_capacity((binary.rows() * binary.cols()) as usize);
    for y in 0..binary.rows() {
        for x in 0..binary.cols() {
            mask.push(*binary.at_2d::<u8>(y, x)? != 0);
        }
    }
    Ok(mask)
}

fn count_light_pixels(mask: &[bool], cols: usize, bounds: &BoxBounds) -> u64 {
    let x0 = bounds.x.max(0) as usize;
    let y0 = bounds.y.max(0) as usize;
    let x1 = (bounds.right().max(0) as usize).min(cols);
    let rows = mask.len() / cols.max(1);
    let y1 = (bounds.bottom().max(0) as usize).min(rows);

    (y0..y1)
        .map(|y| {
            mask[y * cols + x0..y * cols + x1]
                .iter()
                .filter(|&&light| light)
                .count() as u64
        })
        .sum()
}

/// Stable reading order for fiducials.
///
/// Marks are sorted by x (ties by y), split at the median into a left and a
/// right half, and each half is sorted top to bottom. Positional
/// correspondence between two mark lists relies on this order.
pub fn order_marks(mut marks: Vec<AlignmentMark>) -> Vec<AlignmentMark> {
    marks.sort_by_key(|m| (m.x(), m.y()));

    let split = marks.len() / 2;
    let mut right = marks.split_off(split);
    marks.sort_by_key(|m| (m.y(), m.x()));
    right.sort_by_key(|m| (m.y(), m.x()));
    marks.extend(right);
    marks
}
