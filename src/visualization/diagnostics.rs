use crate::pipeline::types::{AlignmentMark, Point2, RotationAttempt};
use crate::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::path::{Path, PathBuf};

pub const MATCHES_FILE_NAME: &str = "matches.png";
pub const ALIGNED_FILE_NAME: &str = "aligned.png";
pub const OVERLAID_FILE_NAME: &str = "overlaid.png";

const MARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MATCH_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const MARK_OUTLINE_PX: u32 = 2;
const SIDE_BY_SIDE_GAP_PX: u32 = 10;

/// Writes the per-document diagnostic rasters into one working directory
#[derive(Debug, Clone)]
pub struct DiagnosticWriter {
    directory: PathBuf,
}

impl DiagnosticWriter {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Remove images left behind by an earlier run in the same directory
    pub fn discard_previous_outputs(&self) -> Result<()> {
        for name in [MATCHES_FILE_NAME, ALIGNED_FILE_NAME, OVERLAID_FILE_NAME] {
            let path = self.directory.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed stale diagnostic image"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn rotation_path(&self, angle: f64) -> PathBuf {
        self.directory.join(rotation_file_name(angle))
    }

    pub fn write_rotation_attempt(&self, attempt: &RotationAttempt) -> Result<PathBuf> {
        let path = self.rotation_path(attempt.rotation_angle);
        render_rotation_attempt(&attempt.debug_image, &attempt.marks_found).save(&path)?;
        Ok(path)
    }

    pub fn write_matches(
        &self,
        captured: &GrayImage,
        reference: &GrayImage,
        captured_points: &[Point2],
        reference_points: &[Point2],
    ) -> Result<PathBuf> {
        let path = self.directory.join(MATCHES_FILE_NAME);
        render_matches(captured, reference, captured_points, reference_points).save(&path)?;
        Ok(path)
    }

    pub fn write_aligned(&self, aligned: &GrayImage) -> Result<PathBuf> {
        let path = self.directory.join(ALIGNED_FILE_NAME);
        aligned.save(&path)?;
        Ok(path)
    }

    pub fn write_overlaid(&self, reference: &GrayImage, aligned: &GrayImage) -> Result<PathBuf> {
        let path = self.directory.join(OVERLAID_FILE_NAME);
        blend_overlay(reference, aligned)?.save(&path)?;
        Ok(path)
    }
}

pub fn rotation_file_name(angle: f64) -> String {
    // -0.0 would otherwise print as "-0.0"
    let angle = if angle == 0.0 { 0.0 } else { angle };
    format!("rotation_{:.1}.png", angle)
}

pub fn gray_to_rgb(image: &GrayImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Rotated frame with every detected mark outlined
pub fn render_rotation_attempt(image: &GrayImage, marks: &[AlignmentMark]) -> RgbImage {
    let mut canvas = gray_to_rgb(image);
    for mark in marks {
        draw_outline(&mut canvas, mark, MARK_OUTLINE_PX, MARK_COLOR);
    }
    canvas
}

/// Captured image on the left, reference on the right, one line per pair
pub fn render_matches(
    captured: &GrayImage,
    reference: &GrayImage,
    captured_points: &[Point2],
    reference_points: &[Point2],
) -> RgbImage {
    let offset_x = captured.width() + SIDE_BY_SIDE_GAP_PX;
    let width = offset_x + reference.width();
    let height = captured.height().max(reference.height());

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    image::imageops::replace(&mut canvas, &gray_to_rgb(captured), 0, 0);
    image::imageops::replace(&mut canvas, &gray_to_rgb(reference), offset_x as i64, 0);

    for (from, to) in captured_points.iter().zip(reference_points) {
        let to = Point2::new(to.x + offset_x as f64, to.y);
        draw_line(&mut canvas, *from, to, MATCH_COLOR);
    }
    canvas
}

/// Equal-weight blend of the reference and the aligned capture
pub fn blend_overlay(reference: &GrayImage, aligned: &GrayImage) -> Result<GrayImage> {
    if reference.dimensions() != aligned.dimensions() {
        anyhow::bail!(
            "Overlay needs equal sizes, reference is {:?} and aligned is {:?}",
            reference.dimensions(),
            aligned.dimensions()
        );
    }

    Ok(GrayImage::from_fn(reference.width(), reference.height(), |x, y| {
        let a = reference.get_pixel(x, y)[0] as u16;
        let b = aligned.get_pixel(x, y)[0] as u16;
        Luma([((a + b + 1) / 2) as u8])
    }))
}

fn draw_outline(canvas: &mut RgbImage, mark: &AlignmentMark, thickness: u32, color: Rgb<u8>) {
    let bounds = mark.bounds();
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let left = bounds.x as i64;
    let top = bounds.y as i64;
    let right = bounds.right() as i64 - 1;
    let bottom = bounds.bottom() as i64 - 1;

    for y in top..=bottom {
        for x in left..=right {
            if x < 0 || y < 0 || x >= w || y >= h {
                continue;
            }
            let t = thickness as i64;
            let on_border = x - left < t || right - x < t || y - top < t || bottom - y < t;
            if on_border {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn draw_line(canvas: &mut RgbImage, from: Point2, to: Point2, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as u32) < canvas.width() && (y0 as u32) < canvas.height() {
            canvas.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BoxBounds;
    use tempfile::TempDir;

    #[test]
    fn test_rotation_file_names() {
        assert_eq!(rotation_file_name(0.0), "rotation_0.0.png");
        assert_eq!(rotation_file_name(-0.0), "rotation_0.0.png");
        assert_eq!(rotation_file_name(1.5), "rotation_1.5.png");
        assert_eq!(rotation_file_name(-3.5), "rotation_-3.5.png");
    }

    #[test]
    fn test_outline_is_two_pixels_wide() {
        let image = GrayImage::from_pixel(60, 60, Luma([255]));
        let mark = AlignmentMark::new(BoxBounds::new(10, 10, 20, 20));
        let canvas = render_rotation_attempt(&image, &[mark]);

        assert_eq!(*canvas.get_pixel(10, 10), MARK_COLOR);
        assert_eq!(*canvas.get_pixel(11, 20), MARK_COLOR);
        assert_eq!(*canvas.get_pixel(29, 29), MARK_COLOR);
        assert_eq!(*canvas.get_pixel(12, 20), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(30, 30), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_outline_clips_at_edges() {
        let image = GrayImage::from_pixel(20, 20, Luma([0]));
        let mark = AlignmentMark::new(BoxBounds::new(-5, 15, 30, 30));
        let canvas = render_rotation_attempt(&image, &[mark]);
        assert_eq!(*canvas.get_pixel(5, 15), MARK_COLOR);
    }

    #[test]
    fn test_previous_outputs_are_discarded() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticWriter::new(dir.path()).unwrap();
        let image = GrayImage::from_pixel(8, 8, Luma([128]));
        writer.write_aligned(&image).unwrap();
        writer.write_overlaid(&image, &image).unwrap();
        writer.write_rotation_attempt(&RotationAttempt {
            rotation_angle: 0.5,
            marks_found: Vec::new(),
            debug_image: image.clone(),
        })
        .unwrap();

        writer.discard_previous_outputs().unwrap();
        assert!(!dir.path().join(ALIGNED_FILE_NAME).exists());
        assert!(!dir.path().join(OVERLAID_FILE_NAME).exists());
        assert!(dir.path().join(rotation_file_name(0.5)).exists());

        // Nothing left to remove is not an error
        writer.discard_previous_outputs().unwrap();
    }

    #[test]
    fn test_blend_is_even() {
        let reference = GrayImage::from_pixel(4, 4, Luma([200]));
        let aligned = GrayImage::from_pixel(4, 4, Luma([100]));
        let blended = blend_overlay(&reference, &aligned).unwrap();
        assert!(blended.pixels().all(|p| p[0] == 150));

        let small = GrayImage::new(2, 2);
        assert!(blend_overlay(&reference, &small).is_err());
    }

    #[test]
    fn test_matches_canvas_layout() {
        let captured = GrayImage::from_pixel(30, 40, Luma([0]));
        let reference = GrayImage::from_pixel(50, 20, Luma([0]));
        let canvas = render_matches(
            &captured,
            &reference,
            &[Point2::new(0.0, 0.0)],
            &[Point2::new(0.0, 0.0)],
        );
        assert_eq!(canvas.dimensions(), (30 + SIDE_BY_SIDE_GAP_PX + 50, 40));
        // Line crosses the white gap
        assert_eq!(*canvas.get_pixel(32, 0), MATCH_COLOR);
        // Gap below the line stays white
        assert_eq!(*canvas.get_pixel(32, 30), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_writer_uses_fixed_file_names() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticWriter::new(dir.path().join("doc")).unwrap();
        let image = GrayImage::from_pixel(16, 16, Luma([128]));

        let aligned = writer.write_aligned(&image).unwrap();
        let overlaid = writer.write_overlaid(&image, &image).unwrap();
        assert!(aligned.ends_with(ALIGNED_FILE_NAME));
        assert!(overlaid.ends_with(OVERLAID_FILE_NAME));
        assert!(aligned.exists() && overlaid.exists());
    }
}
