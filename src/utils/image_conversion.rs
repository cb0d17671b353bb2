use crate::Result;
use image::GrayImage;
use opencv::core::Mat;
use opencv::prelude::*;

/// Convert a GrayImage to an OpenCV Mat
pub fn grayimage_to_mat(image: &GrayImage) -> Result<Mat> {
    let (width, height) = image.dimensions();

    let mut mat = Mat::zeros(height as i32, width as i32, opencv::core::CV_8UC1)?.to_mat()?;

    // Freshly allocated matrices are continuous, so the buffer can be copied whole
    if mat.is_continuous() {
        mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
        return Ok(mat);
    }

    for (x, y, pixel) in image.enumerate_pixels() {
        *mat.at_2d_mut::<u8>(y as i32, x as i32)? = pixel[0];
    }

    Ok(mat)
}

/// Convert a single-channel 8-bit OpenCV Mat to a GrayImage
pub fn mat_to_grayimage(mat: &Mat) -> Result<GrayImage> {
    if mat.typ() != opencv::core::CV_8UC1 {
        return Err(anyhow::anyhow!(
            "Expected a CV_8UC1 matrix, got type {}",
            mat.typ()
        ));
    }

    let rows = mat.rows();
    let cols = mat.cols();

    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        let mut data = Vec::with_capacity((rows * cols) as usize);
        for y in 0..rows {
            for x in 0..cols {
                data.push(*mat.at_2d::<u8>(y, x)?);
            }
        }
        data
    };

    GrayImage::from_raw(cols as u32, rows as u32, data)
        .ok_or_else(|| anyhow::anyhow!("Failed to create GrayImage from Mat"))
}

/// Load an image from disk and convert it to grayscale
pub fn load_image(path: &std::path::Path) -> Result<GrayImage> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Image file does not exist: {}",
            path.display()
        ));
    }

    let img = image::open(path)?;
    Ok(img.to_luma8())
}

/// Validate that image has reasonable dimensions
pub fn validate_image_size(image: &GrayImage) -> Result<()> {
    validate_image_size_with_limits(image, 16, 20000)
}

/// Validate image size with custom limits
pub fn validate_image_size_with_limits(
    image: &GrayImage,
    min_size: u32,
    max_size: u32,
) -> Result<()> {
    let (width, height) = image.dimensions();

    if width < min_size || height < min_size {
        return Err(anyhow::anyhow!(
            "Image too small: {}x{}, minimum: {}x{}",
            width,
            height,
            min_size,
            min_size
        ));
    }

    if width > max_size || height > max_size {
        return Err(anyhow::anyhow!(
            "Image too large: {}x{}, maximum: {}x{}",
            width,
            height,
            max_size,
            max_size
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_mat_roundtrip_preserves_pixels() {
        let image = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let mat = grayimage_to_mat(&image).unwrap();
        assert_eq!(mat.rows(), 23);
        assert_eq!(mat.cols(), 37);
        assert_eq!(*mat.at_2d::<u8>(5, 10).unwrap(), image.get_pixel(10, 5)[0]);

        let back = mat_to_grayimage(&mat).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_size_limits() {
        assert!(validate_image_size(&GrayImage::new(8, 64)).is_err());
        assert!(validate_image_size(&GrayImage::new(64, 64)).is_ok());
        assert!(validate_image_size_with_limits(&GrayImage::new(64, 64), 8, 32).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image(std::path::Path::new("/nonexistent/form.png")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
