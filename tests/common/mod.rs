#![allow(dead_code)]

use image::{GrayImage, Luma};

pub const FORM_WIDTH: u32 = 800;
pub const FORM_HEIGHT: u32 = 1000;
pub const MARK_SIZE: u32 = 40;
pub const MARK_COUNT: usize = 16;

/// Top-left corners of the 16 marks: two columns of eight, left column first
pub fn mark_positions() -> Vec<(u32, u32)> {
    let mut positions = Vec::with_capacity(MARK_COUNT);
    for x in [40, FORM_WIDTH - 40 - MARK_SIZE] {
        for row in 0..8 {
            positions.push((x, 60 + row * 120));
        }
    }
    positions
}

pub fn fill_rect(image: &mut GrayImage, x: u32, y: u32, width: u32, height: u32, value: u8) {
    for yy in y..(y + height).min(image.height()) {
        for xx in x..(x + width).min(image.width()) {
            image.put_pixel(xx, yy, Luma([value]));
        }
    }
}

pub fn blank_page() -> GrayImage {
    GrayImage::from_pixel(FORM_WIDTH, FORM_HEIGHT, Luma([255]))
}

/// Horizontal bars of varying length between the mark columns, standing in
/// for printed text lines
pub fn add_text_lines(image: &mut GrayImage) {
    let mut state: u32 = 12345;
    let mut next = || {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (state >> 16) & 0x7fff
    };

    for row in 0..16 {
        let y = 80 + row * 55;
        let mut x = 150 + next() % 60;
        while x < 600 {
            let length = 30 + next() % 120;
            let length = length.min(640 - x);
            let thickness = 6 + next() % 6;
            fill_rect(image, x, y, length, thickness, 20);
            x += length + 15 + next() % 40;
        }
    }
}

/// A form carrying every mark except the ones listed in `missing`
pub fn form_without_marks(missing: &[usize]) -> GrayImage {
    let mut image = blank_page();
    add_text_lines(&mut image);
    for (i, (x, y)) in mark_positions().into_iter().enumerate() {
        if !missing.contains(&i) {
            fill_rect(&mut image, x, y, MARK_SIZE, MARK_SIZE, 0);
        }
    }
    image
}

pub const LARGE_FORM_SIZE: u32 = 1400;
pub const LARGE_MARK_SIZE: u32 = 500;

/// Four large marks on an otherwise empty page.
///
/// The light share of a mark's bounding box grows with its tilt against the
/// pixel grid, and large marks keep the rounding error below that growth.
pub fn large_mark_form() -> GrayImage {
    let mut image = GrayImage::from_pixel(LARGE_FORM_SIZE, LARGE_FORM_SIZE, Luma([255]));
    for y in [150, 750] {
        for x in [150, 750] {
            fill_rect(&mut image, x, y, LARGE_MARK_SIZE, LARGE_MARK_SIZE, 0);
        }
    }
    image
}

/// Fill limit between an upright large mark (about 0.008) and one tilted by
/// half a degree (above 0.02)
pub fn skew_sensitive_config() -> form_alignment::AlignmentConfig {
    let mut config = form_alignment::AlignmentConfig::default();
    config.marks.max_fill_ratio = 0.015;
    config
}

pub fn reference_form() -> GrayImage {
    form_without_marks(&[])
}

pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    assert_eq!(a.dimensions(), b.dimensions());
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| (p[0] as i32 - q[0] as i32).unsigned_abs() as u64)
        .sum();
    total as f64 / (a.width() as f64 * a.height() as f64)
}
