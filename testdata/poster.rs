//! Synthetic planar target shared by the workspace's tests.
#![allow(dead_code)]

use image::{GrayImage, Luma};

pub const SIZE: u32 = 100;
pub const BACKGROUND: u8 = 40;
pub const FOREGROUND: u8 = 220;

/// `(x, y, width, height)` of the bright rectangles.
pub const RECTS: [(u32, u32, u32, u32); 9] = [
    (22, 24, 14, 9),
    (41, 22, 8, 17),
    (58, 27, 15, 11),
    (25, 45, 10, 18),
    (44, 48, 19, 7),
    (66, 47, 9, 13),
    (30, 70, 16, 6),
    (52, 62, 7, 14),
    (63, 68, 12, 9),
];

/// `SIZE x SIZE` poster: irregular bright rectangles on a dark field.
pub fn poster() -> GrayImage {
    GrayImage::from_fn(SIZE, SIZE, |x, y| {
        let inside = RECTS
            .iter()
            .any(|&(rx, ry, w, h)| x >= rx && x < rx + w && y >= ry && y < ry + h);
        Luma([if inside { FOREGROUND } else { BACKGROUND }])
    })
}

/// `width x height` background with the poster pasted at `(x, y)`.
pub fn scene_with_poster_at(width: u32, height: u32, x: i64, y: i64) -> GrayImage {
    let mut frame = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    image::imageops::replace(&mut frame, &poster(), x, y);
    frame
}
