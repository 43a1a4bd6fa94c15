//! SPDX-License-Identifier: GPL-3.0-or-later

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::Array2;
use rayon::prelude::*;

/// Single-channel float image with samples in `0.0..=1.0`.
pub type LumaF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Rec. 601 weights, the usual BGR/RGB to gray conversion.
const WEIGHT_R: f32 = 0.299;
const WEIGHT_G: f32 = 0.587;
const WEIGHT_B: f32 = 0.114;

/// Converts an RGB frame to normalised luminance.
/// Kept in floating point so a uniform brightness shift stays uniform after
/// downsampling instead of being rounded differently per pixel.
pub fn luminance(image: &RgbImage) -> LumaF32 {
    let (width, height) = image.dimensions();
    let luma: Vec<f32> = image
        .as_raw()
        .par_chunks_exact(3)
        .map(|px| {
            (WEIGHT_R * px[0] as f32 + WEIGHT_G * px[1] as f32 + WEIGHT_B * px[2] as f32) / 255.0
        })
        .collect();

    ImageBuffer::from_raw(width, height, luma).expect("Luminance buffer matches frame size")
}

/// Luminance, downsampled to the analysis resolution, in gray levels
/// (`0.0..=255.0`), as an (height, width) array.
pub fn project(image: &RgbImage, width: u32, height: u32) -> Array2<f32> {
    let luma = luminance(image);
    let resized = imageops::resize(&luma, width, height, FilterType::Triangle);

    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .expect("Resized buffer matches analysis size")
        .mapv_into(|v| v * 255.0)
}

/// Subtracts the array's own mean, so global illumination changes cancel out.
pub fn subtract_mean(mut projection: Array2<f32>) -> Array2<f32> {
    let mean = projection.mean().unwrap_or(0.0);
    projection.mapv_inplace(|v| v - mean);
    projection
}
