//! Grayscale page raster.

use std::path::Path;

use image::{GrayImage, Luma, imageops};

use crate::error::Result;
use crate::geometry::BBox;
use crate::rotation::Rotation;

/// Pixel value at or below which a pixel counts as ink.
pub const INK_THRESHOLD: u8 = 127;

/// An 8-bit grayscale image, optionally known to be binary (0/255 only).
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pixels: GrayImage,
    binary: bool,
}

impl Raster {
    pub fn new(pixels: GrayImage) -> Self {
        let binary = pixels.pixels().all(|p| p[0] == 0 || p[0] == 255);
        Self { pixels, binary }
    }

    /// Blank (white) raster.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, Luma([255])),
            binary: true,
        }
    }

    pub fn from_fn<F: FnMut(u32, u32) -> u8>(width: u32, height: u32, mut f: F) -> Self {
        Self::new(GrayImage::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(image::open(path)?.to_luma8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels.get_pixel(x, y)[0]
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        self.get(x, y) <= INK_THRESHOLD
    }

    /// Paint a filled rectangle, clipped to the raster.
    pub fn fill_rect(&mut self, bbox: BBox, value: u8) {
        let (x0, y0, x1, y1) = self.clamp(bbox);
        for y in y0..y1 {
            for x in x0..x1 {
                self.pixels.put_pixel(x, y, Luma([value]));
            }
        }
        self.binary = self.binary && (value == 0 || value == 255);
    }

    /// Threshold into a binary copy.
    pub fn thresholded(&self, threshold: u8) -> Raster {
        let mut out = self.pixels.clone();
        for p in out.pixels_mut() {
            p[0] = if p[0] <= threshold { 0 } else { 255 };
        }
        Raster {
            pixels: out,
            binary: true,
        }
    }

    /// Copy of the region under `bbox` (clipped to the raster).
    pub fn clip(&self, bbox: BBox) -> Raster {
        let (x0, y0, x1, y1) = self.clamp(bbox);
        let sub = imageops::crop_imm(&self.pixels, x0, y0, x1 - x0, y1 - y0).to_image();
        Raster {
            pixels: sub,
            binary: self.binary,
        }
    }

    /// Rotated copy (clockwise).
    pub fn rotated(&self, rotation: Rotation) -> Raster {
        let pixels = match rotation {
            Rotation::Deg0 => self.pixels.clone(),
            Rotation::Deg90 => imageops::rotate90(&self.pixels),
            Rotation::Deg180 => imageops::rotate180(&self.pixels),
            Rotation::Deg270 => imageops::rotate270(&self.pixels),
        };
        Raster {
            pixels,
            binary: self.binary,
        }
    }

    /// Resized copy; binary rasters stay binary by nearest sampling.
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        let filter = if self.binary {
            imageops::FilterType::Nearest
        } else {
            imageops::FilterType::Triangle
        };
        Raster {
            pixels: imageops::resize(&self.pixels, width.max(1), height.max(1), filter),
            binary: self.binary,
        }
    }

    fn clamp(&self, bbox: BBox) -> (u32, u32, u32, u32) {
        let w = self.width() as f64;
        let h = self.height() as f64;
        let x0 = bbox.xlt.clamp(0.0, w) as u32;
        let y0 = bbox.ylt.clamp(0.0, h) as u32;
        let x1 = bbox.xrb.clamp(0.0, w) as u32;
        let y1 = bbox.yrb.clamp(0.0, h) as u32;
        (x0, y0, x1.max(x0), y1.max(y0))
    }
}
