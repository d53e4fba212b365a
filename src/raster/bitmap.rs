//! 1-bit image buffer shared by renderers and the raster converter.

use std::fmt;
use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};

use crate::error::{PrintError, Result};

/// A 1-bit image. `true` is a black dot.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("black", &self.black_count())
            .finish()
    }
}

impl Bitmap {
    /// An all-white bitmap.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width * height],
        }
    }

    /// Build a bitmap by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Threshold a grayscale image: luma below `threshold` becomes black.
    pub fn from_gray(gray: &GrayImage, threshold: u8) -> Self {
        Self::from_fn(gray.width() as usize, gray.height() as usize, |x, y| {
            gray.get_pixel(x as u32, y as u32).0[0] < threshold
        })
    }

    /// Unpack MSB-first rows of `width.div_ceil(8)` bytes.
    pub fn from_packed(width: usize, height: usize, data: &[u8]) -> Result<Self> {
        let stride = width.div_ceil(8);
        if width == 0 || height == 0 || data.len() != stride * height {
            return Err(PrintError::Invariant(format!(
                "packed bitmap {}x{} needs {} bytes, got {}",
                width,
                height,
                stride * height,
                data.len()
            )));
        }
        Ok(Self::from_fn(width, height, |x, y| {
            data[y * stride + x / 8] & (0x80 >> (x % 8)) != 0
        }))
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at (x, y); anything outside the bitmap is white.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x]
    }

    /// Set a pixel; writes outside the bitmap are dropped.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, black: bool) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = black;
        }
    }

    pub fn row(&self, y: usize) -> &[bool] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn black_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// Fill a rectangle with black, clipped to the bitmap.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for yy in y.min(y_end)..y_end {
            for xx in x.min(x_end)..x_end {
                self.pixels[yy * self.width + xx] = true;
            }
        }
    }

    /// Outline a rectangle with lines `thickness` dots wide, drawn inward.
    pub fn rect_outline(&mut self, x: usize, y: usize, w: usize, h: usize, thickness: usize) {
        let t = thickness.min(w).min(h);
        self.fill_rect(x, y, w, t);
        self.fill_rect(x, (y + h).saturating_sub(t), w, t);
        self.fill_rect(x, y, t, h);
        self.fill_rect((x + w).saturating_sub(t), y, t, h);
    }

    /// Copy black pixels of `src` onto self with its top-left at (x, y).
    pub fn blit(&mut self, src: &Bitmap, x: usize, y: usize) {
        for sy in 0..src.height {
            for sx in 0..src.width {
                if src.get(sx, sy) {
                    self.set(x + sx, y + sy, true);
                }
            }
        }
    }

    /// Scale by an integer factor in both directions.
    pub fn scale(&self, factor: usize) -> Bitmap {
        if factor <= 1 {
            return self.clone();
        }
        Self::from_fn(self.width * factor, self.height * factor, |x, y| {
            self.get(x / factor, y / factor)
        })
    }

    /// Black → 0, white → 255.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([if self.get(x as usize, y as usize) { 0 } else { 255 }])
        })
    }

    /// Encode as a grayscale PNG for previews.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.to_gray()
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| PrintError::Invariant(format!("png encode: {}", e)))?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_white() {
        let bmp = Bitmap::new(10, 4);
        assert_eq!(bmp.black_count(), 0);
        assert!(!bmp.get(100, 100));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut bmp = Bitmap::new(10, 10);
        bmp.fill_rect(8, 8, 5, 5);
        assert_eq!(bmp.black_count(), 4);
    }

    #[test]
    fn test_rect_outline() {
        let mut bmp = Bitmap::new(10, 6);
        bmp.rect_outline(0, 0, 10, 6, 1);
        assert_eq!(bmp.black_count(), 2 * 10 + 2 * 4);
        assert!(bmp.get(0, 0) && bmp.get(9, 5));
        assert!(!bmp.get(5, 3));
    }

    #[test]
    fn test_from_packed() {
        let bmp = Bitmap::from_packed(10, 1, &[0x80, 0x40]).unwrap();
        assert!(bmp.get(0, 0));
        assert!(bmp.get(9, 0));
        assert_eq!(bmp.black_count(), 2);
        assert!(Bitmap::from_packed(10, 1, &[0x80]).is_err());
    }

    #[test]
    fn test_from_gray_threshold() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[0u8, 127, 128][x as usize]]));
        let bmp = Bitmap::from_gray(&gray, 128);
        assert_eq!(bmp.row(0), &[true, true, false]);
    }

    #[test]
    fn test_scale_and_blit() {
        let mut dot = Bitmap::new(1, 1);
        dot.set(0, 0, true);
        let big = dot.scale(3);
        assert_eq!((big.width(), big.height(), big.black_count()), (3, 3, 9));

        let mut canvas = Bitmap::new(5, 5);
        canvas.blit(&big, 3, 3);
        assert_eq!(canvas.black_count(), 4);
    }

    #[test]
    fn test_png_encodes() {
        let png = Bitmap::new(8, 8).to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
