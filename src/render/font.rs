//! Spleen bitmap faces used for label text.

use spleen_font::{FONT_6X12, FONT_8X16, FONT_12X24, PSF2Font};

use crate::error::{PrintError, Result};
use crate::raster::Bitmap;

/// The three Spleen cells bundled with the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Small,
    Medium,
    Large,
}

impl Face {
    const ALL: [Face; 3] = [Face::Small, Face::Medium, Face::Large];

    fn data(self) -> &'static [u8] {
        match self {
            Face::Small => FONT_6X12,
            Face::Medium => FONT_8X16,
            Face::Large => FONT_12X24,
        }
    }

    /// Cell size in dots: (width, height).
    pub fn cell(self) -> (usize, usize) {
        match self {
            Face::Small => (6, 12),
            Face::Medium => (8, 16),
            Face::Large => (12, 24),
        }
    }
}

/// A face at an integer scale, optionally emboldened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Font {
    pub face: Face,
    pub scale: usize,
    pub bold: bool,
}

impl Font {
    /// Pick the face and scale whose rendered height is closest to `size`
    /// dots. Ties go to the larger face.
    pub fn for_size(size: u32) -> Self {
        let size = size.max(1) as usize;
        let mut best = Font {
            face: Face::Small,
            scale: 1,
            bold: false,
        };
        let mut best_err = usize::MAX;
        for face in Face::ALL.into_iter().rev() {
            let (_, h) = face.cell();
            let scale = ((size + h / 2) / h).max(1);
            let err = (h * scale).abs_diff(size);
            if err < best_err {
                best = Font {
                    face,
                    scale,
                    bold: false,
                };
                best_err = err;
            }
        }
        best
    }

    pub fn bold(self) -> Self {
        Font { bold: true, ..self }
    }

    pub fn char_width(&self) -> usize {
        self.face.cell().0 * self.scale
    }

    pub fn line_height(&self) -> usize {
        self.face.cell().1 * self.scale
    }

    /// Width of `text` in dots when drawn with this font.
    pub fn text_width(&self, text: &str) -> usize {
        let n = text.chars().count();
        if n == 0 {
            return 0;
        }
        n * self.char_width() + usize::from(self.bold)
    }

    /// Rasterize `text` into its own bitmap.
    pub fn render(&self, text: &str) -> Result<Bitmap> {
        let mut psf = PSF2Font::new(self.face.data())
            .map_err(|_| PrintError::Invariant("spleen font data unreadable".into()))?;
        let (cw, ch) = self.face.cell();
        let mut line = Bitmap::new(text.chars().count() * cw + usize::from(self.bold), ch);

        let mut buf = [0u8; 4];
        for (i, c) in text.chars().enumerate() {
            let origin = i * cw;
            let encoded = c.encode_utf8(&mut buf);
            match psf.glyph_for_utf8(encoded.as_bytes()) {
                Some(glyph) => {
                    for (gy, row) in glyph.enumerate() {
                        for (gx, on) in row.enumerate() {
                            if on && gx < cw {
                                line.set(origin + gx, gy, true);
                                if self.bold {
                                    line.set(origin + gx + 1, gy, true);
                                }
                            }
                        }
                    }
                }
                None => line.rect_outline(origin + 1, 1, cw.saturating_sub(2), ch - 2, 1),
            }
        }

        Ok(line.scale(self.scale))
    }
}
