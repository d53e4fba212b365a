//! Calibration patterns for dialing in label offsets.

use serde::{Deserialize, Serialize};

use super::MAX_CANVAS_HEIGHT;
use super::font::Font;
use crate::error::{PrintError, Result};
use crate::printer::config::{HEAD_WIDTH_DOTS, mm_to_dots};
use crate::raster::Bitmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationPattern {
    Border,
    Grid,
    Lines,
    #[default]
    Full,
}

impl CalibrationPattern {
    pub const ALL: [CalibrationPattern; 4] = [
        CalibrationPattern::Border,
        CalibrationPattern::Grid,
        CalibrationPattern::Lines,
        CalibrationPattern::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CalibrationPattern::Border => "border",
            CalibrationPattern::Grid => "grid",
            CalibrationPattern::Lines => "lines",
            CalibrationPattern::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PrintError::Invariant(format!(
                    "unknown calibration pattern '{}', expected border|grid|lines|full",
                    s
                ))
            })
    }
}

/// Smallest side of a calibration pattern, in dots.
pub const MIN_SIDE: usize = 20;

/// Widest calibration pattern. Anything past the head is squeezed by the
/// raster converter.
pub const MAX_WIDTH: usize = 4 * HEAD_WIDTH_DOTS as usize;

/// Reject a width outside `MIN_SIDE..=MAX_WIDTH`.
pub fn check_width(width: usize) -> Result<()> {
    if !(MIN_SIDE..=MAX_WIDTH).contains(&width) {
        return Err(PrintError::Invariant(format!(
            "calibration width {} outside {}..={}",
            width, MIN_SIDE, MAX_WIDTH
        )));
    }
    Ok(())
}

/// Reject a height outside `MIN_SIDE..=MAX_CANVAS_HEIGHT`.
pub fn check_height(height: usize) -> Result<()> {
    if !(MIN_SIDE..=MAX_CANVAS_HEIGHT).contains(&height) {
        return Err(PrintError::Invariant(format!(
            "calibration height {} outside {}..={}",
            height, MIN_SIDE, MAX_CANVAS_HEIGHT
        )));
    }
    Ok(())
}

/// Render `pattern` at `width` x `height` dots. The full pattern prints the
/// current offsets so the label documents its own settings.
pub fn render_calibration(
    pattern: CalibrationPattern,
    width: usize,
    height: usize,
    offsets: (i32, i32),
) -> Result<Bitmap> {
    check_width(width)?;
    check_height(height)?;

    let mut bmp = Bitmap::new(width, height);
    match pattern {
        CalibrationPattern::Border => bmp.rect_outline(0, 0, width, height, 3),
        CalibrationPattern::Grid => grid(&mut bmp),
        CalibrationPattern::Lines => lines(&mut bmp),
        CalibrationPattern::Full => full(&mut bmp, offsets)?,
    }
    Ok(bmp)
}

fn grid(bmp: &mut Bitmap) {
    let (w, h) = (bmp.width(), bmp.height());
    for x in (0..w).step_by(10) {
        bmp.fill_rect(x, 0, 1, h);
    }
    for y in (0..h).step_by(10) {
        bmp.fill_rect(0, y, w, 1);
    }
    bmp.rect_outline(0, 0, w, h, 2);

    let (cx, cy) = (w / 2, h / 2);
    bmp.fill_rect(cx.saturating_sub(10), cy.saturating_sub(1), 21, 2);
    bmp.fill_rect(cx.saturating_sub(1), cy.saturating_sub(10), 2, 21);
}

fn lines(bmp: &mut Bitmap) {
    let (w, h) = (bmp.width(), bmp.height());
    for i in 1..=5 {
        bmp.fill_rect(0, h * i / 6, w, 1);
    }
    for i in 1..=3 {
        bmp.fill_rect(w * i / 4, 0, 1, h);
    }
    bmp.rect_outline(0, 0, w, h, 3);
}

fn full(bmp: &mut Bitmap, (x_offset, y_offset): (i32, i32)) -> Result<()> {
    let (w, h) = (bmp.width(), bmp.height());
    bmp.rect_outline(0, 0, w, h, 2);

    // quarter lines
    for i in 1..=3 {
        bmp.fill_rect(w * i / 4, 0, 1, h);
        bmp.fill_rect(0, h * i / 4, w, 1);
    }

    // corner markers
    for (x, y) in [(5, 5), (w - 15, 5), (5, h - 15), (w - 15, h - 15)] {
        bmp.fill_rect(x, y, 10, 10);
    }

    rulers(bmp);

    let font = Font::for_size(12);
    let caption = font.render(&format!("X:{} Y:{}", x_offset, y_offset))?;
    let x = w.saturating_sub(caption.width()) / 2;
    let y = (h / 2).saturating_sub(caption.height() + 2);
    bmp.blit(&caption, x, y);
    Ok(())
}

/// Millimetre ticks along the top and left edges: every mm short, every
/// 5 mm medium, every 10 mm long.
fn rulers(bmp: &mut Bitmap) {
    let (w, h) = (bmp.width(), bmp.height());
    let tick = |mm: u16| match mm {
        m if m % 10 == 0 => 12,
        m if m % 5 == 0 => 8,
        _ => 4,
    };

    for mm in 1u16.. {
        let x = mm_to_dots(mm) as usize;
        if x >= w {
            break;
        }
        bmp.fill_rect(x, 0, 1, tick(mm));
    }
    for mm in 1u16.. {
        let y = mm_to_dots(mm) as usize;
        if y >= h {
            break;
        }
        bmp.fill_rect(0, y, tick(mm), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(CalibrationPattern::parse("GRID").unwrap(), CalibrationPattern::Grid);
        assert_eq!(CalibrationPattern::parse(" full ").unwrap(), CalibrationPattern::Full);
        assert!(CalibrationPattern::parse("rulers").is_err());
    }

    #[test]
    fn test_border_frame() {
        let bmp = render_calibration(CalibrationPattern::Border, 100, 50, (0, 0)).unwrap();
        assert!(bmp.get(0, 0));
        assert!(bmp.get(2, 25));
        assert!(!bmp.get(3, 25));
        assert!(bmp.get(99, 49));
        assert!(!bmp.get(50, 25));
    }

    #[test]
    fn test_grid_has_cross() {
        let bmp = render_calibration(CalibrationPattern::Grid, 100, 50, (0, 0)).unwrap();
        assert!(bmp.get(10, 5));
        assert!(!bmp.get(15, 15));
        // center cross
        assert!(bmp.get(45, 25));
        assert!(bmp.get(50, 17));
    }

    #[test]
    fn test_lines_positions() {
        let bmp = render_calibration(CalibrationPattern::Lines, 120, 60, (0, 0)).unwrap();
        assert!(bmp.get(50, 10));
        assert!(bmp.get(30, 35));
        assert!(!bmp.get(50, 35));
    }

    #[test]
    fn test_full_pattern_corners_and_rulers() {
        let bmp = render_calibration(CalibrationPattern::Full, 319, 239, (12, -4)).unwrap();
        assert!(bmp.get(8, 8));
        assert!(bmp.get(310, 230));
        // 10 mm tick on the top edge at x = 79
        assert!(bmp.get(79, 11));
        assert!(!bmp.get(71, 11));
    }

    #[test]
    fn test_too_small() {
        assert!(render_calibration(CalibrationPattern::Grid, 10, 10, (0, 0)).is_err());
    }

    #[test]
    fn test_size_bounds() {
        assert!(check_width(MIN_SIDE).is_ok());
        assert!(check_width(MAX_WIDTH).is_ok());
        assert!(check_height(MAX_CANVAS_HEIGHT).is_ok());

        let err = render_calibration(CalibrationPattern::Border, MAX_WIDTH + 1, 100, (0, 0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
        let err = render_calibration(CalibrationPattern::Border, 100, usize::MAX, (0, 0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
    }
}
