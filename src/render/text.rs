//! Plain text labels.
//!
//! Lines are laid out top to bottom with 20 dots of padding above and below
//! and 5 dots between lines. `# ` and `## ` prefixes render a line bold and
//! larger; `**bold**` and `__bold__` work inline.

use chrono::NaiveTime;

use super::font::Font;
use super::{MAX_CANVAS_HEIGHT, check_font_size};
use crate::error::{PrintError, Result};
use crate::protocol::commands::Alignment;
use crate::raster::Bitmap;

pub const PADDING: usize = 20;
pub const LINE_GAP: usize = 5;
pub const MARGIN: usize = 10;
pub const MIN_HEIGHT: usize = 50;

/// Unify line endings, expand escaped `\n`, turn tabs into four spaces and
/// drop remaining control characters.
pub fn normalize(text: &str) -> String {
    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\\n", "\n")
        .replace('\t', "    ");
    text.chars().filter(|&c| c == '\n' || !c.is_control()).collect()
}

/// Replace every `$TIME$` with `HH:MM:SS`.
pub fn expand_time(text: &str, now: NaiveTime) -> String {
    text.replace("$TIME$", &now.format("%H:%M:%S").to_string())
}

/// Size increments for `# ` and `## ` headings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingSteps {
    pub h1: u32,
    pub h2: u32,
}

/// Plain text labels.
pub const TEXT_HEADINGS: HeadingSteps = HeadingSteps { h1: 8, h2: 4 };

/// Labels with codes keep headings close to body size.
pub const CODE_HEADINGS: HeadingSteps = HeadingSteps { h1: 4, h2: 2 };

/// A run of text drawn in one weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
}

impl Span {
    fn plain(text: &str) -> Self {
        Span {
            text: text.to_string(),
            bold: false,
        }
    }

    fn bold(text: &str) -> Self {
        Span {
            text: text.to_string(),
            bold: true,
        }
    }
}

/// Byte ranges of `marker ... marker` pairs, shortest match first, left to
/// right.
fn delimited(line: &str, marker: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(open) = line[pos..].find(marker) {
        let inner = pos + open + marker.len();
        let Some(close) = line[inner..].find(marker) else {
            break;
        };
        let end = inner + close + marker.len();
        found.push((pos + open, end));
        pos = end;
    }
    found
}

/// Split a line on inline `**bold**` and `__bold__`. `**` pairs win where
/// the two overlap.
pub fn parse_inline(line: &str) -> Vec<Span> {
    let mut ranges = delimited(line, "**");
    for (start, end) in delimited(line, "__") {
        if !ranges.iter().any(|&(s, e)| start < e && end > s) {
            ranges.push((start, end));
        }
    }
    ranges.sort_unstable();

    let mut spans = Vec::new();
    let mut pos = 0;
    for (start, end) in ranges {
        if pos < start {
            spans.push(Span::plain(&line[pos..start]));
        }
        spans.push(Span::bold(&line[start + 2..end - 2]));
        pos = end;
    }
    if pos < line.len() || spans.is_empty() {
        spans.push(Span::plain(&line[pos..]));
    }
    spans
}

/// One laid-out line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub spans: Vec<Span>,
    pub font: Font,
}

impl TextLine {
    pub fn parse(line: &str, base_size: u32, headings: HeadingSteps) -> Self {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            TextLine::heading(rest, base_size + headings.h1)
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            TextLine::heading(rest, base_size + headings.h2)
        } else {
            TextLine {
                spans: parse_inline(line.trim_end()),
                font: Font::for_size(base_size),
            }
        }
    }

    fn heading(text: &str, size: u32) -> Self {
        TextLine {
            spans: vec![Span::bold(text.trim())],
            font: Font::for_size(size).bold(),
        }
    }

    /// The line without markup.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.spans.iter().all(|s| s.text.trim().is_empty())
    }

    /// Dots this line occupies vertically. Blank lines take half a line.
    pub fn height(&self) -> usize {
        if self.is_blank() {
            self.font.line_height() / 2
        } else {
            self.font.line_height()
        }
    }

    /// Draw onto `canvas` at row `y`, spans side by side.
    pub fn draw(&self, canvas: &mut Bitmap, y: usize, alignment: Alignment) -> Result<()> {
        if self.is_blank() {
            return Ok(());
        }
        let runs = self
            .spans
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| {
                let font = if s.bold { self.font.bold() } else { self.font };
                font.render(&s.text)
            })
            .collect::<Result<Vec<_>>>()?;

        let width = runs.iter().map(Bitmap::width).sum();
        let mut x = aligned_x(canvas.width(), width, alignment);
        for run in &runs {
            canvas.blit(run, x, y);
            x += run.width();
        }
        Ok(())
    }
}

/// Left edge of a run `content` dots wide inside `width`.
pub fn aligned_x(width: usize, content: usize, alignment: Alignment) -> usize {
    match alignment {
        Alignment::Left => MARGIN,
        Alignment::Center => (width.saturating_sub(content) / 2).max(MARGIN),
        Alignment::Right => width.saturating_sub(content + MARGIN).max(MARGIN),
    }
}

/// Render normalized text onto a canvas `width` dots wide.
pub fn render_text(text: &str, font_size: u32, alignment: Alignment, width: usize) -> Result<Bitmap> {
    check_font_size(font_size)?;
    let lines: Vec<TextLine> = text
        .split('\n')
        .map(|l| TextLine::parse(l, font_size, TEXT_HEADINGS))
        .collect();

    let body: usize = lines.iter().map(TextLine::height).sum::<usize>()
        + LINE_GAP * lines.len().saturating_sub(1);
    let height = (body + 2 * PADDING).max(MIN_HEIGHT);
    if height > MAX_CANVAS_HEIGHT {
        return Err(PrintError::Invariant(format!(
            "text needs {} rows, at most {} fit one raster",
            height, MAX_CANVAS_HEIGHT
        )));
    }

    let mut canvas = Bitmap::new(width, height);
    let mut y = PADDING;
    for line in &lines {
        line.draw(&mut canvas, y, alignment)?;
        y += line.height() + LINE_GAP;
    }
    Ok(canvas)
}
