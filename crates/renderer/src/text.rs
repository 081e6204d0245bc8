//! Text measurement and drawing with rusttype + imageproc.
//!
//! Glyphs are rasterized into a scratch RGBA buffer with an opaque color. On a
//! transparent buffer imageproc's coverage blend yields premultiplied pixels, so the
//! scratch buffer becomes a [`Pixmap`] directly and the color's alpha is applied as
//! the composite opacity.

use card_common::{CardError, CardResult, Rgba};
use image::{ImageBuffer, Rgba as ImageRgba};
use imageproc::drawing::draw_text_mut;
use rusttype::{point, Font, Scale};
use tiny_skia::{IntSize, Pixmap};

use crate::canvas;

/// Embedded font used when a requested font asset is not available.
pub const FALLBACK_FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// Parse a TrueType/OpenType font.
pub fn load_font(bytes: Vec<u8>) -> CardResult<Font<'static>> {
    Font::try_from_vec(bytes).ok_or_else(|| CardError::DecodeFailed("Invalid font data".into()))
}

/// The built-in fallback font.
pub fn fallback_font() -> CardResult<Font<'static>> {
    Font::try_from_bytes(FALLBACK_FONT_DATA)
        .ok_or_else(|| CardError::DecodeFailed("Invalid embedded font".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Font, size and color for one run of text.
#[derive(Clone, Copy)]
pub struct TextStyle<'a> {
    pub font: &'a Font<'static>,
    pub size: f32,
    pub color: Rgba,
}

impl<'a> TextStyle<'a> {
    pub fn new(font: &'a Font<'static>, size: f32, color: Rgba) -> Self {
        Self { font, size, color }
    }

    pub fn with_size(self, size: f32) -> Self {
        Self { size, ..self }
    }

    pub fn with_color(self, color: Rgba) -> Self {
        Self { color, ..self }
    }
}

/// Horizontal advance and vertical extent of a line of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
    pub ascent: f32,
}

pub fn measure_text(font: &Font<'static>, size: f32, text: &str) -> TextMetrics {
    let scale = Scale::uniform(size);
    let v_metrics = font.v_metrics(scale);
    let width = font
        .layout(text, scale, point(0.0, v_metrics.ascent))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0);

    TextMetrics {
        width,
        height: v_metrics.ascent - v_metrics.descent,
        ascent: v_metrics.ascent,
    }
}

/// Largest size from `start` downward (step 1) at which `text` fits `max_width`.
pub fn fit_font_size(font: &Font<'static>, text: &str, start: f32, max_width: f32, min: f32) -> f32 {
    let mut size = start;
    while size > min && measure_text(font, size, text).width > max_width {
        size -= 1.0;
    }
    size.max(min)
}

/// Draw `text` with its line box top at `y`. `x` is the left edge, center or right
/// edge depending on `align`.
pub fn draw_text(
    pixmap: &mut Pixmap,
    style: &TextStyle<'_>,
    text: &str,
    x: f32,
    y: f32,
    align: Align,
) -> CardResult<()> {
    if text.is_empty() || style.color.a == 0 {
        return Ok(());
    }

    let metrics = measure_text(style.font, style.size, text);
    let left = match align {
        Align::Left => x,
        Align::Center => x - metrics.width / 2.0,
        Align::Right => x - metrics.width,
    };

    let pad = (style.size * 0.25).ceil().max(2.0) as u32;
    let width = metrics.width.ceil().max(1.0) as u32 + pad * 2;
    let height = metrics.height.ceil().max(1.0) as u32 + pad * 2;

    let mut scratch = ImageBuffer::from_pixel(width, height, ImageRgba([0u8, 0, 0, 0]));
    let opaque = ImageRgba([style.color.r, style.color.g, style.color.b, 255]);
    draw_text_mut(
        &mut scratch,
        opaque,
        pad as i32,
        pad as i32,
        Scale::uniform(style.size),
        style.font,
        text,
    );

    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| CardError::RenderFailed("Invalid text buffer size".into()))?;
    let glyphs = Pixmap::from_vec(scratch.into_raw(), size)
        .ok_or_else(|| CardError::RenderFailed("Invalid text buffer".into()))?;

    canvas::draw_bitmap_with_opacity(
        pixmap,
        &glyphs,
        left.round() as i32 - pad as i32,
        y.round() as i32 - pad as i32,
        style.color.a as f32 / 255.0,
    );
    Ok(())
}

/// Draw `text` vertically centered on `center_y`.
pub fn draw_text_middle(
    pixmap: &mut Pixmap,
    style: &TextStyle<'_>,
    text: &str,
    x: f32,
    center_y: f32,
    align: Align,
) -> CardResult<()> {
    let metrics = measure_text(style.font, style.size, text);
    draw_text(pixmap, style, text, x, center_y - metrics.height / 2.0, align)
}
