//! Standalone progress bar image.

use card_common::models::ProgressBar;
use card_common::{parse_hex_color, CardError, CardResult, Rgba};
use rusttype::Font;
use tiny_skia::Pixmap;

use crate::canvas;
use crate::stats::bar_fill_width;
use crate::text::{self, Align, TextStyle};

pub const WIDTH: u32 = 568;
pub const HEIGHT: u32 = 30;
pub const BAR_WIDTH: f32 = 500.0;
pub const BAR_HEIGHT: f32 = 20.0;

pub fn generate_progress_bar(bar: &ProgressBar, font: &Font<'static>) -> CardResult<Pixmap> {
    let colors = bar
        .gradient_colors
        .iter()
        .take(2)
        .map(|c| parse_hex_color(c))
        .collect::<CardResult<Vec<_>>>()?;
    if colors.is_empty() {
        return Err(CardError::InvalidRequest("gradientColors is empty".into()));
    }

    let mut pixmap = canvas::new_pixmap(WIDTH, HEIGHT)?;
    let bar_y = (HEIGHT as f32 - BAR_HEIGHT) / 2.0;
    let middle = HEIGHT as f32 / 2.0;

    canvas::fill_rounded_rect(
        &mut pixmap,
        0.0,
        bar_y,
        BAR_WIDTH,
        BAR_HEIGHT,
        10.0,
        &canvas::solid_paint(Rgba::WHITE.with_alpha(76)),
    );

    let fill = bar_fill_width(BAR_WIDTH, bar.progress, BAR_HEIGHT);
    if fill > 0.0 {
        let shader = canvas::linear_gradient((0.0, 0.0), (fill, 0.0), &colors)?;
        canvas::fill_rounded_rect(
            &mut pixmap,
            0.0,
            bar_y,
            fill,
            BAR_HEIGHT,
            10.0,
            &canvas::shader_paint(shader),
        );
    }

    let label = TextStyle::new(font, 20.0, Rgba::WHITE);
    text::draw_text_middle(&mut pixmap, &label, &bar.text, BAR_WIDTH + 5.0, middle, Align::Left)?;

    if let Some(bar_text) = bar.bar_text.as_deref() {
        text::draw_text_middle(
            &mut pixmap,
            &label.with_size(15.0),
            bar_text,
            BAR_WIDTH / 2.0,
            middle,
            Align::Center,
        )?;
    }

    Ok(pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::fallback_font;

    fn bar(progress: f32) -> ProgressBar {
        ProgressBar {
            progress,
            text: "42/100".into(),
            bar_text: None,
            gradient_colors: vec!["#ff0000".into(), "#00ff00".into()],
        }
    }

    #[test]
    fn test_empty_bar_has_no_fill() {
        let font = fallback_font().unwrap();
        let pixmap = generate_progress_bar(&bar(0.0), &font).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (WIDTH, HEIGHT));

        let px = pixmap.pixel(5, 15).unwrap().demultiply();
        assert_eq!((px.red(), px.green(), px.blue()), (255, 255, 255));
        assert!(px.alpha() < 100);
    }

    #[test]
    fn test_tiny_progress_gets_minimum_width() {
        let font = fallback_font().unwrap();
        let pixmap = generate_progress_bar(&bar(0.001), &font).unwrap();
        // Gradient starts red and is opaque inside the minimum-width bar
        let px = pixmap.pixel(10, 15).unwrap();
        assert_eq!(px.alpha(), 255);
        assert!(px.red() > px.blue());
        assert!(pixmap.pixel(40, 15).unwrap().alpha() < 100);
    }

    #[test]
    fn test_missing_colors_rejected() {
        let font = fallback_font().unwrap();
        let mut invalid = bar(0.5);
        invalid.gradient_colors.clear();
        assert!(matches!(
            generate_progress_bar(&invalid, &font),
            Err(CardError::InvalidRequest(_))
        ));
    }
}
