//! Building blocks shared by several cards: item card overlay, rarity stripe, banners
//! and the labelled boxes drawn at the top of shop and stats images.

use card_common::{CardResult, Rgba};
use rusttype::Font;
use tiny_skia::Pixmap;

use crate::canvas;
use crate::text::{self, Align, TextStyle};

/// Height of the dark name plate at the bottom of an item card.
pub const OVERLAY_HEIGHT: u32 = 65;
/// Height of the slanted rarity stripe above the name plate.
pub const STRIPE_HEIGHT: u32 = 14;
/// How far the stripe overlaps the name plate.
pub const STRIPE_OVERLAP: u32 = 5;

const OVERLAY_DARK: Rgba = Rgba::rgb(14, 14, 14);
const OVERLAY_GREY: Rgba = Rgba::rgb(30, 30, 30);
const DISCORD_BLURPLE: Rgba = Rgba::rgb(88, 101, 242);

/// Name plate with a lighter upper part and an optional price/source icon tilted in the
/// lower right corner.
pub fn item_card_overlay(width: u32, icon: Option<&Pixmap>) -> CardResult<Pixmap> {
    let mut pixmap = canvas::new_pixmap(width, OVERLAY_HEIGHT)?;
    let (w, h) = (width as f32, OVERLAY_HEIGHT as f32);

    canvas::fill_rect(&mut pixmap, 0.0, 0.0, w, h, &canvas::solid_paint(OVERLAY_DARK));

    if let Some(icon) = icon {
        let rotated = canvas::rotate(icon, -20.0)?;
        let resized = canvas::resize(&rotated, 47, 47)?;
        canvas::draw_bitmap(&mut pixmap, &resized, width as i32 - 45, OVERLAY_HEIGHT as i32 - 35);
    }

    canvas::fill_polygon(
        &mut pixmap,
        &[(0.0, h - 29.0), (w, h - 29.0), (w, h - 25.0), (0.0, h - 24.0)],
        OVERLAY_GREY,
    );
    canvas::fill_rect(&mut pixmap, 0.0, 0.0, w, h - 29.0, &canvas::solid_paint(OVERLAY_GREY));
    Ok(pixmap)
}

pub fn rarity_stripe(width: u32, color: Rgba) -> CardResult<Pixmap> {
    let mut pixmap = canvas::new_pixmap(width, STRIPE_HEIGHT)?;
    let (w, h) = (width as f32, STRIPE_HEIGHT as f32);
    canvas::fill_polygon(
        &mut pixmap,
        &[(0.0, h - 5.0), (w, 0.0), (w, h - 6.0), (0.0, h)],
        color,
    );
    Ok(pixmap)
}

/// Draw the name plate and rarity stripe along the bottom of a card.
pub fn draw_card_footer(
    card: &mut Pixmap,
    icon: Option<&Pixmap>,
    stripe_color: Rgba,
) -> CardResult<()> {
    let overlay = item_card_overlay(card.width(), icon)?;
    let overlay_y = card.height() as i32 - OVERLAY_HEIGHT as i32;
    canvas::draw_bitmap(card, &overlay, 0, overlay_y);

    let stripe = rarity_stripe(card.width(), stripe_color)?;
    let stripe_y = overlay_y - STRIPE_HEIGHT as i32 + STRIPE_OVERLAP as i32;
    canvas::draw_bitmap(card, &stripe, 0, stripe_y);
    Ok(())
}

/// Slanted two-tone banner ("NEW", "-20%") pinned to a shop card's corner.
///
/// `colors` are the outer border, inner fill and text color.
pub fn banner(font: &Font<'static>, label: &str, colors: [Rgba; 3]) -> CardResult<Pixmap> {
    let style = TextStyle::new(font, 15.0, colors[2]);
    let metrics = text::measure_text(font, style.size, label);
    let width = 9 + metrics.width as u32 + 8;
    let height = 31;

    let mut pixmap = canvas::new_pixmap(width, height)?;
    let (w, h) = (width as f32, height as f32);
    canvas::fill_polygon(
        &mut pixmap,
        &[(0.0, 2.0), (w, 0.0), (w - 6.0, h), (3.0, h - 1.0)],
        colors[0],
    );
    canvas::fill_polygon(
        &mut pixmap,
        &[(4.0, 6.0), (w - 5.0, 4.0), (w - 9.0, h - 3.0), (6.0, h - 4.0)],
        colors[1],
    );
    text::draw_text_middle(&mut pixmap, &style, label, 9.0, h / 2.0, Align::Left)?;
    Ok(pixmap)
}

/// Blurple box with the Discord logo and the user's tag, shrunk to at most 459 px
/// wide at scale 1.
pub fn discord_box(
    font: &Font<'static>,
    logo: Option<&Pixmap>,
    username: &str,
    scale: f32,
) -> CardResult<Pixmap> {
    let padding = (10.0 + 2.0 * 15.0 + 50.0) * scale;
    let max_width = 459.0 * scale;
    let start_size = 25.0 * scale;

    let text_width = text::measure_text(font, start_size, username).width;
    let width = (text_width + padding).min(max_width);
    let height = 62.0 * scale;

    let mut pixmap = canvas::new_pixmap(width as u32, height as u32)?;
    canvas::fill_rounded_rect(
        &mut pixmap,
        0.0,
        0.0,
        width,
        height,
        15.0 * scale,
        &canvas::solid_paint(DISCORD_BLURPLE),
    );

    let logo_width = (50.0 * scale) as u32;
    let mut logo_drawn_width = logo_width;
    if let Some(logo) = logo {
        let logo_height = (logo.height() as f32 * (logo_width as f32 / logo.width() as f32)) as u32;
        let resized = canvas::resize(logo, logo_width, logo_height.max(1))?;
        logo_drawn_width = resized.width();
        canvas::draw_bitmap(
            &mut pixmap,
            &resized,
            (10.0 * scale) as i32,
            (height as i32 - resized.height() as i32) / 2,
        );
    }

    let size = text::fit_font_size(font, username, start_size, width - padding, 1.0);
    let style = TextStyle::new(font, size, Rgba::WHITE);
    text::draw_text_middle(
        &mut pixmap,
        &style,
        username,
        (10.0 + 15.0) * scale + logo_drawn_width as f32,
        height / 2.0,
        Align::Left,
    )?;
    Ok(pixmap)
}

/// Semi-transparent pill showing "<title> | <code>", shrunk until it fits `max_width`.
pub fn creator_code_box(
    font: &Font<'static>,
    title: &str,
    code: &str,
    max_width: f32,
) -> CardResult<Pixmap> {
    let mut size = 130.0_f32;
    let mut height = 200.0_f32;
    let mut split_height = 150.0_f32;
    let box_width = |size: f32| {
        50.0 + text::measure_text(font, size, title).width
            + 30.0
            + 15.0
            + 30.0
            + text::measure_text(font, size, code).width
            + 50.0
    };
    while size > 1.0 && box_width(size) > max_width {
        size -= 1.0;
        height -= 1.0;
        split_height -= 1.0;
    }

    let title_width = text::measure_text(font, size, title).width;
    let width = box_width(size);
    let mut pixmap = canvas::new_pixmap(width.max(1.0) as u32, height.max(1.0) as u32)?;

    canvas::fill_rounded_rect(
        &mut pixmap,
        0.0,
        0.0,
        width,
        height,
        100.0,
        &canvas::solid_paint(Rgba::WHITE.with_alpha(127)),
    );

    let style = TextStyle::new(font, size, Rgba::WHITE);
    text::draw_text_middle(&mut pixmap, &style, title, 50.0, height / 2.0, Align::Left)?;
    text::draw_text_middle(&mut pixmap, &style, code, width - 50.0, height / 2.0, Align::Right)?;

    canvas::fill_rounded_rect(
        &mut pixmap,
        50.0 + title_width + 30.0,
        (height - split_height) / 2.0,
        15.0,
        split_height,
        10.0,
        &canvas::solid_paint(Rgba::WHITE.with_alpha(76)),
    );
    Ok(pixmap)
}
