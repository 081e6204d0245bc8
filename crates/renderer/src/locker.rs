//! Locker rendering: one card per owned item, arranged in a square-ish grid.

use card_common::models::{Locker, LockerItem};
use card_common::{parse_hex_color, CardResult, Rgba};
use rayon::prelude::*;
use rusttype::Font;
use tiny_skia::Pixmap;
use tracing::debug;

use crate::canvas;
use crate::components;
use crate::text::{self, Align, TextStyle};

pub const CARD_WIDTH: u32 = 256;
pub const CARD_HEIGHT: u32 = 313;
pub const CARD_GAP: u32 = 25;
pub const MIN_COLUMNS: u32 = 5;

const MARGIN: u32 = 50;
const NAME_SIZE: u32 = 64;
const BACKGROUND_GRADIENT: [Rgba; 2] = [Rgba::rgb(41, 165, 224), Rgba::rgb(9, 66, 180)];

/// Grid shape for `items` cards: at least five columns, otherwise as square as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockerGrid {
    pub columns: u32,
    pub rows: u32,
}

impl LockerGrid {
    pub fn for_items(items: usize) -> Self {
        let columns = ((items as f64).sqrt().ceil() as u32).max(MIN_COLUMNS);
        let rows = (items as u32).div_ceil(columns);
        Self { columns, rows }
    }

    pub fn image_size(&self) -> (u32, u32) {
        let rows = self.rows.max(1);
        (
            MARGIN + CARD_WIDTH * self.columns + CARD_GAP * (self.columns - 1) + MARGIN,
            MARGIN + NAME_SIZE + CARD_GAP + rows * CARD_HEIGHT + (rows - 1) * CARD_GAP + MARGIN,
        )
    }

    /// Top-left corner of the card at `index`, filled row by row.
    pub fn card_position(&self, index: usize) -> (u32, u32) {
        let column = index as u32 % self.columns;
        let row = index as u32 / self.columns;
        (
            MARGIN + (CARD_WIDTH + CARD_GAP) * column,
            MARGIN + NAME_SIZE + CARD_GAP + (CARD_HEIGHT + CARD_GAP) * row,
        )
    }
}

/// Bitmaps needed to draw one locker card.
#[derive(Clone, Copy, Default)]
pub struct LockerCardInputs<'a> {
    pub image: Option<&'a Pixmap>,
    pub rarity_background: Option<&'a Pixmap>,
    pub source_icon: Option<&'a Pixmap>,
}

pub fn generate_item_card(
    item: &LockerItem,
    inputs: &LockerCardInputs<'_>,
    font: &Font<'static>,
) -> CardResult<Pixmap> {
    let mut card = canvas::new_pixmap(CARD_WIDTH, CARD_HEIGHT)?;
    let rarity_color = parse_hex_color(&item.rarity_color).unwrap_or(Rgba::WHITE);

    if let Some(background) = inputs.rarity_background {
        let resized = canvas::resize(background, CARD_WIDTH, CARD_HEIGHT)?;
        canvas::draw_bitmap(&mut card, &resized, 0, 0);
    }
    if let Some(image) = inputs.image {
        let resized = canvas::resize(image, CARD_WIDTH, CARD_WIDTH)?;
        canvas::draw_bitmap(&mut card, &resized, 0, 0);
    }

    components::draw_card_footer(&mut card, inputs.source_icon, rarity_color)?;

    let center = CARD_WIDTH as f32 / 2.0;
    let max_width = CARD_WIDTH as f32 - 16.0;
    let name_size = text::fit_font_size(font, &item.name, 18.0, max_width, 8.0);
    text::draw_text(
        &mut card,
        &TextStyle::new(font, name_size, Rgba::WHITE),
        &item.name,
        center,
        CARD_HEIGHT as f32 - 59.0,
        Align::Center,
    )?;

    let description_size = text::fit_font_size(font, &item.description, 15.0, max_width, 8.0);
    text::draw_text(
        &mut card,
        &TextStyle::new(font, description_size, rarity_color),
        &item.description,
        center,
        CARD_HEIGHT as f32 - 42.0,
        Align::Center,
    )?;

    Ok(card)
}

/// Render all cards in parallel. `inputs` is index-aligned with `locker.items`.
pub fn generate_item_cards(
    locker: &Locker,
    inputs: &[LockerCardInputs<'_>],
    font: &Font<'static>,
) -> CardResult<Vec<Pixmap>> {
    locker
        .items
        .par_iter()
        .enumerate()
        .map(|(i, item)| {
            let card_inputs = inputs.get(i).copied().unwrap_or_default();
            generate_item_card(item, &card_inputs, font)
        })
        .collect()
}

/// Compose the cards onto the locker background with the player name on top.
pub fn generate_locker_image(
    locker: &Locker,
    cards: &[Pixmap],
    font: &Font<'static>,
) -> CardResult<Pixmap> {
    let grid = LockerGrid::for_items(cards.len());
    let (width, height) = grid.image_size();
    debug!(
        items = cards.len(),
        columns = grid.columns,
        rows = grid.rows,
        "Composing locker image"
    );

    let mut bitmap = canvas::new_pixmap(width, height)?;
    let shader = canvas::corner_radial_gradient(width as f32, height as f32, &BACKGROUND_GRADIENT)?;
    canvas::fill_rounded_rect(
        &mut bitmap,
        0.0,
        0.0,
        width as f32,
        height as f32,
        50.0,
        &canvas::shader_paint(shader),
    );

    text::draw_text(
        &mut bitmap,
        &TextStyle::new(font, NAME_SIZE as f32, Rgba::WHITE),
        &locker.player_name,
        MARGIN as f32,
        MARGIN as f32,
        Align::Left,
    )?;

    for (index, card) in cards.iter().enumerate() {
        let (x, y) = grid.card_position(index);
        canvas::draw_bitmap(&mut bitmap, card, x as i32, y as i32);
    }
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_has_at_least_five_columns() {
        assert_eq!(LockerGrid::for_items(3), LockerGrid { columns: 5, rows: 1 });
        assert_eq!(LockerGrid::for_items(25), LockerGrid { columns: 5, rows: 5 });
        assert_eq!(LockerGrid::for_items(26), LockerGrid { columns: 6, rows: 5 });
        assert_eq!(LockerGrid::for_items(100), LockerGrid { columns: 10, rows: 10 });
    }

    #[test]
    fn test_image_size() {
        let grid = LockerGrid::for_items(7);
        assert_eq!(
            grid.image_size(),
            (
                50 + 256 * 5 + 25 * 4 + 50,
                50 + 64 + 25 + 2 * 313 + 25 + 50
            )
        );
    }

    #[test]
    fn test_card_positions_do_not_overlap() {
        let grid = LockerGrid::for_items(12);
        let (x0, y0) = grid.card_position(0);
        let (x1, _) = grid.card_position(1);
        let (_, y5) = grid.card_position(5);
        assert_eq!((x0, y0), (50, 139));
        assert_eq!(x1 - x0, CARD_WIDTH + CARD_GAP);
        assert_eq!(y5 - y0, CARD_HEIGHT + CARD_GAP);

        let (width, height) = grid.image_size();
        let (xl, yl) = grid.card_position(11);
        assert!(xl + CARD_WIDTH <= width - 50);
        assert!(yl + CARD_HEIGHT <= height - 50);
    }
}
