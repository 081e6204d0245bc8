//! Item shop rendering.
//!
//! A shop image is built in three stages so the expensive parts can be cached:
//!
//! 1. [`generate_template`] lays out every item card and the footer. It depends only on
//!    the section/entry structure and the item images, never on translated text.
//! 2. [`generate_locale_template`] draws the title, date, section names, item names,
//!    prices and banners for one locale on a copy of the template.
//! 3. [`generate_shop_image`] puts the locale template on the background and adds the
//!    creator code box. This stage runs for every request on a fresh pixmap.

use std::collections::HashMap;
use std::ops::Deref;

use card_common::models::{
    LocationPoint, Shop, ShopEntry, ShopEntryLocation, ShopSection, ShopSectionLocation,
};
use card_common::{parse_hex_color, CardResult, Rgba};
use rusttype::Font;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::canvas;
use crate::components;
use crate::text::{self, Align, TextStyle};

pub const CARD_WIDTH: u32 = 286;
pub const CARD_HEIGHT: u32 = 494;
pub const HALF_CARD_HEIGHT: u32 = 237;
pub const CARD_GAP: u32 = 20;

/// Shops with more sections than this are laid out in two columns.
pub const SINGLE_COLUMN_MAX_SECTIONS: usize = 6;

const MARGIN: u32 = 100;
const HEADER_HEIGHT: u32 = 270;
const SECTION_SPACING: u32 = 82;
const COLUMN_GAP: u32 = 50;
const FOOTER_HEIGHT: u32 = 120;
const FOOTER_TEXT: &str = "SHOP-DATA PROVIDED BY FORTNITE-API.COM";

const DEFAULT_CARD_GRADIENT: [Rgba; 2] = [Rgba::rgb(129, 207, 250), Rgba::rgb(52, 136, 217)];
const BACKGROUND_GRADIENT: [Rgba; 2] = [Rgba::rgb(44, 154, 234), Rgba::rgb(14, 53, 147)];
const OLD_PRICE_COLOR: Rgba = Rgba::rgb(99, 99, 99);
const STRIKE_COLOR: Rgba = Rgba::rgb(122, 132, 133);

/// Pixel size of a card for an entry of the given size (1, 2, 0.5, ...).
pub fn card_size(size: f32) -> (u32, u32) {
    let columns = size.ceil().max(1.0) as u32;
    let height = if size.fract() == 0.0 {
        CARD_HEIGHT
    } else {
        HALF_CARD_HEIGHT
    };
    (columns * CARD_WIDTH + (columns - 1) * CARD_GAP, height)
}

fn row_width(columns: u32) -> u32 {
    columns.max(1) * CARD_WIDTH + (columns.max(1) - 1) * CARD_GAP
}

/// Where one section goes in the template.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPlacement {
    /// Index into `Shop::sections`.
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub columns: u32,
}

/// Template dimensions and section placements, computed without touching pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopLayout {
    pub width: u32,
    pub height: u32,
    pub sections: Vec<SectionPlacement>,
}

impl ShopLayout {
    pub fn compute(shop: &Shop) -> Self {
        let spans: Vec<u32> = shop.sections.iter().map(ShopSection::column_span).collect();

        let split = if shop.sections.len() > SINGLE_COLUMN_MAX_SECTIONS {
            shop.sections.len() / 2 + shop.sections.len() % 2
        } else {
            shop.sections.len()
        };
        let (left, right) = spans.split_at(split);
        let left_max = left.iter().copied().max().unwrap_or(1);
        let right_max = right.iter().copied().max();

        let width = match right_max {
            Some(right_max) => {
                MARGIN + row_width(left_max) + COLUMN_GAP + row_width(right_max) + MARGIN
            }
            None => MARGIN + row_width(left_max) + MARGIN,
        };
        let rows = left.len() as u32;
        let height = MARGIN + HEADER_HEIGHT + (SECTION_SPACING + CARD_HEIGHT) * rows + FOOTER_HEIGHT;

        let sections = spans
            .iter()
            .enumerate()
            .map(|(index, &columns)| {
                let (column, row) = if index < split {
                    (0, index)
                } else {
                    (1, index - split)
                };
                SectionPlacement {
                    index,
                    x: MARGIN + column * (COLUMN_GAP + row_width(left_max)),
                    y: MARGIN + HEADER_HEIGHT + MARGIN + (SECTION_SPACING + CARD_HEIGHT) * row as u32,
                    columns,
                }
            })
            .collect();

        Self {
            width,
            height,
            sections,
        }
    }
}

/// Offset of each entry inside its section. Half-height entries stack in the same
/// column, the second one below the first.
pub fn entry_offsets(section: &ShopSection) -> Vec<(u32, u32)> {
    let mut position = 0.0_f32;
    section
        .entries
        .iter()
        .map(|entry| {
            let column = position.floor() as u32;
            let x = column * (CARD_WIDTH + CARD_GAP);
            let y = if position.fract() == 0.0 {
                0
            } else {
                HALF_CARD_HEIGHT + CARD_GAP
            };
            position += entry.size;
            (x, y)
        })
        .collect()
}

/// Text anchor points for every section and entry, in template coordinates.
pub fn compute_locations(shop: &Shop, layout: &ShopLayout) -> Vec<ShopSectionLocation> {
    layout
        .sections
        .iter()
        .map(|placement| {
            let section = &shop.sections[placement.index];
            let (sx, sy) = (placement.x as i32, placement.y as i32);

            let entries = section
                .entries
                .iter()
                .zip(entry_offsets(section))
                .map(|(entry, (ex, ey))| {
                    let (w, h) = card_size(entry.size);
                    let (x, y) = (sx + ex as i32, sy + ey as i32);
                    ShopEntryLocation {
                        id: entry.id.clone(),
                        name: LocationPoint::with_max_width(x, y + h as i32 - 52, w as i32),
                        price: LocationPoint::new(x + w as i32 - 41, y + h as i32 - 19),
                        banner: entry.banner.as_ref().map(|_| LocationPoint::new(x - 7, y - 7)),
                    }
                })
                .collect();

            ShopSectionLocation {
                id: section.id.clone(),
                name: section
                    .name
                    .as_ref()
                    .map(|_| LocationPoint::new(sx + 28, sy - 45 - 8)),
                entries,
            }
        })
        .collect()
}

/// A rendered template and the anchor points its text goes at.
#[derive(Debug, Clone)]
pub struct ShopTemplate {
    pub bitmap: Pixmap,
    pub locations: Vec<ShopSectionLocation>,
}

/// Static bitmaps and fonts used by the shop stages.
#[derive(Clone, Copy)]
pub struct ShopAssets<'a> {
    pub font: &'a Font<'static>,
    pub vbucks_icon: Option<&'a Pixmap>,
}

fn parse_colors(colors: &[String]) -> Vec<Rgba> {
    colors
        .iter()
        .filter_map(|c| match parse_hex_color(c) {
            Ok(color) => Some(color),
            Err(e) => {
                warn!(color = %c, error = %e, "Ignoring invalid color");
                None
            }
        })
        .collect()
}

fn stripe_color(entry: &ShopEntry) -> Rgba {
    entry
        .text_background_color
        .as_deref()
        .and_then(|c| parse_hex_color(c).ok())
        .or_else(|| {
            entry
                .background_colors
                .as_deref()
                .and_then(|colors| parse_colors(colors).last().copied())
        })
        .unwrap_or(Rgba::WHITE)
}

/// One shop card: background, item image, name plate and stripe. Names and prices are
/// added later by the locale stage.
pub fn generate_item_card(
    entry: &ShopEntry,
    image: Option<&Pixmap>,
    assets: &ShopAssets<'_>,
) -> CardResult<Pixmap> {
    let (width, height) = card_size(entry.size);
    let mut card = canvas::new_pixmap(width, height)?;

    // Fallback images are transparent renders and need a backdrop
    if entry.image_url.is_none() || image.is_none() {
        let colors = entry
            .background_colors
            .as_deref()
            .map(parse_colors)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CARD_GRADIENT.to_vec());
        let shader = canvas::corner_radial_gradient(width as f32, height as f32, &colors)?;
        canvas::fill_rect(
            &mut card,
            0.0,
            0.0,
            width as f32,
            height as f32,
            &canvas::shader_paint(shader),
        );
    }

    if let Some(image) = image {
        if entry.size == 1.0 {
            let resized = canvas::resize(image, 429, 429)?;
            let cropped = canvas::crop_center(&resized, width, resized.height())?;
            canvas::draw_bitmap(&mut card, &cropped, 0, 0);
        } else {
            let resized = canvas::resize(image, width, width)?;
            canvas::draw_bitmap(&mut card, &resized, 0, 0);
        }
    }

    components::draw_card_footer(&mut card, assets.vbucks_icon, stripe_color(entry))?;

    if entry.is_special {
        let style = TextStyle::new(assets.font, 60.0, Rgba::WHITE);
        let y = height as f32 - components::OVERLAY_HEIGHT as f32 - 15.0 - style.size;
        text::draw_text(&mut card, &style, "+", width as f32 - 10.0, y, Align::Right)?;
    }

    Ok(card)
}

/// Lay out all item cards and the footer.
///
/// `images` maps entry ids to decoded item images. Entries without an image get only
/// their gradient backdrop.
pub fn generate_template<P>(
    shop: &Shop,
    images: &HashMap<String, P>,
    assets: &ShopAssets<'_>,
) -> CardResult<ShopTemplate>
where
    P: Deref<Target = Pixmap>,
{
    let layout = ShopLayout::compute(shop);
    debug!(
        width = layout.width,
        height = layout.height,
        sections = layout.sections.len(),
        "Generating shop template"
    );

    let mut bitmap = canvas::new_pixmap(layout.width, layout.height)?;
    for placement in &layout.sections {
        let section = &shop.sections[placement.index];
        for (entry, (ex, ey)) in section.entries.iter().zip(entry_offsets(section)) {
            let image = images.get(&entry.id).map(|p| &**p);
            let card = generate_item_card(entry, image, assets)?;
            canvas::draw_bitmap(
                &mut bitmap,
                &card,
                (placement.x + ex) as i32,
                (placement.y + ey) as i32,
            );
        }
    }

    let footer = TextStyle::new(assets.font, 50.0, Rgba::WHITE);
    let footer_height = text::measure_text(assets.font, footer.size, FOOTER_TEXT).height;
    text::draw_text(
        &mut bitmap,
        &footer,
        FOOTER_TEXT,
        layout.width as f32 / 2.0,
        layout.height as f32 - footer_height - 35.0,
        Align::Center,
    )?;

    let locations = compute_locations(shop, &layout);
    Ok(ShopTemplate { bitmap, locations })
}

/// Draw the translated text onto a copy of the template.
pub fn generate_locale_template(
    shop: &Shop,
    template: &ShopTemplate,
    font: &Font<'static>,
) -> CardResult<Pixmap> {
    let mut bitmap = template.bitmap.clone();
    let white = TextStyle::new(font, 250.0, Rgba::WHITE);

    let title_width = text::measure_text(font, white.size, &shop.title).width;
    text::draw_text(&mut bitmap, &white, &shop.title, 100.0, 100.0, Align::Left)?;
    text::draw_text(
        &mut bitmap,
        &white.with_size(50.0),
        &shop.date,
        100.0 + title_width / 2.0,
        300.0,
        Align::Center,
    )?;

    for location in &template.locations {
        let Some(section) = shop.sections.iter().find(|s| s.id == location.id) else {
            continue;
        };

        if let (Some(point), Some(name)) = (location.name, section.name.as_deref()) {
            text::draw_text(
                &mut bitmap,
                &white.with_size(45.0),
                name,
                point.x as f32,
                point.y as f32,
                Align::Left,
            )?;
        }

        for entry_location in &location.entries {
            let Some(entry) = section.entries.iter().find(|e| e.id == entry_location.id) else {
                continue;
            };
            draw_entry_text(&mut bitmap, entry, entry_location, font)?;
        }
    }

    Ok(bitmap)
}

fn draw_entry_text(
    bitmap: &mut Pixmap,
    entry: &ShopEntry,
    location: &ShopEntryLocation,
    font: &Font<'static>,
) -> CardResult<()> {
    let name = location.name;
    let max_width = name.max_width.unwrap_or(CARD_WIDTH as i32) as f32 - 20.0;
    let name_size = text::fit_font_size(font, &entry.name, 20.0, max_width, 8.0);
    text::draw_text(
        bitmap,
        &TextStyle::new(font, name_size, Rgba::WHITE),
        &entry.name,
        name.x as f32 + name.max_width.unwrap_or(0) as f32 / 2.0,
        name.y as f32,
        Align::Center,
    )?;

    let price = location.price;
    let price_style = TextStyle::new(font, 15.0, Rgba::WHITE);
    text::draw_text(
        bitmap,
        &price_style,
        &entry.final_price,
        price.x as f32,
        price.y as f32,
        Align::Right,
    )?;

    if entry.is_discounted() {
        let final_width = text::measure_text(font, price_style.size, &entry.final_price).width;
        let old = text::measure_text(font, price_style.size, &entry.regular_price);
        let old_right = price.x as f32 - final_width - 6.0;
        text::draw_text(
            bitmap,
            &price_style.with_color(OLD_PRICE_COLOR),
            &entry.regular_price,
            old_right,
            price.y as f32,
            Align::Right,
        )?;
        canvas::draw_line(
            bitmap,
            (old_right - old.width - 3.0, price.y as f32 + old.height * 0.65),
            (old_right + 2.0, price.y as f32 + old.height * 0.4),
            2.0,
            STRIKE_COLOR,
        );
    }

    if let (Some(point), Some(banner)) = (location.banner, entry.banner.as_ref()) {
        let colors = parse_colors(&banner.colors);
        if colors.len() >= 3 {
            let bitmap_banner = components::banner(font, &banner.text, [colors[0], colors[1], colors[2]])?;
            canvas::draw_bitmap(bitmap, &bitmap_banner, point.x, point.y);
        } else {
            warn!(entry = %entry.id, "Banner needs three colors, skipping");
        }
    }
    Ok(())
}

/// Final shop image on a fresh pixmap: background, locale template, creator code box.
pub fn generate_shop_image(
    shop: &Shop,
    locale_template: &Pixmap,
    font: &Font<'static>,
    background: Option<&Pixmap>,
    ad_banner: Option<&Pixmap>,
) -> CardResult<Pixmap> {
    let (width, height) = (locale_template.width(), locale_template.height());
    let mut bitmap = canvas::new_pixmap(width, height)?;

    match background {
        Some(background) => {
            let resized = canvas::resize(background, width, height)?;
            canvas::fill_with_image(&mut bitmap, &resized, 50.0);
        }
        None => {
            let shader = canvas::linear_gradient(
                (width as f32 / 2.0, 0.0),
                (width as f32 / 2.0, height as f32),
                &BACKGROUND_GRADIENT,
            )?;
            canvas::fill_rounded_rect(
                &mut bitmap,
                0.0,
                0.0,
                width as f32,
                height as f32,
                width as f32 * 0.03,
                &canvas::shader_paint(shader),
            );
        }
    }

    canvas::draw_bitmap(&mut bitmap, locale_template, 0, 0);

    if let Some(code) = shop.creator_code.as_deref() {
        let title_width = text::measure_text(font, 250.0, &shop.title).width;
        let max_box_width = width as f32 - 100.0 - title_width - 100.0 - 100.0;
        let code_box = components::creator_code_box(font, &shop.creator_code_title, code, max_box_width)?;
        let box_x = width as i32 - 100 - code_box.width() as i32;
        canvas::draw_bitmap(&mut bitmap, &code_box, box_x, 100);

        if let Some(ad) = ad_banner {
            canvas::draw_bitmap(
                &mut bitmap,
                ad,
                width as i32 - 100 - 50 - ad.width() as i32,
                100 - ad.height() as i32 / 2,
            );
        }
    }

    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, size: f32) -> ShopEntry {
        ShopEntry {
            id: id.to_string(),
            regular_price: "1500".into(),
            final_price: "1200".into(),
            banner: None,
            size,
            background_colors: None,
            text_background_color: None,
            name: id.to_uppercase(),
            image_type: None,
            image_url: None,
            fallback_image_url: format!("http://img.invalid/{}.png", id),
            is_special: false,
        }
    }

    fn section(id: &str, entries: Vec<ShopEntry>) -> ShopSection {
        ShopSection {
            id: id.to_string(),
            name: Some(id.to_string()),
            entries,
        }
    }

    fn shop(sections: Vec<ShopSection>) -> Shop {
        Shop {
            date: "16.10.2026".into(),
            title: "ITEM SHOP".into(),
            creator_code_title: "Creator Code".into(),
            creator_code: None,
            background_image_path: None,
            new_shop: None,
            locale: "en".into(),
            sections,
        }
    }

    #[test]
    fn test_card_sizes() {
        assert_eq!(card_size(1.0), (286, 494));
        assert_eq!(card_size(2.0), (286 * 2 + 20, 494));
        assert_eq!(card_size(0.5), (286, 237));
    }

    #[test]
    fn test_single_column_layout() {
        let s = shop(vec![
            section("a", vec![entry("1", 1.0), entry("2", 2.0)]),
            section("b", vec![entry("3", 1.0)]),
        ]);
        let layout = ShopLayout::compute(&s);

        assert_eq!(layout.width, 100 + 3 * 286 + 2 * 20 + 100);
        assert_eq!(layout.height, 100 + 270 + (82 + 494) * 2 + 120);
        assert_eq!(layout.sections[0].x, 100);
        assert_eq!(layout.sections[0].y, 470);
        assert_eq!(layout.sections[1].y, 470 + 576);
    }

    #[test]
    fn test_two_column_layout_splits_sections() {
        let sections = (0..7)
            .map(|i| section(&format!("s{}", i), vec![entry(&format!("e{}", i), 1.0)]))
            .collect();
        let layout = ShopLayout::compute(&shop(sections));

        // 7 sections: 4 on the left, 3 on the right
        assert_eq!(layout.height, 100 + 270 + (82 + 494) * 4 + 120);
        assert_eq!(layout.width, 100 + 286 + 50 + 286 + 100);
        assert_eq!(layout.sections[3].x, 100);
        assert_eq!(layout.sections[4].x, 100 + 286 + 50);
        assert_eq!(layout.sections[4].y, layout.sections[0].y);
    }

    #[test]
    fn test_half_height_entries_stack() {
        let s = section("a", vec![entry("1", 0.5), entry("2", 0.5), entry("3", 1.0)]);
        assert_eq!(
            entry_offsets(&s),
            vec![(0, 0), (0, 257), (306, 0)]
        );
    }

    #[test]
    fn test_locations_follow_layout() {
        let mut first = entry("1", 1.0);
        first.banner = Some(card_common::models::ShopEntryBanner {
            text: "NEW".into(),
            colors: vec!["#ffff00".into(), "#dddd00".into(), "#000000".into()],
        });
        let s = shop(vec![section("a", vec![first, entry("2", 1.0)])]);
        let layout = ShopLayout::compute(&s);
        let locations = compute_locations(&s, &layout);

        let entries = &locations[0].entries;
        assert_eq!(entries[0].name, LocationPoint::with_max_width(100, 470 + 494 - 52, 286));
        assert_eq!(entries[0].price, LocationPoint::new(100 + 286 - 41, 470 + 494 - 19));
        assert_eq!(entries[0].banner, Some(LocationPoint::new(93, 463)));
        assert_eq!(entries[1].banner, None);
        assert_eq!(locations[0].name, Some(LocationPoint::new(128, 417)));
    }
}
