//! End-to-end rendering tests using the embedded fallback font and synthetic bitmaps.

use std::collections::HashMap;

use card_common::models::{
    CompetitiveStats, Locker, LockerItem, Playtime, RankedStatsEntry, RankedType, Shop,
    ShopEntry, ShopEntryBanner, ShopSection, SourceType, Stats, StatsEntry, StatsType,
};
use card_common::{CardError, Rgba};
use renderer::locker::{self, LockerCardInputs, LockerGrid};
use renderer::shop::{self, ShopAssets, ShopLayout};
use renderer::stats::{self, StatsFonts, StatsImageAssets, StatsTemplateAssets};
use renderer::{canvas, codec, text, Font, Pixmap};

fn font() -> Font<'static> {
    text::fallback_font().unwrap()
}

fn solid(width: u32, height: u32, color: Rgba) -> Pixmap {
    let mut pixmap = canvas::new_pixmap(width, height).unwrap();
    pixmap.fill(canvas::to_color(color));
    pixmap
}

fn shop_entry(id: &str, size: f32) -> ShopEntry {
    ShopEntry {
        id: id.into(),
        regular_price: "2000".into(),
        final_price: "1500".into(),
        banner: Some(ShopEntryBanner {
            text: "NEW".into(),
            colors: vec!["#ffff00".into(), "#eeee00".into(), "#000000".into()],
        }),
        size,
        background_colors: Some(vec!["#ff00ff".into(), "#330033".into()]),
        text_background_color: None,
        name: format!("Item {}", id),
        image_type: None,
        image_url: Some(format!("http://img.invalid/{}.png", id)),
        fallback_image_url: format!("http://img.invalid/{}_fb.png", id),
        is_special: id == "special",
    }
}

fn test_shop() -> Shop {
    Shop {
        date: "16.10.2026".into(),
        title: "ITEM SHOP".into(),
        creator_code_title: "Creator Code".into(),
        creator_code: Some("EASYFNSTATS".into()),
        background_image_path: None,
        new_shop: Some(true),
        locale: "en".into(),
        sections: vec![
            ShopSection {
                id: "featured".into(),
                name: Some("Featured".into()),
                entries: vec![shop_entry("a", 2.0), shop_entry("special", 1.0)],
            },
            ShopSection {
                id: "daily".into(),
                name: None,
                entries: vec![shop_entry("b", 0.5), shop_entry("c", 0.5), shop_entry("d", 1.0)],
            },
        ],
    }
}

#[test]
fn test_shop_pipeline_produces_consistent_sizes() {
    let font = font();
    let shop = test_shop();
    let item = solid(512, 512, Rgba::rgb(200, 10, 10));
    let images: HashMap<String, &Pixmap> = shop.entries().map(|e| (e.id.clone(), &item)).collect();
    let assets = ShopAssets {
        font: &font,
        vbucks_icon: Some(&item),
    };

    let template = shop::generate_template(&shop, &images, &assets).unwrap();
    let layout = ShopLayout::compute(&shop);
    assert_eq!(template.bitmap.width(), layout.width);
    assert_eq!(template.bitmap.height(), layout.height);
    assert_eq!(template.locations.len(), 2);
    assert!(template.locations[1].name.is_none());

    // The first card's image is drawn at the first section's origin
    let origin = &layout.sections[0];
    let px = template.bitmap.pixel(origin.x + 20, origin.y + 20).unwrap();
    assert!(px.alpha() > 250);
    assert!((195..=205).contains(&px.red()));
    assert!(px.green() < 20);

    let locale = shop::generate_locale_template(&shop, &template, &font).unwrap();
    assert_eq!(locale.width(), template.bitmap.width());
    assert_ne!(locale.data(), template.bitmap.data());

    let final_image = shop::generate_shop_image(&shop, &locale, &font, None, None).unwrap();
    assert_eq!(final_image.height(), locale.height());
    // Background gradient fills the area around the cards
    let background = final_image.pixel(final_image.width() / 2, 40).unwrap();
    assert_eq!(background.alpha(), 255);
}

#[test]
fn test_shop_template_without_images_uses_backdrop() {
    let font = font();
    let shop = test_shop();
    let images: HashMap<String, &Pixmap> = HashMap::new();
    let assets = ShopAssets {
        font: &font,
        vbucks_icon: None,
    };

    let template = shop::generate_template(&shop, &images, &assets).unwrap();
    let origin = &ShopLayout::compute(&shop).sections[0];
    let px = template.bitmap.pixel(origin.x + 100, origin.y + 100).unwrap();
    assert_eq!(px.alpha(), 255);
    assert!(px.red() > 0 && px.blue() > 0);
}

#[test]
fn test_shop_image_uses_custom_background() {
    let font = font();
    let locale = canvas::new_pixmap(400, 300).unwrap();
    let background = solid(10, 10, Rgba::rgb(0, 128, 0));
    let mut shop = test_shop();
    shop.creator_code = None;

    let image = shop::generate_shop_image(&shop, &locale, &font, Some(&background), None).unwrap();
    let px = image.pixel(200, 150).unwrap();
    assert!(px.red() < 3 && px.blue() < 3);
    assert!((124..=132).contains(&px.green()));
    // Rounded corners stay transparent
    assert_eq!(image.pixel(0, 0).unwrap().alpha(), 0);
}

fn locker_fixture(items: usize) -> Locker {
    Locker {
        request_id: "req-1".into(),
        locale: "en".into(),
        player_name: "Player".into(),
        user_name: "player#0001".into(),
        items: (0..items)
            .map(|i| LockerItem {
                id: format!("item{}", i),
                name: format!("Item {}", i),
                description: "Outfit".into(),
                rarity: "Legendary".into(),
                rarity_color: "#ea8d23".into(),
                image_url: None,
                source_type: if i % 2 == 0 {
                    SourceType::VBucks
                } else {
                    SourceType::Other
                },
                source: String::new(),
            })
            .collect(),
    }
}

#[test]
fn test_locker_cards_render_in_order() {
    let font = font();
    let locker = locker_fixture(7);
    let images: Vec<Pixmap> = (0..7)
        .map(|i| solid(256, 256, Rgba::rgb(i * 30, 0, 0)))
        .collect();
    let inputs: Vec<LockerCardInputs> = images
        .iter()
        .map(|image| LockerCardInputs {
            image: Some(image),
            ..LockerCardInputs::default()
        })
        .collect();

    let cards = locker::generate_item_cards(&locker, &inputs, &font).unwrap();
    assert_eq!(cards.len(), 7);
    for (i, card) in cards.iter().enumerate() {
        assert_eq!((card.width(), card.height()), (256, 313));
        assert_eq!(card.pixel(20, 20).unwrap().red(), i as u8 * 30);
    }

    let image = locker::generate_locker_image(&locker, &cards, &font).unwrap();
    let grid = LockerGrid::for_items(7);
    assert_eq!((image.width(), image.height()), grid.image_size());

    let (x, y) = grid.card_position(6);
    assert_eq!(image.pixel(x + 20, y + 20).unwrap().red(), 180);
}

#[test]
fn test_locker_card_without_inputs_still_renders() {
    let font = font();
    let locker = locker_fixture(1);
    let card = locker::generate_item_card(&locker.items[0], &LockerCardInputs::default(), &font).unwrap();
    assert_eq!(card.pixel(5, 5).unwrap().alpha(), 0);
    assert_eq!(card.pixel(5, 310).unwrap().alpha(), 255);
}

fn entry() -> StatsEntry {
    StatsEntry {
        matches_played: "100".into(),
        wins: "10".into(),
        win_ratio: "10%".into(),
        kills: "300".into(),
        kd: "3.33".into(),
        top25: Some("40".into()),
        top12: Some("30".into()),
        top6: Some("20".into()),
    }
}

fn stats_fixture() -> Stats {
    Stats {
        player_name: "Player".into(),
        input_type: "KeyboardMouse".into(),
        is_verified: true,
        user_name: Some("player#0001".into()),
        background_image_path: None,
        playtime: Playtime {
            days: "1".into(),
            hours: "2".into(),
            minutes: "3".into(),
        },
        battle_pass_level: 42.5,
        battle_pass_level_bar_colors: vec!["#ff0000".into(), "#0000ff".into()],
        competitive: Some(CompetitiveStats {
            ranked_stats_entries: vec![
                RankedStatsEntry {
                    ranking_type: RankedType::BattleRoyale,
                    division: 5,
                    division_name: "Gold II".into(),
                    progress: 0.4,
                    ranking: None,
                },
                RankedStatsEntry {
                    ranking_type: RankedType::ZeroBuild,
                    division: 18,
                    division_name: "Unreal".into(),
                    progress: 1.0,
                    ranking: Some("#1234".into()),
                },
            ],
            earnings: "$0".into(),
            power_ranking: "12345".into(),
        }),
        overall: entry(),
        solo: entry(),
        duos: entry(),
        trios: entry(),
        squads: entry(),
        teams: Some(entry()),
    }
}

#[test]
fn test_stats_cards_for_both_types() {
    let font = font();
    let fonts = StatsFonts {
        display: &font,
        plain: &font,
    };
    let icon = solid(40, 40, Rgba::WHITE);
    let division_icons = [Some(&icon), None];
    let image_assets = StatsImageAssets {
        input_icon: Some(&icon),
        verified_icon: Some(&icon),
        discord_logo: Some(&icon),
        division_icons: &division_icons,
    };
    let stats = stats_fixture();

    for stats_type in [StatsType::Normal, StatsType::Competitive] {
        let template = stats::generate_template(stats_type, &fonts, &StatsTemplateAssets::default()).unwrap();
        assert_eq!(template.width(), stats::WIDTH);
        assert_eq!(template.height(), stats::card_height(stats_type));

        let image = stats::generate_image(&stats, stats_type, &template, &fonts, &image_assets).unwrap();
        assert_eq!(image.height(), template.height());
        // Input icon drawn at (50, 50)
        let px = image.pixel(60, 60).unwrap();
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (255, 255, 255, 255));
    }
}

#[test]
fn test_stats_missing_teams_is_rejected() {
    let font = font();
    let fonts = StatsFonts {
        display: &font,
        plain: &font,
    };
    let mut stats = stats_fixture();
    stats.teams = None;

    let template = canvas::new_pixmap(stats::WIDTH, stats::NORMAL_HEIGHT).unwrap();
    let result = stats::generate_image(
        &stats,
        StatsType::Normal,
        &template,
        &fonts,
        &StatsImageAssets::default(),
    );
    assert!(matches!(result, Err(CardError::InvalidRequest(_))));
}

#[test]
fn test_rendered_card_encodes_as_png() {
    let font = font();
    let locker = locker_fixture(1);
    let card = locker::generate_item_card(&locker.items[0], &LockerCardInputs::default(), &font).unwrap();
    let png = codec::encode_png(&card).unwrap();
    let decoded = codec::decode(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (256, 313));
}
