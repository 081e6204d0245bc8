//! Benchmarks for the card renderers.
//!
//! Run with: cargo bench --package renderer --bench render_benchmarks

use std::collections::HashMap;

use card_common::models::{Locker, LockerItem, Shop, ShopEntry, ShopSection, SourceType};
use card_common::Rgba;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use renderer::locker::LockerCardInputs;
use renderer::shop::ShopAssets;
use renderer::{canvas, codec, locker, shop, text, Pixmap};

/// Noisy opaque image standing in for a fetched item render.
fn noise_image(width: u32, height: u32) -> Pixmap {
    let mut rng = rand::thread_rng();
    let mut pixmap = canvas::new_pixmap(width, height).unwrap();
    for px in pixmap.data_mut().chunks_mut(4) {
        px[0] = rng.gen();
        px[1] = rng.gen();
        px[2] = rng.gen();
        px[3] = 255;
    }
    pixmap
}

fn shop_fixture(sections: usize, entries: usize) -> Shop {
    Shop {
        date: "16.10.2026".into(),
        title: "ITEM SHOP".into(),
        creator_code_title: "Creator Code".into(),
        creator_code: Some("BENCH".into()),
        background_image_path: None,
        new_shop: None,
        locale: "en".into(),
        sections: (0..sections)
            .map(|s| ShopSection {
                id: format!("section{}", s),
                name: Some(format!("Section {}", s)),
                entries: (0..entries)
                    .map(|e| ShopEntry {
                        id: format!("entry{}_{}", s, e),
                        regular_price: "1500".into(),
                        final_price: "1200".into(),
                        banner: None,
                        size: 1.0,
                        background_colors: None,
                        text_background_color: Some("#00ff00".into()),
                        name: format!("Item {}", e),
                        image_type: None,
                        image_url: Some("http://img.invalid/x.png".into()),
                        fallback_image_url: "http://img.invalid/x.png".into(),
                        is_special: false,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn bench_item_cards(c: &mut Criterion) {
    let font = text::fallback_font().unwrap();
    let image = noise_image(512, 512);
    let icon = noise_image(64, 64);
    let assets = ShopAssets {
        font: &font,
        vbucks_icon: Some(&icon),
    };
    let shop = shop_fixture(1, 1);
    let entry = &shop.sections[0].entries[0];

    c.bench_function("shop_item_card", |b| {
        b.iter(|| shop::generate_item_card(black_box(entry), Some(&image), &assets).unwrap())
    });
}

fn bench_shop_template(c: &mut Criterion) {
    let font = text::fallback_font().unwrap();
    let image = noise_image(512, 512);
    let assets = ShopAssets {
        font: &font,
        vbucks_icon: None,
    };

    let mut group = c.benchmark_group("shop_template");
    group.sample_size(10);
    for sections in [2usize, 6, 10] {
        let shop = shop_fixture(sections, 4);
        let images: HashMap<String, &Pixmap> = shop.entries().map(|e| (e.id.clone(), &image)).collect();
        group.throughput(Throughput::Elements(shop.entries().count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sections), &shop, |b, shop| {
            b.iter(|| shop::generate_template(black_box(shop), &images, &assets).unwrap())
        });
    }
    group.finish();
}

fn bench_locker_cards(c: &mut Criterion) {
    let font = text::fallback_font().unwrap();
    let image = noise_image(256, 256);

    let mut group = c.benchmark_group("locker_cards");
    group.sample_size(10);
    for items in [10usize, 50, 100] {
        let locker = Locker {
            request_id: "bench".into(),
            locale: "en".into(),
            player_name: "Player".into(),
            user_name: "player".into(),
            items: (0..items)
                .map(|i| LockerItem {
                    id: format!("item{}", i),
                    name: format!("Item {}", i),
                    description: "Outfit".into(),
                    rarity: "Epic".into(),
                    rarity_color: "#b14cf6".into(),
                    image_url: None,
                    source_type: SourceType::Other,
                    source: String::new(),
                })
                .collect(),
        };
        let inputs = vec![
            LockerCardInputs {
                image: Some(&image),
                ..LockerCardInputs::default()
            };
            items
        ];
        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &locker, |b, locker| {
            b.iter(|| locker::generate_item_cards(black_box(locker), &inputs, &font).unwrap())
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut pixmap = noise_image(1505, 777);
    canvas::fill_rounded_rect(
        &mut pixmap,
        50.0,
        50.0,
        400.0,
        400.0,
        30.0,
        &canvas::solid_paint(Rgba::WHITE.with_alpha(51)),
    );

    let mut group = c.benchmark_group("encode");
    group.sample_size(10);
    group.bench_function("png", |b| b.iter(|| codec::encode_png(black_box(&pixmap)).unwrap()));
    group.bench_function("jpeg", |b| {
        b.iter(|| codec::encode_jpeg(black_box(&pixmap), 90).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_item_cards,
    bench_shop_template,
    bench_locker_cards,
    bench_encode
);
criterion_main!(benches);
