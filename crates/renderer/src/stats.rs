//! Player stats card.
//!
//! The template carries everything that does not depend on the player: background,
//! frosted boxes, box titles, playlist icons and value labels. It is cached per card
//! type and background. The final card adds the player's name and numbers.

use card_common::models::{RankedType, Stats, StatsEntry, StatsType};
use card_common::{parse_hex_color, CardError, CardResult, Rgba};
use rusttype::Font;
use tiny_skia::Pixmap;

use crate::canvas;
use crate::components;
use crate::text::{self, Align, TextStyle};

pub const WIDTH: u32 = 1505;
pub const NORMAL_HEIGHT: u32 = 777;
pub const COMPETITIVE_HEIGHT: u32 = 624;

const BACKGROUND_GRADIENT: [Rgba; 2] = [Rgba::rgb(41, 165, 224), Rgba::rgb(9, 66, 180)];
const LABEL_COLOR: Rgba = Rgba::rgb(211, 211, 211);
const BOX_COLOR: Rgba = Rgba::new(255, 255, 255, 51);
const BAR_BACKGROUND: Rgba = Rgba::new(255, 255, 255, 76);
const BOX_RADIUS: f32 = 30.0;
const BLUR_SIGMA: f32 = 5.0;

pub fn card_height(stats_type: StatsType) -> u32 {
    match stats_type {
        StatsType::Normal => NORMAL_HEIGHT,
        StatsType::Competitive => COMPETITIVE_HEIGHT,
    }
}

/// Fonts used on the stats card: a display face for titles and values, and a plain
/// face for labels and the player name.
#[derive(Clone, Copy)]
pub struct StatsFonts<'a> {
    pub display: &'a Font<'static>,
    pub plain: &'a Font<'static>,
}

/// Static icons drawn into the template.
#[derive(Clone, Copy, Default)]
pub struct StatsTemplateAssets<'a> {
    pub background: Option<&'a Pixmap>,
    pub solo_icon: Option<&'a Pixmap>,
    pub duos_icon: Option<&'a Pixmap>,
    pub trios_icon: Option<&'a Pixmap>,
    pub squads_icon: Option<&'a Pixmap>,
    pub teams_icon: Option<&'a Pixmap>,
    pub build_logo: Option<&'a Pixmap>,
    pub zero_build_logo: Option<&'a Pixmap>,
}

/// Per-player icons drawn onto the final card.
#[derive(Clone, Copy, Default)]
pub struct StatsImageAssets<'a> {
    pub input_icon: Option<&'a Pixmap>,
    pub verified_icon: Option<&'a Pixmap>,
    pub discord_logo: Option<&'a Pixmap>,
    /// Division icons, index-aligned with the competitive ranked entries.
    pub division_icons: &'a [Option<&'a Pixmap>],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playlist {
    Solo,
    Duos,
    Trios,
    Squads,
    Teams,
}

/// A frosted playlist box and where its labels and values go.
struct PlaylistBox {
    playlist: Playlist,
    title: &'static str,
    rect: (f32, f32, f32, f32),
    title_pos: (f32, f32),
    icon_pos: (i32, i32),
    /// (label, x, label y). Values go 27 px below their label.
    fields: &'static [(&'static str, f32, f32)],
}

const SOLO_FIELDS: &[(&str, f32, f32)] = &[
    ("Games", 537.0, 184.0),
    ("Wins", 698.0, 184.0),
    ("Win%", 837.0, 184.0),
    ("Kills", 537.0, 261.0),
    ("K/D", 698.0, 261.0),
    ("Top 25", 837.0, 261.0),
];
const DUOS_FIELDS: &[(&str, f32, f32)] = &[
    ("Games", 1016.0, 184.0),
    ("Wins", 1177.0, 184.0),
    ("Win%", 1316.0, 184.0),
    ("Kills", 1016.0, 261.0),
    ("K/D", 1177.0, 261.0),
    ("Top 12", 1316.0, 261.0),
];
const TRIOS_FIELDS: &[(&str, f32, f32)] = &[
    ("Games", 537.0, 414.0),
    ("Wins", 698.0, 414.0),
    ("Win%", 837.0, 414.0),
    ("Kills", 537.0, 491.0),
    ("K/D", 698.0, 491.0),
    ("Top 6", 837.0, 491.0),
];
const SQUADS_FIELDS: &[(&str, f32, f32)] = &[
    ("Games", 1016.0, 414.0),
    ("Wins", 1177.0, 414.0),
    ("Win%", 1316.0, 414.0),
    ("Kills", 1016.0, 491.0),
    ("K/D", 1177.0, 491.0),
    ("Top 6", 1316.0, 491.0),
];
const TEAMS_FIELDS: &[(&str, f32, f32)] = &[
    ("Games", 537.0, 644.0),
    ("Wins", 698.0, 644.0),
    ("Win%", 837.0, 644.0),
    ("Kills", 954.0, 644.0),
    ("K/D", 1115.0, 644.0),
];

const PLAYLIST_BOXES: &[PlaylistBox] = &[
    PlaylistBox {
        playlist: Playlist::Solo,
        title: "SOLO",
        rect: (517.0, 159.0, 459.0, 185.0),
        title_pos: (527.0, 134.0),
        icon_pos: (648, 134),
        fields: SOLO_FIELDS,
    },
    PlaylistBox {
        playlist: Playlist::Duos,
        title: "DUOS",
        rect: (996.0, 159.0, 459.0, 185.0),
        title_pos: (1006.0, 134.0),
        icon_pos: (1133, 134),
        fields: DUOS_FIELDS,
    },
    PlaylistBox {
        playlist: Playlist::Trios,
        title: "TRIOS",
        rect: (517.0, 389.0, 459.0, 185.0),
        title_pos: (527.0, 364.0),
        icon_pos: (663, 364),
        fields: TRIOS_FIELDS,
    },
    PlaylistBox {
        playlist: Playlist::Squads,
        title: "SQUADS",
        rect: (996.0, 389.0, 459.0, 185.0),
        title_pos: (1006.0, 364.0),
        icon_pos: (1191, 364),
        fields: SQUADS_FIELDS,
    },
    PlaylistBox {
        playlist: Playlist::Teams,
        title: "TEAMS",
        rect: (517.0, 619.0, 938.0, 108.0),
        title_pos: (527.0, 594.0),
        icon_pos: (683, 594),
        fields: TEAMS_FIELDS,
    },
];

const NORMAL_OVERALL_LABELS: &[(&str, f32, f32)] = &[
    ("Games", 70.0, 184.0),
    ("Wins", 231.0, 184.0),
    ("Win%", 370.0, 184.0),
    ("Kills", 70.0, 261.0),
    ("K/D", 231.0, 261.0),
    ("Playtime since Season 7", 70.0, 338.0),
    ("days", 70.0, 397.0),
    ("hours", 147.0, 397.0),
    ("minutes", 231.0, 397.0),
    ("BattlePass Level", 70.0, 442.0),
];

const COMPETITIVE_OVERALL_LABELS: &[(&str, f32, f32)] = &[
    ("Earnings", 70.0, 338.0),
    ("Power Ranking", 250.0, 338.0),
    ("Games", 70.0, 414.0),
    ("Wins", 231.0, 414.0),
    ("Win%", 370.0, 414.0),
    ("Kills", 70.0, 491.0),
    ("K/D", 231.0, 491.0),
];

const BATTLE_PASS_BAR: (f32, f32, f32, f32) = (158.0, 483.0, 309.0, 20.0);
const RANK_BAR_WIDTH: f32 = 130.0;
const RANK_BAR_HEIGHT: f32 = 6.0;

impl Playlist {
    fn entry<'a>(&self, stats: &'a Stats) -> Option<&'a StatsEntry> {
        match self {
            Playlist::Solo => Some(&stats.solo),
            Playlist::Duos => Some(&stats.duos),
            Playlist::Trios => Some(&stats.trios),
            Playlist::Squads => Some(&stats.squads),
            Playlist::Teams => stats.teams.as_ref(),
        }
    }

    fn icon<'a>(&self, assets: &StatsTemplateAssets<'a>) -> Option<&'a Pixmap> {
        match self {
            Playlist::Solo => assets.solo_icon,
            Playlist::Duos => assets.duos_icon,
            Playlist::Trios => assets.trios_icon,
            Playlist::Squads => assets.squads_icon,
            Playlist::Teams => assets.teams_icon,
        }
    }

    /// Values in the order of the box's fields.
    fn values<'a>(&self, entry: &'a StatsEntry) -> Vec<&'a str> {
        let mut values = vec![
            entry.matches_played.as_str(),
            entry.wins.as_str(),
            entry.win_ratio.as_str(),
            entry.kills.as_str(),
            entry.kd.as_str(),
        ];
        let placement = match self {
            Playlist::Solo => entry.top25.as_deref(),
            Playlist::Duos => entry.top12.as_deref(),
            Playlist::Trios | Playlist::Squads => entry.top6.as_deref(),
            Playlist::Teams => return values,
        };
        values.push(placement.unwrap_or("0"));
        values
    }
}

fn visible_boxes(stats_type: StatsType) -> impl Iterator<Item = &'static PlaylistBox> {
    PLAYLIST_BOXES
        .iter()
        .filter(move |b| b.playlist != Playlist::Teams || stats_type == StatsType::Normal)
}

fn frosted_box(pixmap: &mut Pixmap, rect: (f32, f32, f32, f32)) -> CardResult<()> {
    let (x, y, w, h) = rect;
    canvas::blur_region(pixmap, x, y, w, h, BOX_RADIUS, BLUR_SIGMA)?;
    canvas::fill_rounded_rect(pixmap, x, y, w, h, BOX_RADIUS, &canvas::solid_paint(BOX_COLOR));
    Ok(())
}

fn draw_labels(pixmap: &mut Pixmap, style: &TextStyle<'_>, labels: &[(&str, f32, f32)]) -> CardResult<()> {
    for (label, x, y) in labels {
        text::draw_text(pixmap, style, label, *x, *y, Align::Left)?;
    }
    Ok(())
}

/// Width of the filled part of a bar: proportional, but never thinner than `min` once
/// there is any progress.
pub fn bar_fill_width(max_width: f32, progress: f32, min: f32) -> f32 {
    let width = (max_width * progress.clamp(0.0, 1.0)).trunc();
    if width > 0.0 {
        width.max(min)
    } else {
        0.0
    }
}

pub fn generate_template(
    stats_type: StatsType,
    fonts: &StatsFonts<'_>,
    assets: &StatsTemplateAssets<'_>,
) -> CardResult<Pixmap> {
    let height = card_height(stats_type);
    let mut bitmap = canvas::new_pixmap(WIDTH, height)?;
    let (w, h) = (WIDTH as f32, height as f32);

    match assets.background {
        Some(background) => {
            let resized = canvas::resize(background, WIDTH, height)?;
            canvas::fill_with_image(&mut bitmap, &resized, 50.0);
        }
        None => {
            let shader = canvas::corner_radial_gradient(w, h, &BACKGROUND_GRADIENT)?;
            canvas::fill_rounded_rect(&mut bitmap, 0.0, 0.0, w, h, 50.0, &canvas::shader_paint(shader));
        }
    }

    canvas::fill_rounded_rect(
        &mut bitmap,
        134.0,
        57.0,
        5.0,
        50.0,
        3.0,
        &canvas::solid_paint(Rgba::rgb(128, 128, 128)),
    );

    let box_title = TextStyle::new(fonts.display, 50.0, Rgba::WHITE);
    let label = TextStyle::new(fonts.plain, 20.0, LABEL_COLOR);

    match stats_type {
        StatsType::Competitive => {
            frosted_box(&mut bitmap, (50.0, 159.0, 437.0, 415.0))?;
            let upper = canvas::rounded_rect_path_corners(
                49.0,
                159.0,
                437.0,
                158.0,
                [BOX_RADIUS, BOX_RADIUS, 0.0, 0.0],
            );
            canvas::fill_path(&mut bitmap, upper, &canvas::solid_paint(BOX_COLOR));
            canvas::fill_rounded_rect(
                &mut bitmap,
                267.0,
                192.0,
                1.0,
                77.0,
                1.0,
                &canvas::solid_paint(Rgba::WHITE.with_alpha(127)),
            );
            if let Some(logo) = assets.build_logo {
                canvas::draw_bitmap(&mut bitmap, logo, 115, 277);
            }
            if let Some(logo) = assets.zero_build_logo {
                canvas::draw_bitmap(&mut bitmap, logo, 317, 277);
            }
            text::draw_text(
                &mut bitmap,
                &box_title.with_size(25.0),
                "OVERALL",
                211.0,
                305.0,
                Align::Left,
            )?;
            draw_labels(&mut bitmap, &label, COMPETITIVE_OVERALL_LABELS)?;
        }
        StatsType::Normal => {
            frosted_box(&mut bitmap, (50.0, 159.0, 437.0, 568.0))?;
            text::draw_text(&mut bitmap, &box_title, "OVERALL", 60.0, 134.0, Align::Left)?;
            draw_labels(&mut bitmap, &label, NORMAL_OVERALL_LABELS)?;

            let (x, y, bw, bh) = BATTLE_PASS_BAR;
            canvas::fill_rounded_rect(&mut bitmap, x, y, bw, bh, 10.0, &canvas::solid_paint(BAR_BACKGROUND));
        }
    }

    for playlist_box in visible_boxes(stats_type) {
        frosted_box(&mut bitmap, playlist_box.rect)?;
        let (tx, ty) = playlist_box.title_pos;
        text::draw_text(&mut bitmap, &box_title, playlist_box.title, tx, ty, Align::Left)?;
        if let Some(icon) = playlist_box.playlist.icon(assets) {
            let (ix, iy) = playlist_box.icon_pos;
            canvas::draw_bitmap(&mut bitmap, icon, ix, iy);
        }
        draw_labels(&mut bitmap, &label, playlist_box.fields)?;
    }

    Ok(bitmap)
}

fn bar_colors(stats: &Stats) -> CardResult<Vec<Rgba>> {
    let colors = stats
        .battle_pass_level_bar_colors
        .iter()
        .take(2)
        .map(|c| parse_hex_color(c))
        .collect::<CardResult<Vec<_>>>()?;
    if colors.is_empty() {
        return Err(CardError::InvalidRequest("battlePassLevelBarColors is empty".into()));
    }
    Ok(colors)
}

fn gradient_bar(
    pixmap: &mut Pixmap,
    rect: (f32, f32, f32, f32),
    colors: &[Rgba],
    radius: f32,
) -> CardResult<()> {
    let (x, y, w, h) = rect;
    let shader = canvas::linear_gradient((x, 0.0), (x + w, 0.0), colors)?;
    canvas::fill_rounded_rect(pixmap, x, y, w, h, radius, &canvas::shader_paint(shader));
    Ok(())
}

/// Draw the player's numbers onto a copy of the template.
pub fn generate_image(
    stats: &Stats,
    stats_type: StatsType,
    template: &Pixmap,
    fonts: &StatsFonts<'_>,
    assets: &StatsImageAssets<'_>,
) -> CardResult<Pixmap> {
    stats
        .validate_for(stats_type)
        .map_err(CardError::InvalidRequest)?;

    let mut bitmap = template.clone();
    let value = TextStyle::new(fonts.display, 35.0, Rgba::WHITE);
    let colors = bar_colors(stats)?;

    if let Some(icon) = assets.input_icon {
        canvas::draw_bitmap(&mut bitmap, icon, 50, 50);
    }

    let name_style = TextStyle::new(fonts.plain, 64.0, Rgba::WHITE);
    let name_width = text::measure_text(fonts.plain, name_style.size, &stats.player_name).width;
    text::draw_text(&mut bitmap, &name_style, &stats.player_name, 159.0, 58.0, Align::Left)?;

    if stats.is_verified {
        if let Some(icon) = assets.verified_icon {
            canvas::draw_bitmap(&mut bitmap, icon, (159.0 + name_width + 5.0) as i32, 47);
        }
        let username = stats.user_name.as_deref().unwrap_or("???#0000");
        let discord = components::discord_box(fonts.plain, assets.discord_logo, username, 1.0)?;
        canvas::draw_bitmap(
            &mut bitmap,
            &discord,
            WIDTH as i32 - 50 - discord.width() as i32,
            39,
        );
    }

    match (stats_type, stats.competitive.as_ref()) {
        (StatsType::Competitive, Some(competitive)) => {
            for (i, entry) in competitive.ranked_stats_entries.iter().enumerate() {
                let x = match entry.ranking_type {
                    RankedType::BattleRoyale => 151.0,
                    RankedType::ZeroBuild => 379.0,
                };
                if let Some(Some(icon)) = assets.division_icons.get(i) {
                    canvas::draw_bitmap(&mut bitmap, icon, x as i32 - icon.width() as i32 / 2, 109);
                }
                text::draw_text(&mut bitmap, &value, &entry.division_name, x, 206.0, Align::Center)?;

                match entry.ranking.as_deref() {
                    Some(ranking) => {
                        text::draw_text(
                            &mut bitmap,
                            &value.with_size(20.0),
                            ranking,
                            x,
                            245.0,
                            Align::Center,
                        )?;
                    }
                    None => {
                        let progress_text = format!("{}%", (entry.progress.clamp(0.0, 1.0) * 100.0) as i32);
                        let progress_style =
                            TextStyle::new(fonts.plain, 16.0, Rgba::WHITE.with_alpha(178));
                        let text_width =
                            text::measure_text(fonts.plain, progress_style.size, &progress_text).width;
                        let bar_x = x - text_width / 2.0 - RANK_BAR_WIDTH / 2.0;

                        canvas::fill_rounded_rect(
                            &mut bitmap,
                            bar_x,
                            250.0,
                            RANK_BAR_WIDTH,
                            RANK_BAR_HEIGHT,
                            10.0,
                            &canvas::solid_paint(Rgba::WHITE.with_alpha(51)),
                        );
                        let fill = bar_fill_width(RANK_BAR_WIDTH, entry.progress, RANK_BAR_HEIGHT);
                        if fill > 0.0 {
                            gradient_bar(&mut bitmap, (bar_x, 250.0, fill, RANK_BAR_HEIGHT), &colors, 10.0)?;
                        }
                        text::draw_text_middle(
                            &mut bitmap,
                            &progress_style,
                            &progress_text,
                            bar_x + RANK_BAR_WIDTH + 7.0,
                            253.0,
                            Align::Left,
                        )?;
                    }
                }
            }

            let overall = &stats.overall;
            let fields: [(&str, f32, f32); 7] = [
                (competitive.earnings.as_str(), 70.0, 365.0),
                (competitive.power_ranking.as_str(), 250.0, 365.0),
                (overall.matches_played.as_str(), 70.0, 441.0),
                (overall.wins.as_str(), 231.0, 441.0),
                (overall.win_ratio.as_str(), 370.0, 441.0),
                (overall.kills.as_str(), 70.0, 518.0),
                (overall.kd.as_str(), 231.0, 518.0),
            ];
            draw_labels(&mut bitmap, &value, &fields)?;
        }
        _ => {
            let overall = &stats.overall;
            let level = (stats.battle_pass_level.trunc() as i64).to_string();
            let fields: [(&str, f32, f32); 9] = [
                (overall.matches_played.as_str(), 70.0, 211.0),
                (overall.wins.as_str(), 231.0, 211.0),
                (overall.win_ratio.as_str(), 370.0, 211.0),
                (overall.kills.as_str(), 70.0, 288.0),
                (overall.kd.as_str(), 231.0, 288.0),
                (stats.playtime.days.as_str(), 70.0, 369.0),
                (stats.playtime.hours.as_str(), 147.0, 369.0),
                (stats.playtime.minutes.as_str(), 213.0, 369.0),
                (level.as_str(), 70.0, 479.0),
            ];
            draw_labels(&mut bitmap, &value, &fields)?;

            let (x, y, w, h) = BATTLE_PASS_BAR;
            let fill = bar_fill_width(w, stats.battle_pass_progress(), h);
            if fill > 0.0 {
                gradient_bar(&mut bitmap, (x, y, fill, h), &colors, 10.0)?;
            }
        }
    }

    for playlist_box in visible_boxes(stats_type) {
        let Some(entry) = playlist_box.playlist.entry(stats) else {
            continue;
        };
        let values = playlist_box.playlist.values(entry);
        for ((_, x, y), v) in playlist_box.fields.iter().zip(values) {
            text::draw_text(&mut bitmap, &value, v, *x, *y + 27.0, Align::Left)?;
        }
    }

    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_heights() {
        assert_eq!(card_height(StatsType::Normal), 777);
        assert_eq!(card_height(StatsType::Competitive), 624);
    }

    #[test]
    fn test_bar_fill_width() {
        assert_eq!(bar_fill_width(309.0, 0.0, 20.0), 0.0);
        assert_eq!(bar_fill_width(309.0, 0.01, 20.0), 20.0);
        assert_eq!(bar_fill_width(309.0, 0.5, 20.0), 154.0);
        assert_eq!(bar_fill_width(309.0, 1.7, 20.0), 309.0);
    }

    #[test]
    fn test_teams_box_only_on_normal_cards() {
        assert_eq!(visible_boxes(StatsType::Normal).count(), 5);
        assert_eq!(visible_boxes(StatsType::Competitive).count(), 4);
    }

    #[test]
    fn test_boxes_fit_on_their_card() {
        for stats_type in [StatsType::Normal, StatsType::Competitive] {
            for b in visible_boxes(stats_type) {
                let (x, y, w, h) = b.rect;
                assert!(x + w <= WIDTH as f32);
                assert!(y + h <= card_height(stats_type) as f32, "{} overflows", b.title);
            }
        }
    }

    #[test]
    fn test_field_counts_match_values() {
        let entry = StatsEntry {
            matches_played: "1".into(),
            wins: "2".into(),
            win_ratio: "3".into(),
            kills: "4".into(),
            kd: "5".into(),
            top25: Some("6".into()),
            top12: None,
            top6: None,
        };
        for b in PLAYLIST_BOXES {
            assert_eq!(b.fields.len(), b.playlist.values(&entry).len());
        }
        assert_eq!(Playlist::Solo.values(&entry)[5], "6");
        assert_eq!(Playlist::Duos.values(&entry)[5], "0");
    }
}
