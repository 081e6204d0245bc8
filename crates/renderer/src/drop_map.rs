//! Drop location marker on the island map.

use card_common::models::DropLocation;
use card_common::CardResult;
use tiny_skia::Pixmap;

use crate::canvas;

/// Half the island's side length in world units.
pub const WORLD_RADIUS: f32 = 150_000.0;
pub const X_OFFSET: f32 = 80.0;
pub const Y_OFFSET: f32 = 60.0;

/// Map pixel for world coordinates. World `y` grows to the right, world `x` grows up.
pub fn marker_position(x: i32, y: i32, map_width: u32, map_height: u32) -> (f32, f32) {
    let mx = (y as f32 + WORLD_RADIUS) / (WORLD_RADIUS * 2.0) * map_width as f32 + X_OFFSET;
    let my = (1.0 - (x as f32 + WORLD_RADIUS) / (WORLD_RADIUS * 2.0)) * map_height as f32 + Y_OFFSET;
    (mx, my)
}

/// Copy of `map` with `marker` standing on the drop location (bottom center of the
/// marker at the location).
pub fn generate_drop_image(map: &Pixmap, marker: &Pixmap, location: &DropLocation) -> CardResult<Pixmap> {
    let mut bitmap = canvas::new_pixmap(map.width(), map.height())?;
    canvas::draw_bitmap(&mut bitmap, map, 0, 0);

    let (mx, my) = marker_position(location.x, location.y, map.width(), map.height());
    canvas::draw_bitmap(
        &mut bitmap,
        marker,
        (mx - marker.width() as f32 / 2.0) as i32,
        (my - marker.height() as f32) as i32,
    );
    Ok(bitmap)
}
