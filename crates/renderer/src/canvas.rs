//! Drawing helpers over tiny-skia.
//!
//! Everything here works on premultiplied [`Pixmap`]s. Cached bitmaps are only
//! ever read; drawing always targets a freshly allocated pixmap.

use card_common::{CardError, CardResult, Rgba};
use image::RgbaImage;
use tiny_skia::{
    Color, FillRule, FilterQuality, GradientStop, IntRect, IntSize, LinearGradient, Mask, Paint, Path,
    PathBuilder, Pattern, Pixmap, PixmapPaint, Point, RadialGradient, Rect, Shader, SpreadMode,
    Stroke, Transform,
};

/// Cubic Bézier control point distance for quarter circles.
const KAPPA: f32 = 0.552_284_8;

/// Allocate a transparent pixmap.
pub fn new_pixmap(width: u32, height: u32) -> CardResult<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| {
        CardError::RenderFailed(format!("Invalid canvas size {}x{}", width, height))
    })
}

pub fn to_color(color: Rgba) -> Color {
    Color::from_rgba8(color.r, color.g, color.b, color.a)
}

/// Solid anti-aliased paint.
pub fn solid_paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// Anti-aliased paint using `shader`.
pub fn shader_paint(shader: Shader<'_>) -> Paint<'_> {
    Paint {
        shader,
        anti_alias: true,
        ..Paint::default()
    }
}

fn stops(colors: &[Rgba]) -> CardResult<Vec<GradientStop>> {
    match colors.len() {
        0 => Err(CardError::RenderFailed("Gradient needs at least one color".into())),
        1 => Ok(vec![
            GradientStop::new(0.0, to_color(colors[0])),
            GradientStop::new(1.0, to_color(colors[0])),
        ]),
        n => Ok(colors
            .iter()
            .enumerate()
            .map(|(i, c)| GradientStop::new(i as f32 / (n - 1) as f32, to_color(*c)))
            .collect()),
    }
}

/// Linear gradient from `start` to `end`, colors spread evenly.
pub fn linear_gradient(
    start: (f32, f32),
    end: (f32, f32),
    colors: &[Rgba],
) -> CardResult<Shader<'static>> {
    LinearGradient::new(
        Point::from_xy(start.0, start.1),
        Point::from_xy(end.0, end.1),
        stops(colors)?,
        SpreadMode::Pad,
        Transform::identity(),
    )
    .ok_or_else(|| CardError::RenderFailed("Invalid linear gradient".into()))
}

/// Radial gradient centered on `center`.
pub fn radial_gradient(
    center: (f32, f32),
    radius: f32,
    colors: &[Rgba],
) -> CardResult<Shader<'static>> {
    let center = Point::from_xy(center.0, center.1);
    RadialGradient::new(
        center,
        center,
        radius,
        stops(colors)?,
        SpreadMode::Pad,
        Transform::identity(),
    )
    .ok_or_else(|| CardError::RenderFailed("Invalid radial gradient".into()))
}

/// Radial gradient filling a `width` x `height` area from its center to its corners.
pub fn corner_radial_gradient(width: f32, height: f32, colors: &[Rgba]) -> CardResult<Shader<'static>> {
    let (cx, cy) = (width / 2.0, height / 2.0);
    radial_gradient((cx, cy), (cx * cx + cy * cy).sqrt(), colors)
}

/// Rounded rectangle with per-corner radii (top-left, top-right, bottom-right, bottom-left).
pub fn rounded_rect_path_corners(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    radii: [f32; 4],
) -> Option<Path> {
    let max = (width / 2.0).min(height / 2.0).max(0.0);
    let [tl, tr, br, bl] = radii.map(|r| r.clamp(0.0, max));
    let (right, bottom) = (x + width, y + height);

    let mut pb = PathBuilder::new();
    pb.move_to(x + tl, y);
    pb.line_to(right - tr, y);
    if tr > 0.0 {
        pb.cubic_to(right - tr + tr * KAPPA, y, right, y + tr - tr * KAPPA, right, y + tr);
    }
    pb.line_to(right, bottom - br);
    if br > 0.0 {
        pb.cubic_to(
            right,
            bottom - br + br * KAPPA,
            right - br + br * KAPPA,
            bottom,
            right - br,
            bottom,
        );
    }
    pb.line_to(x + bl, bottom);
    if bl > 0.0 {
        pb.cubic_to(x + bl - bl * KAPPA, bottom, x, bottom - bl + bl * KAPPA, x, bottom - bl);
    }
    pb.line_to(x, y + tl);
    if tl > 0.0 {
        pb.cubic_to(x, y + tl - tl * KAPPA, x + tl - tl * KAPPA, y, x + tl, y);
    }
    pb.close();
    pb.finish()
}

pub fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    rounded_rect_path_corners(x, y, width, height, [radius; 4])
}

/// Closed polygon through `points`.
pub fn polygon_path(points: &[(f32, f32)]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, first.1);
    for (x, y) in rest {
        pb.line_to(*x, *y);
    }
    pb.close();
    pb.finish()
}

pub fn fill_path(pixmap: &mut Pixmap, path: Option<Path>, paint: &Paint) {
    if let Some(path) = path {
        pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    }
}

pub fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, width: f32, height: f32, paint: &Paint) {
    if let Some(rect) = Rect::from_xywh(x, y, width, height) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

pub fn fill_rounded_rect(
    pixmap: &mut Pixmap,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    radius: f32,
    paint: &Paint,
) {
    fill_path(pixmap, rounded_rect_path(x, y, width, height, radius), paint);
}

pub fn fill_polygon(pixmap: &mut Pixmap, points: &[(f32, f32)], color: Rgba) {
    fill_path(pixmap, polygon_path(points), &solid_paint(color));
}

pub fn draw_line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
    }
}

/// Composite `src` onto `dst` with its top-left corner at (`x`, `y`).
pub fn draw_bitmap(dst: &mut Pixmap, src: &Pixmap, x: i32, y: i32) {
    draw_bitmap_with_opacity(dst, src, x, y, 1.0);
}

pub fn draw_bitmap_with_opacity(dst: &mut Pixmap, src: &Pixmap, x: i32, y: i32, opacity: f32) {
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        ..PixmapPaint::default()
    };
    dst.draw_pixmap(x, y, src.as_ref(), &paint, Transform::identity(), None);
}

/// Scale `src` to exactly `width` x `height`.
pub fn resize(src: &Pixmap, width: u32, height: u32) -> CardResult<Pixmap> {
    let mut out = new_pixmap(width, height)?;
    if src.width() == width && src.height() == height {
        draw_bitmap(&mut out, src, 0, 0);
        return Ok(out);
    }

    let paint = PixmapPaint {
        quality: FilterQuality::Bicubic,
        ..PixmapPaint::default()
    };
    let transform = Transform::from_scale(
        width as f32 / src.width() as f32,
        height as f32 / src.height() as f32,
    );
    out.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);
    Ok(out)
}

/// Rotate `src` counter-clockwise by `degrees`, growing the canvas to fit.
pub fn rotate(src: &Pixmap, degrees: f32) -> CardResult<Pixmap> {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let (w, h) = (src.width() as f32, src.height() as f32);
    let rotated_width = (cos * w + sin * h) as u32;
    let rotated_height = (cos * h + sin * w) as u32;

    let mut out = new_pixmap(rotated_width.max(1), rotated_height.max(1))?;
    let transform = Transform::from_translate(-w / 2.0, -h / 2.0)
        .post_rotate(-degrees)
        .post_translate(rotated_width as f32 / 2.0, rotated_height as f32 / 2.0);
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    out.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);
    Ok(out)
}

/// Cut a `width` x `height` window horizontally centered in `src`, starting at the top.
pub fn crop_center(src: &Pixmap, width: u32, height: u32) -> CardResult<Pixmap> {
    let mut out = new_pixmap(width, height)?;
    let offset_x = (src.width() as i32 - width as i32) / 2;
    draw_bitmap(&mut out, src, -offset_x, 0);
    Ok(out)
}

/// Fill a rounded rectangle covering the whole canvas with `image` stretched to fit.
pub fn fill_with_image(dst: &mut Pixmap, image: &Pixmap, radius: f32) {
    let (w, h) = (dst.width() as f32, dst.height() as f32);
    let transform = Transform::from_scale(w / image.width() as f32, h / image.height() as f32);
    let shader = Pattern::new(
        image.as_ref(),
        SpreadMode::Pad,
        FilterQuality::Bicubic,
        1.0,
        transform,
    );
    fill_rounded_rect(dst, 0.0, 0.0, w, h, radius, &shader_paint(shader));
}

/// Blur what is already drawn inside a rounded rectangle, like frosted glass.
pub fn blur_region(
    pixmap: &mut Pixmap,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    radius: f32,
    sigma: f32,
) -> CardResult<()> {
    // Only the rectangle plus the kernel's reach needs blurring
    let margin = (sigma * 3.0).ceil() as i32;
    let left = (x.floor() as i32 - margin).max(0);
    let top = (y.floor() as i32 - margin).max(0);
    let right = ((x + width).ceil() as i32 + margin).min(pixmap.width() as i32);
    let bottom = ((y + height).ceil() as i32 + margin).min(pixmap.height() as i32);
    let Some(area) = IntRect::from_ltrb(left, top, right, bottom) else {
        return Ok(());
    };
    let region = pixmap
        .clone_rect(area)
        .ok_or_else(|| CardError::RenderFailed("Blur region outside canvas".into()))?;

    // Premultiplied data blurs correctly as-is
    let image = RgbaImage::from_raw(region.width(), region.height(), region.take())
        .ok_or_else(|| CardError::RenderFailed("Canvas buffer size mismatch".into()))?;
    let blurred = imageproc::filter::gaussian_blur_f32(&image, sigma);
    let size = IntSize::from_wh(blurred.width(), blurred.height())
        .ok_or_else(|| CardError::RenderFailed("Invalid blur size".into()))?;
    let blurred = Pixmap::from_vec(blurred.into_raw(), size)
        .ok_or_else(|| CardError::RenderFailed("Blur produced an invalid buffer".into()))?;

    let mut mask = Mask::new(pixmap.width(), pixmap.height())
        .ok_or_else(|| CardError::RenderFailed("Invalid mask size".into()))?;
    if let Some(path) = rounded_rect_path(x, y, width, height, radius) {
        mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    }

    let paint = PixmapPaint {
        blend_mode: tiny_skia::BlendMode::Source,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(left, top, blurred.as_ref(), &paint, Transform::identity(), Some(&mask));
    Ok(())
}

/// Bytes a pixmap keeps alive, for cache accounting.
pub fn byte_size(pixmap: &Pixmap) -> u64 {
    pixmap.data().len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        (c.red(), c.green(), c.blue(), c.alpha())
    }

    #[test]
    fn test_new_pixmap_rejects_zero_size() {
        assert!(new_pixmap(0, 10).is_err());
        assert!(new_pixmap(10, 10).is_ok());
    }

    #[test]
    fn test_fill_rect() {
        let mut pixmap = new_pixmap(10, 10).unwrap();
        fill_rect(&mut pixmap, 0.0, 0.0, 5.0, 10.0, &solid_paint(Rgba::rgb(255, 0, 0)));
        assert_eq!(pixel(&pixmap, 2, 5), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 8, 5).3, 0);
    }

    #[test]
    fn test_rounded_rect_leaves_corners_empty() {
        let mut pixmap = new_pixmap(100, 100).unwrap();
        fill_rounded_rect(&mut pixmap, 0.0, 0.0, 100.0, 100.0, 30.0, &solid_paint(Rgba::WHITE));
        assert_eq!(pixel(&pixmap, 0, 0).3, 0);
        assert_eq!(pixel(&pixmap, 50, 50), (255, 255, 255, 255));
        assert_eq!(pixel(&pixmap, 50, 1).3, 255);
    }

    #[test]
    fn test_linear_gradient_endpoints() {
        let mut pixmap = new_pixmap(100, 4).unwrap();
        let shader = linear_gradient(
            (0.0, 0.0),
            (100.0, 0.0),
            &[Rgba::rgb(0, 0, 0), Rgba::rgb(255, 255, 255)],
        )
        .unwrap();
        fill_rect(&mut pixmap, 0.0, 0.0, 100.0, 4.0, &shader_paint(shader));
        assert!(pixel(&pixmap, 1, 1).0 < 20);
        assert!(pixel(&pixmap, 98, 1).0 > 235);
    }

    #[test]
    fn test_gradient_needs_colors() {
        assert!(linear_gradient((0.0, 0.0), (1.0, 0.0), &[]).is_err());
        assert!(radial_gradient((5.0, 5.0), 5.0, &[Rgba::WHITE]).is_ok());
    }

    #[test]
    fn test_resize() {
        let mut src = new_pixmap(10, 10).unwrap();
        src.fill(to_color(Rgba::rgb(0, 255, 0)));
        let out = resize(&src, 40, 20).unwrap();
        assert_eq!((out.width(), out.height()), (40, 20));
        let (r, g, _, a) = pixel(&out, 20, 10);
        assert!(r < 3 && g > 250 && a > 250);
    }

    #[test]
    fn test_rotate_grows_canvas() {
        let src = new_pixmap(100, 50).unwrap();
        let out = rotate(&src, 90.0).unwrap();
        assert_eq!((out.width(), out.height()), (50, 100));

        let out = rotate(&src, -20.0).unwrap();
        assert!(out.width() > 100 && out.height() > 50);
    }

    #[test]
    fn test_crop_center() {
        let mut src = new_pixmap(30, 10).unwrap();
        fill_rect(&mut src, 10.0, 0.0, 10.0, 10.0, &solid_paint(Rgba::WHITE));
        let out = crop_center(&src, 10, 10).unwrap();
        assert_eq!(pixel(&out, 0, 0), (255, 255, 255, 255));
        assert_eq!(pixel(&out, 9, 9), (255, 255, 255, 255));
    }

    #[test]
    fn test_blur_region_only_touches_the_region() {
        let mut pixmap = new_pixmap(60, 60).unwrap();
        fill_rect(&mut pixmap, 0.0, 0.0, 30.0, 60.0, &solid_paint(Rgba::WHITE));
        let before = pixel(&pixmap, 5, 55);

        blur_region(&mut pixmap, 20.0, 0.0, 20.0, 20.0, 5.0, 4.0).unwrap();

        // Edge between white and transparent got softened inside the region
        assert!(pixel(&pixmap, 29, 10).3 < 255);
        assert_eq!(pixel(&pixmap, 5, 55), before);
    }

    #[test]
    fn test_byte_size() {
        let pixmap = new_pixmap(10, 5).unwrap();
        assert_eq!(byte_size(&pixmap), 200);
    }
}
