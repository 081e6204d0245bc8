//! Image decode/encode between encoded bytes and premultiplied pixmaps.

use std::io::Cursor;

use card_common::{CardError, CardResult};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use tiny_skia::{IntSize, Pixmap};

/// Output format of a rendered card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Decode any format the `image` crate understands into a premultiplied pixmap.
pub fn decode(bytes: &[u8]) -> CardResult<Pixmap> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CardError::DecodeFailed(e.to_string()))?
        .to_rgba8();
    from_rgba_image(image)
}

/// Convert straight-alpha RGBA into a pixmap.
pub fn from_rgba_image(image: RgbaImage) -> CardResult<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())
        .ok_or_else(|| CardError::DecodeFailed("Image has zero size".into()))?;

    let mut data = image.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a != 255 {
            px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
            px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
            px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
        }
    }

    Pixmap::from_vec(data, size).ok_or_else(|| CardError::DecodeFailed("Invalid pixel buffer".into()))
}

/// Convert a pixmap back into straight-alpha RGBA.
pub fn to_rgba_image(pixmap: &Pixmap) -> CardResult<RgbaImage> {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .ok_or_else(|| CardError::EncodeFailed("Pixel buffer size mismatch".into()))
}

pub fn encode(pixmap: &Pixmap, format: ImageFormat) -> CardResult<Vec<u8>> {
    match format {
        ImageFormat::Png => encode_png(pixmap),
        ImageFormat::Jpeg { quality } => encode_jpeg(pixmap, quality),
    }
}

pub fn encode_png(pixmap: &Pixmap) -> CardResult<Vec<u8>> {
    let image = DynamicImage::ImageRgba8(to_rgba_image(pixmap)?);
    write(&image, ImageOutputFormat::Png)
}

/// JPEG has no alpha channel; transparent areas come out black.
pub fn encode_jpeg(pixmap: &Pixmap, quality: u8) -> CardResult<Vec<u8>> {
    let image = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(to_rgba_image(pixmap)?).to_rgb8());
    write(&image, ImageOutputFormat::Jpeg(quality.clamp(1, 100)))
}

fn write(image: &DynamicImage, format: ImageOutputFormat) -> CardResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|e| CardError::EncodeFailed(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas;
    use card_common::Rgba;

    #[test]
    fn test_png_signature_and_decode() {
        let mut pixmap = canvas::new_pixmap(8, 4).unwrap();
        canvas::fill_rect(&mut pixmap, 0.0, 0.0, 8.0, 4.0, &canvas::solid_paint(Rgba::rgb(10, 20, 30)));

        let png = encode_png(&pixmap).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

        let decoded = decode(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
        let c = decoded.pixel(3, 2).unwrap().demultiply();
        assert_eq!((c.red(), c.green(), c.blue(), c.alpha()), (10, 20, 30, 255));
    }

    #[test]
    fn test_half_transparent_pixels_are_premultiplied() {
        let image = RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 0, 128]));
        let pixmap = from_rgba_image(image).unwrap();
        let px = pixmap.pixel(0, 0).unwrap();
        assert_eq!(px.alpha(), 128);
        assert_eq!(px.red(), 100);
        assert_eq!(px.green(), 50);
    }

    #[test]
    fn test_jpeg_signature() {
        let pixmap = canvas::new_pixmap(16, 16).unwrap();
        let jpeg = encode(&pixmap, ImageFormat::Jpeg { quality: 90 }).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(ImageFormat::Jpeg { quality: 90 }.content_type(), "image/jpeg");
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode(b"not an image"), Err(CardError::DecodeFailed(_))));
    }
}
