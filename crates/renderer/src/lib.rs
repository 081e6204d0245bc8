//! Card rendering for the image API.
//!
//! - `canvas`: tiny-skia drawing helpers (shapes, gradients, compositing, resize, rotate)
//! - `text`: rusttype fonts and text drawing
//! - `codec`: decode into and encode out of premultiplied pixmaps
//! - `components`: pieces shared between cards (name plate, stripe, banner, boxes)
//! - `shop`, `locker`, `stats`, `progress`, `drop_map`: one module per image type
//!
//! Nothing here caches or fetches. Callers resolve bitmaps and fonts and pass
//! references in, so every function is a pure `inputs -> Pixmap` step that can run on
//! a blocking thread.

pub mod canvas;
pub mod codec;
pub mod components;
pub mod drop_map;
pub mod locker;
pub mod progress;
pub mod shop;
pub mod stats;
pub mod text;

pub use codec::ImageFormat;
pub use text::{Align, TextStyle};

// Re-exported so callers do not need their own tiny-skia/rusttype dependency.
pub use rusttype::Font;
pub use tiny_skia::Pixmap;
