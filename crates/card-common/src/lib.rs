//! Common types and utilities shared by the card rendering crates and the API service.

pub mod color;
pub mod error;
pub mod models;

pub use color::{parse_hex_color, Rgba};
pub use error::{CardError, CardResult};
