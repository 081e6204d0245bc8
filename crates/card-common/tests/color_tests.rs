//! Tests for hex color parsing.

use card_common::{parse_hex_color, CardError, Rgba};

#[test]
fn test_parse_rgb_hex() {
    assert_eq!(parse_hex_color("#2C9AEA").unwrap(), Rgba::rgb(44, 154, 234));
    assert_eq!(parse_hex_color("0e3593").unwrap(), Rgba::rgb(14, 53, 147));
}

#[test]
fn test_parse_rgba_hex_keeps_alpha_last() {
    assert_eq!(
        parse_hex_color("#FFFFFF4D").unwrap(),
        Rgba::new(255, 255, 255, 0x4D)
    );
}

#[test]
fn test_parse_short_forms() {
    assert_eq!(parse_hex_color("#fff").unwrap(), Rgba::WHITE);
    assert_eq!(parse_hex_color("#0008").unwrap(), Rgba::new(0, 0, 0, 0x88));
}

#[test]
fn test_parse_invalid_colors() {
    for bad in ["", "#12345", "#GGGGGG", "#1234567890", "blue"] {
        match parse_hex_color(bad) {
            Err(CardError::InvalidRequest(msg)) => assert!(msg.contains("Invalid color")),
            other => panic!("expected InvalidRequest for {:?}, got {:?}", bad, other),
        }
    }
}

#[test]
fn test_with_alpha() {
    assert_eq!(Rgba::WHITE.with_alpha(77), Rgba::new(255, 255, 255, 77));
}
