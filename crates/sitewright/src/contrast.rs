//! WCAG contrast computation and auto-correction.
//!
//! Pure numeric color math over hex strings. The design-system stage uses
//! this to validate and, where needed, darken AI-chosen text colors until
//! they read against their background. No I/O, no inference.

/// Fallback returned when darkening cannot reach the target ratio.
pub const NEAR_BLACK_FALLBACK: &str = "#1a1a1a";

/// Per-channel darkening step.
const DARKEN_STEP: i16 = 5;

/// Maximum darkening iterations before giving up.
const DARKEN_CAP: u32 = 100;

/// Parse a `#rgb` or `#rrggbb` hex color (leading `#` optional,
/// case-insensitive) into 8-bit channels.
///
/// Returns `None` on malformed input rather than guessing.
pub fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let r = u8::from_str_radix(&expanded[0..2], 16).ok()?;
    let g = u8::from_str_radix(&expanded[2..4], 16).ok()?;
    let b = u8::from_str_radix(&expanded[4..6], 16).ok()?;
    Some((r, g, b))
}

fn channel_luminance(value: u8) -> f64 {
    let s = f64::from(value) / 255.0;
    if s <= 0.03928 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}

/// Relative luminance of a hex color per the sRGB piecewise formula.
///
/// Malformed colors are treated as black, the conservative reading for
/// contrast checks against light backgrounds.
pub fn relative_luminance(color: &str) -> f64 {
    let (r, g, b) = parse_hex(color).unwrap_or((0, 0, 0));
    0.2126 * channel_luminance(r) + 0.7152 * channel_luminance(g) + 0.0722 * channel_luminance(b)
}

/// WCAG contrast ratio between two hex colors, in `[1.0, 21.0]`.
pub fn contrast_ratio(hex_a: &str, hex_b: &str) -> f64 {
    let la = relative_luminance(hex_a);
    let lb = relative_luminance(hex_b);
    (la.max(lb) + 0.05) / (la.min(lb) + 0.05)
}

/// Whether `fg` on `bg` meets the given minimum ratio.
pub fn passes_contrast(fg: &str, bg: &str, min_ratio: f64) -> bool {
    contrast_ratio(fg, bg) >= min_ratio
}

/// Darken `color` until it reaches `min_ratio` against `against`.
///
/// Subtracts a fixed step per channel (floored at 0) up to a fixed cap.
/// Returns the first candidate that passes, or [`NEAR_BLACK_FALLBACK`] if
/// the cap is exhausted or the input is unparseable.
pub fn darken_until_contrast(color: &str, against: &str, min_ratio: f64) -> String {
    let Some((mut r, mut g, mut b)) = parse_hex(color).map(|(r, g, b)| {
        (i16::from(r), i16::from(g), i16::from(b))
    }) else {
        return NEAR_BLACK_FALLBACK.to_string();
    };

    for _ in 0..DARKEN_CAP {
        let candidate = format!("#{r:02x}{g:02x}{b:02x}");
        if passes_contrast(&candidate, against, min_ratio) {
            return candidate;
        }
        r = (r - DARKEN_STEP).max(0);
        g = (g - DARKEN_STEP).max(0);
        b = (b - DARKEN_STEP).max(0);
    }

    NEAR_BLACK_FALLBACK.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_variants() {
        assert_eq!(parse_hex("#ffffff"), Some((255, 255, 255)));
        assert_eq!(parse_hex("FFFFFF"), Some((255, 255, 255)));
        assert_eq!(parse_hex("#abc"), Some((0xaa, 0xbb, 0xcc)));
        assert_eq!(parse_hex("#12345"), None);
        assert_eq!(parse_hex("#zzzzzz"), None);
    }

    #[test]
    fn test_identical_colors_ratio_one() {
        assert!((contrast_ratio("#ffffff", "#ffffff") - 1.0).abs() < 1e-9);
        assert!((contrast_ratio("#3b82f6", "#3b82f6") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_black_on_white_is_21() {
        assert!((contrast_ratio("#000000", "#ffffff") - 21.0).abs() < 1e-6);
        // Order does not matter.
        assert!((contrast_ratio("#ffffff", "#000000") - 21.0).abs() < 1e-6);
    }

    #[test]
    fn test_passes_contrast_threshold() {
        assert!(passes_contrast("#000000", "#ffffff", 4.5));
        assert!(!passes_contrast("#ffff00", "#ffffff", 4.5));
    }

    #[test]
    fn test_darken_reaches_ratio() {
        let fixed = darken_until_contrast("#ffff00", "#ffffff", 4.5);
        assert!(passes_contrast(&fixed, "#ffffff", 4.5), "got {fixed}");
    }

    #[test]
    fn test_darken_already_passing_is_unchanged() {
        assert_eq!(darken_until_contrast("#000000", "#ffffff", 4.5), "#000000");
    }

    #[test]
    fn test_darken_unreachable_falls_back() {
        // Against black, darkening only lowers contrast; the cap is spent
        // and the fallback comes out.
        assert_eq!(
            darken_until_contrast("#050505", "#000000", 21.0),
            NEAR_BLACK_FALLBACK
        );
    }

    #[test]
    fn test_darken_bad_input_falls_back() {
        assert_eq!(
            darken_until_contrast("not-a-color", "#ffffff", 4.5),
            NEAR_BLACK_FALLBACK
        );
    }
}
