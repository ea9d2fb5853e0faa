//! Consistent per-target colors for terminal output

use colored::Color;

// Label colors that stay clear of the red/yellow/green used for status lines
const PALETTE: [Color; 6] = [
    Color::TrueColor {
        r: 147,
        g: 112,
        b: 219,
    },
    Color::TrueColor {
        r: 64,
        g: 224,
        b: 208,
    },
    Color::TrueColor {
        r: 255,
        g: 140,
        b: 0,
    },
    Color::TrueColor {
        r: 199,
        g: 21,
        b: 133,
    },
    Color::TrueColor {
        r: 72,
        g: 209,
        b: 204,
    },
    Color::TrueColor {
        r: 138,
        g: 43,
        b: 226,
    },
];

/// Get a stable color for a target name
pub fn get_target_color(target_name: &str) -> Color {
    let hash = target_name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    PALETTE[(hash % PALETTE.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_stable_per_name() {
        assert_eq!(get_target_color("test:unit"), get_target_color("test:unit"));
    }

    #[test]
    fn test_color_comes_from_palette() {
        for name in ["", "a", "build", "test:integration"] {
            assert!(PALETTE.contains(&get_target_color(name)));
        }
    }
}
