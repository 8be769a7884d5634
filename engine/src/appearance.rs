//! Deterministic category colors and icons.
//!
//! Well-known category names get fixed colors and Font Awesome icon
//! names; anything else falls back to a color hashed from the name, so
//! the same category always renders the same everywhere without storing
//! presentation state.

/// Keyword→color table, checked in order against the lowercased name.
/// `non-fiction` must come before `fiction`: the match is a substring
/// check and the longer keyword would otherwise never win.
const KEYWORD_COLORS: &[(&str, &str)] = &[
    ("non-fiction", "#10b981"),
    ("fiction", "#3b82f6"),
    ("science", "#8b5cf6"),
    ("history", "#f59e0b"),
    ("biography", "#ef4444"),
    ("mystery", "#6b7280"),
    ("romance", "#ec4899"),
    ("fantasy", "#8b5cf6"),
    ("thriller", "#374151"),
    ("comedy", "#fbbf24"),
    ("drama", "#dc2626"),
    ("uncategorized", "#9ca3af"),
];

/// Keyword→icon table, same ordering rule as [`KEYWORD_COLORS`].
const KEYWORD_ICONS: &[(&str, &str)] = &[
    ("non-fiction", "fa-book-open"),
    ("fiction", "fa-book"),
    ("science", "fa-flask"),
    ("history", "fa-landmark"),
    ("biography", "fa-user"),
    ("mystery", "fa-question"),
    ("romance", "fa-heart"),
    ("fantasy", "fa-dragon"),
    ("thriller", "fa-mask"),
    ("comedy", "fa-laugh"),
    ("drama", "fa-theater-masks"),
    ("uncategorized", "fa-folder"),
];

/// Icon used when no keyword matches.
pub const DEFAULT_ICON: &str = "fa-folder";

/// Color for a category name: a fixed hex color when a keyword matches,
/// otherwise a hashed HSL tone.
pub fn color_for(name: &str) -> String {
    let lowered = name.to_lowercase();
    for (keyword, color) in KEYWORD_COLORS {
        if lowered.contains(keyword) {
            return (*color).to_string();
        }
    }
    hashed_hsl(name)
}

/// Font Awesome icon name for a category name.
pub fn icon_for(name: &str) -> &'static str {
    let lowered = name.to_lowercase();
    for (keyword, icon) in KEYWORD_ICONS {
        if lowered.contains(keyword) {
            return icon;
        }
    }
    DEFAULT_ICON
}

/// 32-bit rolling hash of the name's UTF-16 code units, mapped into a
/// mid-saturation HSL tone (hue 0-359, saturation 60-79%, lightness
/// 45-54%).
fn hashed_hsl(name: &str) -> String {
    let mut hash: i32 = 0;
    for code in name.encode_utf16() {
        hash = i32::from(code).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    let magnitude = u64::from(hash.unsigned_abs());
    let hue = magnitude % 360;
    let saturation = 60 + magnitude % 20;
    let lightness = 45 + magnitude % 10;
    format!("hsl({hue}, {saturation}%, {lightness}%)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_colors_match_case_insensitively() {
        assert_eq!(color_for("Fiction"), "#3b82f6");
        assert_eq!(color_for("MYSTERY Novels"), "#6b7280");
        assert_eq!(color_for("uncategorized"), "#9ca3af");
    }

    #[test]
    fn non_fiction_is_not_claimed_by_fiction() {
        assert_eq!(color_for("Non-Fiction"), "#10b981");
        assert_eq!(icon_for("Non-Fiction"), "fa-book-open");
    }

    #[test]
    fn keyword_icons() {
        assert_eq!(icon_for("Science"), "fa-flask");
        assert_eq!(icon_for("Epic Fantasy"), "fa-dragon");
        assert_eq!(icon_for("Zzyzx"), DEFAULT_ICON);
    }

    #[test]
    fn fallback_color_is_stable() {
        assert_eq!(color_for("Go"), "hsl(152, 72%, 47%)");
        assert_eq!(color_for("Zzyzx"), color_for("Zzyzx"));
    }

    #[test]
    fn fallback_color_stays_in_range() {
        for name in ["a", "Ab", "Some Long Category Name", "日本文学"] {
            let color = color_for(name);
            assert!(color.starts_with("hsl("), "unexpected color: {color}");
            assert!(color.ends_with("%)"));
        }
    }
}
