/// Insert the pairing-code separator into a bare 6-character code
/// (e.g. "A1B2C3" -> "A1B-2C3"). Codes that are not 6 characters long
/// are returned uppercased but otherwise untouched.
pub fn format_pairing_code(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.len() != 6 {
        return upper;
    }
    format!("{}-{}", &upper[..3], &upper[3..])
}

/// Format minutes of playtime into a compact human-readable duration
/// (e.g. 59m, 1h, 1d 2h, 3d).
pub fn format_playtime(total_minutes: u64) -> String {
    let days = total_minutes / 1_440;
    let hours = (total_minutes % 1_440) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        return if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        };
    }

    if hours > 0 {
        return if minutes > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}h", hours)
        };
    }

    format!("{}m", minutes)
}

/// Render a textual progress bar like `[████░░░░░░] 40%`.
pub fn format_progress_bar(current: i64, required: i64, width: usize) -> String {
    let width = width.max(1);
    if required <= 0 {
        return format!("[{}] 100%", "█".repeat(width));
    }

    let ratio = (current.max(0) as f64 / required as f64).min(1.0);
    let filled = (ratio * width as f64).round() as usize;
    let filled = filled.min(width);

    format!(
        "[{}{}] {}%",
        "█".repeat(filled),
        "░".repeat(width - filled),
        (ratio * 100.0).round() as u32
    )
}

#[cfg(test)]
mod tests {
    use super::{format_pairing_code, format_playtime, format_progress_bar};

    #[test]
    fn pairing_codes_gain_separator() {
        assert_eq!(format_pairing_code("a1b2c3"), "A1B-2C3");
        assert_eq!(format_pairing_code("  ff00aa "), "FF0-0AA");
    }

    #[test]
    fn odd_length_codes_pass_through() {
        assert_eq!(format_pairing_code("abc"), "ABC");
        assert_eq!(format_pairing_code(""), "");
    }

    #[test]
    fn playtime_formatting() {
        assert_eq!(format_playtime(0), "0m");
        assert_eq!(format_playtime(59), "59m");
        assert_eq!(format_playtime(60), "1h");
        assert_eq!(format_playtime(61), "1h 1m");
        assert_eq!(format_playtime(1_440), "1d");
        assert_eq!(format_playtime(1_500), "1d 1h");
    }

    #[test]
    fn progress_bar_clamps_to_full() {
        assert_eq!(format_progress_bar(10, 10, 4), "[████] 100%");
        assert_eq!(format_progress_bar(20, 10, 4), "[████] 100%");
        assert_eq!(format_progress_bar(0, 10, 4), "[░░░░] 0%");
        assert_eq!(format_progress_bar(5, 0, 4), "[████] 100%");
    }
}
