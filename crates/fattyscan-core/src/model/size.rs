/// Size formatting and parsing — human-readable byte counts.
///
/// All internal sizes are `u64` bytes. Floating point is only used
/// at the display and parsing boundary.

/// Binary unit suffixes, indexed by power of 1024.
const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Format a byte count into a human-readable string with appropriate unit.
///
/// Uses binary units (KiB = 1024) labelled with the common short forms,
/// one decimal place above the byte range.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Parse a human-readable size such as `"512"`, `"1.5 MB"` or `"2GB"`.
///
/// Units are case-insensitive and binary. A bare number is bytes.
/// Returns `None` for empty, negative, or malformed input.
pub fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    let number: f64 = number.parse().ok()?;
    let suffix = suffix.trim().to_ascii_uppercase();

    let power = if suffix.is_empty() || suffix == "BYTES" {
        0
    } else {
        UNITS.iter().position(|u| *u == suffix.as_str()).or_else(|| {
            // Accept "K", "M", "G" ... and "KiB" style spellings.
            let head = suffix.trim_end_matches("IB").trim_end_matches('B');
            UNITS.iter().position(|u| u.starts_with(head) && !head.is_empty())
        })?
    };

    let bytes = number * 1024f64.powi(power as i32);
    if bytes.is_finite() && bytes >= 0.0 && bytes <= u64::MAX as f64 {
        Some(bytes as u64)
    } else {
        None
    }
}
