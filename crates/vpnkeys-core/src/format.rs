//! Presentation helpers. Raw byte counts are stored; formatting happens here only.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable magnitude of a byte count, base 1024, one decimal place.
///
/// `1048576` renders as `"1.0 MB"`. Values past the TB range stay in TB.
pub fn format_bytes(bytes: i64) -> String {
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
