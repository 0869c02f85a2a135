//! Go-style duration strings for export documents.
//!
//! Earlier releases wrote profile timeouts as strings like `"1m0s"` and
//! `"30s"`, and exports from other tooling in the wild use the same shape.
//! Formatting here reproduces that form for whole seconds; parsing accepts
//! any `<int><unit>` sequence with units `h`, `m`, `s`, plus a bare integer
//! meaning seconds.

/// Format whole seconds the way Go's `Duration.String()` does.
pub fn format_go_duration(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parse a Go-style duration string into whole seconds.
///
/// Returns `None` for empty input, unknown units, or trailing garbage.
pub fn parse_go_duration(input: &str) -> Option<u64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    // A bare integer is taken as seconds.
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input.parse().ok();
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            let value: u64 = digits.parse().ok()?;
            digits.clear();
            let unit_secs = match c {
                'h' => 3600,
                'm' => 60,
                's' => 1,
                _ => return None,
            };
            total = total.checked_add(value.checked_mul(unit_secs)?)?;
            saw_component = true;
        }
    }

    // Digits with no trailing unit means a malformed tail like "1m30".
    if !digits.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}
