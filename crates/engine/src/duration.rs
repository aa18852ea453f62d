//! Delay durations.
//!
//! Accepts the compact form authors type in the builder (`"7d"`, `"1h30m"`,
//! `"2w"`, `"45s"`) and ISO-8601 durations without years or months
//! (`"P7D"`, `"PT1H30M"`, `"P1W"`).

use std::sync::OnceLock;

use chrono::Duration;
use regex::Regex;

use crate::EngineError;

/// Upper bound chrono can represent without panicking.
const MAX_SECONDS: i64 = i64::MAX / 1_000;

fn compact_regex() -> &'static Regex {
    static COMPACT: OnceLock<Regex> = OnceLock::new();
    COMPACT.get_or_init(|| Regex::new(r"^(?:\d+[wdhms])+$").expect("valid regex"))
}

fn compact_part_regex() -> &'static Regex {
    static PART: OnceLock<Regex> = OnceLock::new();
    PART.get_or_init(|| Regex::new(r"(\d+)([wdhms])").expect("valid regex"))
}

fn iso_regex() -> &'static Regex {
    static ISO: OnceLock<Regex> = OnceLock::new();
    ISO.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
            .expect("valid regex")
    })
}

/// Parse a delay duration.
///
/// # Errors
/// [`EngineError::InvalidDuration`] for empty, unrecognised or overflowing input.
pub fn parse_duration(input: &str) -> Result<Duration, EngineError> {
    let invalid = || EngineError::InvalidDuration(input.to_owned());
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let seconds = if compact_regex().is_match(&normalized) {
        let mut total: i64 = 0;
        for caps in compact_part_regex().captures_iter(&normalized) {
            let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
            let part = amount.checked_mul(unit_seconds(&caps[2])).ok_or_else(invalid)?;
            total = total.checked_add(part).ok_or_else(invalid)?;
        }
        total
    } else {
        let upper = normalized.to_ascii_uppercase();
        let caps = iso_regex().captures(&upper).ok_or_else(invalid)?;
        // "P" and "PT" alone match the pattern but name no amount.
        if caps.iter().skip(1).all(|c| c.is_none()) {
            return Err(invalid());
        }

        let units = [("w", 1), ("d", 2), ("h", 3), ("m", 4), ("s", 5)];
        let mut total: i64 = 0;
        for (unit, group) in units {
            if let Some(m) = caps.get(group) {
                let amount: i64 = m.as_str().parse().map_err(|_| invalid())?;
                let part = amount.checked_mul(unit_seconds(unit)).ok_or_else(invalid)?;
                total = total.checked_add(part).ok_or_else(invalid)?;
            }
        }
        total
    };

    if seconds > MAX_SECONDS {
        return Err(invalid());
    }
    Ok(Duration::seconds(seconds))
}

fn unit_seconds(unit: &str) -> i64 {
    match unit {
        "w" => 7 * 86_400,
        "d" => 86_400,
        "h" => 3_600,
        "m" => 60,
        _ => 1,
    }
}
