//! Human-readable byte sizes (`2MB`, `1.5 GB`, `4,096KB`).
//!
//! Units are binary: each step is 1024 times the previous one, up to `XB`
//! (1024^6). Decimal inputs are scaled exactly and truncated to whole bytes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SpeedtestError};

static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)(?:\.([0-9]+))?([KMGTPX]?B)$").expect("size pattern is valid")
});

/// Power of 1024 for a unit suffix.
fn unit_power(unit: &str) -> Option<u32> {
    match unit {
        "B" => Some(0),
        "KB" => Some(1),
        "MB" => Some(2),
        "GB" => Some(3),
        "TB" => Some(4),
        "PB" => Some(5),
        "XB" => Some(6),
        _ => None,
    }
}

/// Parse a human-readable size into a byte count.
///
/// Commas and spaces are stripped and matching is case-insensitive.
///
/// # Errors
///
/// Returns [`SpeedtestError::InvalidSizeFormat`] when the input is empty,
/// does not match `<number><unit>`, or overflows `u64`.
///
/// # Example
///
/// ```
/// use speedtest_core::size::parse_size;
///
/// assert_eq!(parse_size("2MB").unwrap(), 2_097_152);
/// assert_eq!(parse_size("2.5 kb").unwrap(), 2560);
/// ```
pub fn parse_size(value: &str) -> Result<u64> {
    let invalid = || SpeedtestError::InvalidSizeFormat {
        input: value.to_string(),
    };

    let normalized: String = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let captures = SIZE_PATTERN.captures(&normalized).ok_or_else(invalid)?;

    let power = unit_power(&captures[3]).ok_or_else(invalid)?;
    let scale = 1024u128.pow(power);

    let whole: u128 = captures[1].parse().map_err(|_| invalid())?;
    let mut bytes = whole.checked_mul(scale).ok_or_else(invalid)?;

    if let Some(fraction) = captures.get(2) {
        // 10^38 is the largest power of ten whose double still fits in u128.
        let digits = &fraction.as_str()[..fraction.as_str().len().min(38)];
        let numerator: u128 = digits.parse().map_err(|_| invalid())?;
        let denominator = 10u128.pow(u32::try_from(digits.len()).map_err(|_| invalid())?);

        // floor(numerator * 2^(10 * power) / denominator), one bit at a time
        let mut partial = 0u128;
        let mut remainder = numerator;
        for _ in 0..power * 10 {
            remainder <<= 1;
            partial <<= 1;
            if remainder >= denominator {
                remainder -= denominator;
                partial |= 1;
            }
        }
        bytes = bytes.checked_add(partial).ok_or_else(invalid)?;
    }

    u64::try_from(bytes).map_err(|_| invalid())
}

/// Parse either a plain byte count (`32768`) or a human-readable size (`32KB`).
pub fn parse_byte_count(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| SpeedtestError::InvalidSizeFormat {
            input: value.to_string(),
        });
    }
    parse_size(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_known_sizes() {
        assert_eq!(parse_size("2MB").unwrap(), 2_097_152);
        assert_eq!(parse_size("1GB").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("1XB").unwrap(), 1u64 << 60);
    }

    #[test]
    fn test_parse_is_case_insensitive_and_strips_separators() {
        assert_eq!(parse_size("4 kb").unwrap(), 4096);
        assert_eq!(parse_size("1,024 KB").unwrap(), 1_048_576);
        assert_eq!(parse_size("2Mb").unwrap(), 2_097_152);
    }

    #[test]
    fn test_parse_decimal_truncates() {
        assert_eq!(parse_size("2.5MB").unwrap(), 2_621_440);
        assert_eq!(parse_size("0.5KB").unwrap(), 512);
        // 0.001 KB = 1.024 bytes
        assert_eq!(parse_size("0.001KB").unwrap(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["abc", "", "   ", "MB", "12", "-1MB", "1.MB", "1MBX", "1ZB", "1e3KB"] {
            assert!(
                matches!(parse_size(input), Err(SpeedtestError::InvalidSizeFormat { .. })),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_parse_overflow_is_invalid() {
        assert!(parse_size("16XB").is_err());
        assert_eq!(parse_size("15XB").unwrap(), 15u64 << 60);
    }

    #[test]
    fn test_parse_byte_count_accepts_both_forms() {
        assert_eq!(parse_byte_count("32768").unwrap(), 32768);
        assert_eq!(parse_byte_count("32KB").unwrap(), 32768);
        assert!(parse_byte_count("lots").is_err());
    }

    proptest! {
        #[test]
        fn prop_integral_sizes_scale_exactly(n in 0u64..1_000_000, power in 0u32..4) {
            let unit = ["B", "KB", "MB", "GB"][power as usize];
            let parsed = parse_size(&format!("{n}{unit}")).unwrap();
            prop_assert_eq!(parsed, n * 1024u64.pow(power));
        }

        #[test]
        fn prop_never_panics(input in "\\PC*") {
            let _ = parse_size(&input);
        }
    }
}
