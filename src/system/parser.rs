//! Temperature extraction from raw tool output.
//! Applies the host's operator-supplied pattern across the whole output and
//! keeps the hottest value found.

use fancy_regex::Regex;

/// Outcome of scanning one blob of tool output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extraction {
    /// Hottest parsed value, truncated toward zero.
    pub max: Option<i32>,
    /// Number of pattern matches, parsable or not.
    pub matches: usize,
}

/// Scan `output` with `pattern` and return the maximum numeric reading.
///
/// From each match the last capture group that participated is used, or the
/// whole match when the pattern has no groups. Values may be integers
/// (`ipmitool sdr`: `| 42 degrees C`) or decimals (`sensors`: `+47.0°C`).
/// Compile with [`compile_pattern`] so `^`/`$` anchor per line. A match
/// that exhausts the backtracking limit ends the scan.
pub fn extract_max_temperature(output: &str, pattern: &Regex) -> Extraction {
    let mut matches = 0;
    let max = pattern
        .captures_iter(output)
        .map_while(Result::ok)
        .inspect(|_| matches += 1)
        .filter_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .last()
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().trim())
        })
        .filter(|value| !value.is_empty())
        .filter_map(parse_reading)
        .max();

    Extraction { max, matches }
}

/// Parse `"42"`, `"+47.0"`, `"47.5"` into whole degrees.
fn parse_reading(value: &str) -> Option<i32> {
    if let Ok(whole) = value.parse::<i32>() {
        return Some(whole);
    }
    let float: f64 = value.trim_start_matches('+').parse().ok()?;
    if float.is_finite() {
        Some(float.trunc() as i32)
    } else {
        None
    }
}

/// Compile an operator pattern in multi-line mode. Look-ahead and
/// fixed-width look-behind are accepted.
pub fn compile_pattern(pattern: &str) -> Result<Regex, fancy_regex::Error> {
    Regex::new(&format!("(?m){}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    const R620_SDR: &str = "\
Inlet Temp       | 04h | ok  |  7.1 | 23 degrees C
Exhaust Temp     | 01h | ok  |  7.1 | 38 degrees C
Temp             | 0Eh | ok  |  3.1 | 49 degrees C
Temp             | 0Fh | ok  |  3.2 | 44 degrees C
";

    const LM_SENSORS: &str = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +52.0°C  (high = +80.0°C, crit = +90.0°C)
Core 0:        +47.0°C  (high = +80.0°C, crit = +90.0°C)
Core 1:        +51.5°C  (high = +80.0°C, crit = +90.0°C)
";

    #[test]
    fn picks_hottest_of_grouped_ipmi_matches() {
        let pattern = compile_pattern(r"^Temp\s+\|.*\|\s+(\d+) degrees C$").unwrap();
        let found = extract_max_temperature(R620_SDR, &pattern);
        assert_eq!(found.max, Some(49));
        assert_eq!(found.matches, 2);
    }

    #[test]
    fn ungrouped_pattern_uses_whole_match_and_truncates_decimals() {
        let pattern = compile_pattern(r"\d+\.\d+").unwrap();
        let cores = compile_pattern(r"^Core \d+:\s+\+(\d+\.\d+)").unwrap();
        assert_eq!(extract_max_temperature(LM_SENSORS, &cores).max, Some(51));
        // Whole-match fallback sees "+80.0" and "+90.0" thresholds too.
        assert_eq!(extract_max_temperature(LM_SENSORS, &pattern).max, Some(90));
    }

    #[test]
    fn unparsable_matches_yield_no_reading() {
        let pattern = compile_pattern(r"^Temp\s+\|.*\|\s+(\S+) degrees C$").unwrap();
        let found = extract_max_temperature("Temp | 0Eh | ns | 3.1 | na degrees C\n", &pattern);
        assert_eq!(found.max, None);
        assert_eq!(found.matches, 1);
    }

    #[test]
    fn no_matches_yield_no_reading() {
        let pattern = compile_pattern(r"(\d+) degrees C").unwrap();
        let found = extract_max_temperature("", &pattern);
        assert_eq!(found, Extraction { max: None, matches: 0 });
    }

    #[test]
    fn look_ahead_patterns_are_supported() {
        let pattern = compile_pattern(r"\+(\d+\.\d)(?=°C\s+\(high)").unwrap();
        let found = extract_max_temperature(LM_SENSORS, &pattern);
        assert_eq!(found.max, Some(52));
        assert_eq!(found.matches, 3);
    }

    #[test]
    fn fixed_width_look_behind_uses_whole_match() {
        let pattern = compile_pattern(r"(?<=Core \d:)\s+\+\d+\.\d").unwrap();
        assert_eq!(extract_max_temperature(LM_SENSORS, &pattern).max, Some(51));
    }

    #[test]
    fn optional_group_falls_back_to_last_participating_group() {
        let pattern = compile_pattern(r"^(\w+) (\d+)(?: C)?(x)?$").unwrap();
        assert_eq!(extract_max_temperature("cpu 61 C\ngpu 70\n", &pattern).max, Some(70));
    }
}
