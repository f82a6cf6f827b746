//! Parsing of the portal's free-text "Reason" field.
//!
//! The portal mixes two conventions in the same column: a numeric machine
//! error code (`207034_30008: ...`) and a free-text failure code
//! (`BADSECTOR: ...`). Only the former is compressed to the short `EC###`
//! form; anything else keeps its code part verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel used when the reason field carries no parseable data.
pub const UNKNOWN: &str = "Unknown";

/// Error code shape: digits, underscore, digits, nothing else.
static ERROR_CODE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+_\d+$").unwrap());

/// Trailing run of 3+ digits, ignoring trailing non-digits.
static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{3,})\D*$").unwrap());

/// A classified reason field. Both fields are always populated;
/// `Unknown`/`Unknown` is the explicit no-data value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedError {
    pub code: String,
    pub description: String,
}

impl ParsedError {
    pub fn unknown() -> Self {
        ParsedError {
            code: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
        }
    }

}

/// Splits a scraped reason field into an error-code/description pair.
///
/// Total: never fails. Splits on the first `:` only, so later colons stay
/// in the description. A code part matching `\d+_\d+` is reduced to `EC` +
/// the last 3 digits of its trailing digit run; any other code part is kept
/// verbatim as a portal failure code.
pub fn parse_reason(reason: &str) -> ParsedError {
    let Some((code_part, rest)) = reason.split_once(':') else {
        return ParsedError::unknown();
    };
    let description = rest.trim().to_string();

    if ERROR_CODE_SHAPE.is_match(code_part)
        && !code_part.chars().any(|c| c.is_ascii_alphabetic())
    {
        if let Some(caps) = TRAILING_DIGITS.captures(code_part) {
            let digits = &caps[1];
            let last3 = &digits[digits.len() - 3..];
            return ParsedError {
                code: format!("EC{last3}"),
                description,
            };
        }
        // Second digit group shorter than 3: fall through to failure code.
    }

    ParsedError {
        code: code_part.trim().to_string(),
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_code_is_reduced_to_ec_form() {
        let parsed = parse_reason("123_456: Sensor fault");
        assert_eq!(parsed.code, "EC456");
        assert_eq!(parsed.description, "Sensor fault");
    }

    #[test]
    fn last_three_digits_of_long_run_are_used() {
        let parsed = parse_reason("207034_30008: GPU memory test failed");
        assert_eq!(parsed.code, "EC008");
        assert_eq!(parsed.description, "GPU memory test failed");
    }

    #[test]
    fn lettered_code_is_kept_verbatim() {
        let parsed = parse_reason("BADSECTOR: disk failure");
        assert_eq!(parsed.code, "BADSECTOR");
        assert_eq!(parsed.description, "disk failure");
    }

    #[test]
    fn missing_colon_yields_unknown_sentinel() {
        assert_eq!(parse_reason("no colon here"), ParsedError::unknown());
        assert_eq!(parse_reason(""), ParsedError::unknown());
    }

    #[test]
    fn only_first_colon_splits() {
        let parsed = parse_reason("12_34_56: extra: colons: here");
        assert_eq!(parsed.description, "extra: colons: here");
        // Three digit groups don't match the strict shape; kept verbatim.
        assert_eq!(parsed.code, "12_34_56");
    }

    #[test]
    fn short_trailing_group_falls_through_to_failure_code() {
        // Trailing digit run "12" is shorter than 3 digits.
        let parsed = parse_reason("1234_12: short tail");
        assert_eq!(parsed.code, "1234_12");
        assert_eq!(parsed.description, "short tail");
    }

    #[test]
    fn code_part_is_trimmed_in_failure_branch() {
        let parsed = parse_reason("  THERMAL  :  overheat  ");
        assert_eq!(parsed.code, "THERMAL");
        assert_eq!(parsed.description, "overheat");
    }

    #[test]
    fn empty_description_stays_empty() {
        let parsed = parse_reason("123_456:");
        assert_eq!(parsed.code, "EC456");
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn total_over_awkward_inputs() {
        // Must classify without panicking, whatever the portal serves up.
        for input in [":", "::", "【】:", "_:_", "\u{3000}:\u{3000}", "1_2:x"] {
            let _ = parse_reason(input);
        }
        // "1_2" matches the shape but has no 3-digit run.
        assert_eq!(parse_reason("1_2:x").code, "1_2");
    }
}
