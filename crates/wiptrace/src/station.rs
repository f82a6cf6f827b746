//! Workstation label normalization.
//!
//! Portal station labels carry a full-width numeric tag (`【3】REPAIR_B2`)
//! and arbitrary whitespace; batch records carry only the prefix before the
//! first underscore. Both sides are reduced to a canonical comparable token.

use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric tag in full-width brackets, e.g. `【12】`.
static STATION_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"【\d+】").unwrap());

/// Canonical comparable token for a scraped station label: tags stripped,
/// all whitespace removed, uppercased.
pub fn normalize_station(raw: &str) -> String {
    STATION_TAG
        .replace_all(raw, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Station prefix of a full workstation name: everything before the first
/// `_`, or the whole name when there is no separator.
pub fn station_prefix(workstation_name: &str) -> String {
    workstation_name
        .split('_')
        .next()
        .unwrap_or("")
        .to_string()
}
