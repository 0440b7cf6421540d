//! Content-addressed fingerprints used by the deduplication lookup.
//!
//! Every fingerprint is the hex-encoded SHA-256 of its components joined by
//! the 0x1F unit separator, which cannot appear in normalized names, ISO
//! dates, or decimal city ids. Fingerprints whose required components are
//! missing are suppressed rather than guessed.

use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use std::fmt;

/// Component separator; outside the alphabet of every component.
const SEPARATOR: u8 = 0x1F;

/// How many leading name tokens feed the fuzzy-name fingerprint.
const FUZZY_PREFIX_TOKENS: usize = 3;

/// The four fingerprint kinds, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintKind {
    Exact,
    FuzzyName,
    DateLocation,
    WeekLocation,
}

impl FingerprintKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FingerprintKind::Exact => "exact",
            FingerprintKind::FuzzyName => "fuzzy_name",
            FingerprintKind::DateLocation => "date_location",
            FingerprintKind::WeekLocation => "week_location",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(FingerprintKind::Exact),
            "fuzzy_name" => Some(FingerprintKind::FuzzyName),
            "date_location" => Some(FingerprintKind::DateLocation),
            "week_location" => Some(FingerprintKind::WeekLocation),
            _ => None,
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fingerprints derivable from one record's canonical attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintSet {
    pub exact: Option<String>,
    pub fuzzy_name: Option<String>,
    pub date_location: Option<String>,
    pub week_location: Option<String>,
}

impl FingerprintSet {
    /// (kind, hash) pairs for every fingerprint present.
    pub fn entries(&self) -> Vec<(FingerprintKind, &str)> {
        let mut entries = Vec::with_capacity(4);
        if let Some(hash) = &self.exact {
            entries.push((FingerprintKind::Exact, hash.as_str()));
        }
        if let Some(hash) = &self.fuzzy_name {
            entries.push((FingerprintKind::FuzzyName, hash.as_str()));
        }
        if let Some(hash) = &self.date_location {
            entries.push((FingerprintKind::DateLocation, hash.as_str()));
        }
        if let Some(hash) = &self.week_location {
            entries.push((FingerprintKind::WeekLocation, hash.as_str()));
        }
        entries
    }
}

fn digest(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            hasher.update([SEPARATOR]);
        }
        hasher.update(component.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn fuzzy_prefix(normalized_name: &str) -> String {
    normalized_name
        .split_whitespace()
        .take(FUZZY_PREFIX_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Monday of the ISO week containing `date`.
fn iso_week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday();
    date - chrono::Duration::days(offset as i64)
}

/// Compute the fingerprint set for a normalized record.
///
/// An unknown city suppresses every kind (they all key on the city); an
/// empty normalized name additionally suppresses the name-bearing kinds.
pub fn generate(
    normalized_name: &str,
    start_date: NaiveDate,
    city_id: Option<i32>,
) -> FingerprintSet {
    let Some(city_id) = city_id else {
        return FingerprintSet::default();
    };

    let date = start_date.format("%Y-%m-%d").to_string();
    let city = city_id.to_string();
    let week = iso_week_start(start_date).format("%Y-%m-%d").to_string();

    let mut set = FingerprintSet {
        exact: None,
        fuzzy_name: None,
        date_location: Some(digest(&[&date, &city])),
        week_location: Some(digest(&[&week, &city])),
    };

    if !normalized_name.is_empty() {
        set.exact = Some(digest(&[normalized_name, &date, &city]));
        set.fuzzy_name = Some(digest(&[&fuzzy_prefix(normalized_name), &date, &city]));
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fingerprints_are_stable() {
        let a = generate("gnaoua et musiques du monde", date("2025-06-26"), Some(7));
        let b = generate("gnaoua et musiques du monde", date("2025-06-26"), Some(7));
        assert_eq!(a, b);
        assert_eq!(a.entries().len(), 4);
        for (_, hash) in a.entries() {
            assert_eq!(hash.len(), 64);
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn fuzzy_kind_keys_on_first_three_tokens() {
        let full = generate("gnaoua et musiques du monde", date("2025-06-26"), Some(7));
        let prefix = generate("gnaoua et musiques", date("2025-06-26"), Some(7));
        assert_eq!(full.fuzzy_name, prefix.fuzzy_name);
        assert_ne!(full.exact, prefix.exact);
    }

    #[test]
    fn unknown_city_suppresses_all_kinds() {
        let set = generate("gnaoua", date("2025-06-26"), None);
        assert_eq!(set, FingerprintSet::default());
        assert!(set.entries().is_empty());
    }

    #[test]
    fn empty_name_keeps_location_kinds_only() {
        let set = generate("", date("2025-06-26"), Some(7));
        assert!(set.exact.is_none());
        assert!(set.fuzzy_name.is_none());
        assert!(set.date_location.is_some());
        assert!(set.week_location.is_some());
    }

    #[test]
    fn week_kind_groups_same_iso_week() {
        // 2025-06-26 is a Thursday; 2025-06-23 the Monday of that week.
        let thursday = generate("x", date("2025-06-26"), Some(7));
        let monday = generate("x", date("2025-06-23"), Some(7));
        let next_monday = generate("x", date("2025-06-30"), Some(7));
        assert_eq!(thursday.week_location, monday.week_location);
        assert_ne!(thursday.week_location, next_monday.week_location);
    }

    #[test]
    fn different_cities_never_collide() {
        let a = generate("gnaoua", date("2025-06-26"), Some(7));
        let b = generate("gnaoua", date("2025-06-26"), Some(8));
        assert_ne!(a.exact, b.exact);
        assert_ne!(a.date_location, b.date_location);
    }

    #[test]
    fn kind_round_trips() {
        for kind in [
            FingerprintKind::Exact,
            FingerprintKind::FuzzyName,
            FingerprintKind::DateLocation,
            FingerprintKind::WeekLocation,
        ] {
            assert_eq!(FingerprintKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FingerprintKind::parse("bogus"), None);
    }
}
