//! Text normalization and fuzzy reference matching.
//!
//! Everything here is pure and deterministic: the same input always yields
//! the same output, which is what makes fingerprints stable across runs.

use chrono::NaiveDate;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Tokens dropped from event names before fingerprinting. `édition` folds to
/// `edition` before this filter runs.
const NOISE_TOKENS: &[&str] = &["festival", "fest", "edition"];

/// Levenshtein ceiling for fuzzy city matching.
const MAX_CITY_DISTANCE: usize = 2;

/// Lowercase, decompose, and strip combining marks; collapse every
/// non-alphanumeric run to a single space.
pub fn fold(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize an event name: [`fold`], then drop noise tokens and
/// four-digit year tokens.
pub fn normalize_name(raw: &str) -> String {
    fold(raw)
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .filter(|token| !is_year_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_year_token(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_digit())
}

/// URL-safe slug from an arbitrary name.
pub fn slugify(raw: &str) -> String {
    fold(raw).replace(' ', "-")
}

/// A recognized city with its administrative region.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRef {
    pub id: i32,
    pub region_id: i32,
    pub name: String,
    pub slug: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Fuzzy matcher over the canonical city table.
///
/// Exact normalized match against any recognized name variant wins first;
/// otherwise the nearest city by Levenshtein distance within the ceiling.
/// Returns `None` when nothing is close enough: it never guesses.
pub struct CityMatcher {
    cities: Vec<CityRef>,
    /// (folded variant, index into `cities`), insertion order preserved so
    /// distance ties resolve deterministically.
    variants: Vec<(String, usize)>,
}

impl CityMatcher {
    pub fn new(cities: Vec<(CityRef, Vec<String>)>) -> Self {
        let mut stored = Vec::with_capacity(cities.len());
        let mut variants = Vec::new();
        for (city, extra) in cities {
            let idx = stored.len();
            variants.push((fold(&city.name), idx));
            for variant in extra {
                let folded = fold(&variant);
                if !folded.is_empty() {
                    variants.push((folded, idx));
                }
            }
            stored.push(city);
        }
        Self {
            cities: stored,
            variants,
        }
    }

    pub fn match_city(&self, raw: &str) -> Option<&CityRef> {
        let needle = fold(raw);
        if needle.is_empty() {
            return None;
        }

        for (variant, idx) in &self.variants {
            if *variant == needle {
                return Some(&self.cities[*idx]);
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for (variant, idx) in &self.variants {
            let distance = strsim::levenshtein(variant, &needle);
            if distance > MAX_CITY_DISTANCE {
                continue;
            }
            match best {
                Some((best_distance, _)) if best_distance <= distance => {}
                _ => best = Some((distance, *idx)),
            }
        }

        best.map(|(_, idx)| &self.cities[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Errors from [`parse_event_date`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateParseError {
    #[error("unrecognized date format: {0}")]
    Unrecognized(String),
    #[error("ambiguous day/month ordering: {0}")]
    Ambiguous(String),
    #[error("date out of range: {0}")]
    OutOfRange(String),
}

const MONTHS: &[(&str, u32)] = &[
    // English
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    // French, post-diacritic-fold
    ("janvier", 1),
    ("fevrier", 2),
    ("mars", 3),
    ("avril", 4),
    ("mai", 5),
    ("juin", 6),
    ("juillet", 7),
    ("aout", 8),
    ("septembre", 9),
    ("octobre", 10),
    ("novembre", 11),
    ("decembre", 12),
];

fn month_number(token: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, number)| *number)
}

/// Parse an event date, failing closed on ambiguous day/month orderings.
///
/// Accepted: ISO 8601 (`2025-06-26`, `2025/06/26`) and spelled-out month
/// forms in English or French (`26 June 2025`, `June 26, 2025`,
/// `26 juin 2025`). Numeric day-first or month-first forms such as
/// `03/04/2025` are rejected as ambiguous.
pub fn parse_event_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DateParseError::Unrecognized(raw.to_string()));
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    // Timestamp with an unambiguous date prefix.
    if trimmed.len() > 10 && trimmed.as_bytes().get(10) == Some(&b'T') {
        if let Ok(date) = NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d") {
            return Ok(date);
        }
    }

    let tokens: Vec<String> = fold(trimmed)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect();

    if tokens.len() == 3 {
        let all_numeric = tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_digit()));
        if all_numeric {
            // Year-first was handled above; anything else cannot be told apart.
            return Err(DateParseError::Ambiguous(raw.to_string()));
        }

        let spelled = |day: &str, month: &str, year: &str| -> Option<(u32, u32, i32)> {
            let day: u32 = day.parse().ok()?;
            let month = month_number(month)?;
            let year: i32 = year.parse().ok()?;
            if year < 1000 {
                return None;
            }
            Some((day, month, year))
        };

        let parsed = spelled(&tokens[0], &tokens[1], &tokens[2])
            .or_else(|| spelled(&tokens[1], &tokens[0], &tokens[2]));

        if let Some((day, month, year)) = parsed {
            return NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| DateParseError::OutOfRange(raw.to_string()));
        }
    }

    Err(DateParseError::Unrecognized(raw.to_string()))
}

/// Boolean coercion for spreadsheet cells.
pub fn parse_flexible_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "TRUE" | "Yes" | "1" | "true" => Some(true),
        "FALSE" | "No" | "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(id: i32, name: &str) -> CityRef {
        CityRef {
            id,
            region_id: 1,
            name: name.to_string(),
            slug: slugify(name),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn normalize_strips_diacritics_and_noise() {
        assert_eq!(
            normalize_name("Festival Gnaoua et Musiques du Monde 2025"),
            "gnaoua et musiques du monde"
        );
        assert_eq!(
            normalize_name("Festival Gnaoua 2025 — 27e édition"),
            "gnaoua 27e"
        );
        assert_eq!(normalize_name("  Timitar   Fest!  "), "timitar");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in [
            "Festival Gnaoua et Musiques du Monde 2025",
            "Jazzablanca — 18ème édition",
            "MOGA Essaouira",
            "  léîlà &&& 2024 fest  ",
        ] {
            let once = normalize_name(input);
            assert_eq!(once, normalize_name(&once), "not idempotent for {input:?}");
        }
    }

    #[test]
    fn year_tokens_are_removed_but_other_numbers_stay() {
        assert_eq!(normalize_name("Nuits Sonores 2024"), "nuits sonores");
        assert_eq!(normalize_name("Woodstock 99"), "woodstock 99");
        assert_eq!(normalize_name("Expo 10000"), "expo 10000");
    }

    #[test]
    fn city_matcher_prefers_exact_variant() {
        let matcher = CityMatcher::new(vec![
            (city(1, "Essaouira"), vec!["Mogador".to_string()]),
            (city(2, "Marrakech"), vec!["Marrakesh".to_string()]),
        ]);

        assert_eq!(matcher.match_city("essaouira").unwrap().id, 1);
        assert_eq!(matcher.match_city("Mogador").unwrap().id, 1);
        assert_eq!(matcher.match_city("Marrakesh").unwrap().id, 2);
    }

    #[test]
    fn city_matcher_tolerates_two_edits() {
        let matcher = CityMatcher::new(vec![(city(1, "Essaouira"), vec![])]);
        assert_eq!(matcher.match_city("Esaouira").unwrap().id, 1);
        assert_eq!(matcher.match_city("essaouirra").unwrap().id, 1);
        assert!(matcher.match_city("Agadir").is_none());
    }

    #[test]
    fn city_matcher_never_guesses() {
        let matcher = CityMatcher::new(vec![(city(1, "Rabat"), vec![])]);
        assert!(matcher.match_city("Casablanca").is_none());
        assert!(matcher.match_city("").is_none());
    }

    #[test]
    fn iso_dates_parse() {
        assert_eq!(
            parse_event_date("2025-06-26").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()
        );
        assert_eq!(
            parse_event_date("2025/06/26").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()
        );
        assert_eq!(
            parse_event_date("2025-06-26T20:00:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()
        );
    }

    #[test]
    fn locale_dates_parse() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
        assert_eq!(parse_event_date("26 June 2025").unwrap(), expected);
        assert_eq!(parse_event_date("June 26, 2025").unwrap(), expected);
        assert_eq!(parse_event_date("26 juin 2025").unwrap(), expected);
        assert_eq!(
            parse_event_date("15 août 2025").unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
        );
    }

    #[test]
    fn ambiguous_numeric_dates_fail_closed() {
        assert_eq!(
            parse_event_date("03/04/2025"),
            Err(DateParseError::Ambiguous("03/04/2025".to_string()))
        );
        assert_eq!(
            parse_event_date("04-03-2025"),
            Err(DateParseError::Ambiguous("04-03-2025".to_string()))
        );
        assert!(matches!(
            parse_event_date("soon"),
            Err(DateParseError::Unrecognized(_))
        ));
    }

    #[test]
    fn flexible_bool_accepts_spreadsheet_literals() {
        for truthy in ["TRUE", "Yes", "1", "true"] {
            assert_eq!(parse_flexible_bool(truthy), Some(true));
        }
        for falsy in ["FALSE", "No", "0", "false"] {
            assert_eq!(parse_flexible_bool(falsy), Some(false));
        }
        assert_eq!(parse_flexible_bool("maybe"), None);
        assert_eq!(parse_flexible_bool("YES"), None);
    }

    #[test]
    fn slugify_produces_url_safe_names() {
        assert_eq!(slugify("Festival Gnaoua — Essaouira"), "festival-gnaoua-essaouira");
        assert_eq!(slugify("  L'Boulevard  "), "l-boulevard");
    }
}
