//! The closed make dictionary plus normalization and validation rules.

use std::collections::BTreeSet;

/// Every make the extractor recognizes, uppercased.
pub const KNOWN_MAKES: &[&str] = &[
    "FORD",
    "CHEVROLET",
    "CHEVY",
    "DODGE",
    "TOYOTA",
    "HONDA",
    "NISSAN",
    "BMW",
    "MERCEDES",
    "AUDI",
    "VOLKSWAGEN",
    "SUBARU",
    "MAZDA",
    "HYUNDAI",
    "KIA",
    "JEEP",
    "CHRYSLER",
    "BUICK",
    "CADILLAC",
    "ACURA",
    "INFINITI",
    "LEXUS",
    "LINCOLN",
    "VOLVO",
    "SAAB",
    "MITSUBISHI",
    "ISUZU",
    "SUZUKI",
    "PONTIAC",
    "OLDSMOBILE",
    "SATURN",
    "MERCURY",
    "PLYMOUTH",
    "EAGLE",
    "GEO",
];

/// Words that show up near fitment data but are never makes.
const STOPLIST: &[&str] = &[
    "part", "parts", "auto", "car", "vehicle", "search", "catalog", "home",
];

/// Alias folding applied before title-casing.
const ALIASES: &[(&str, &str)] = &[("CHEVY", "Chevrolet")];

/// Case-insensitive dictionary membership.
pub fn is_known_make(token: &str) -> bool {
    let upper = token.trim().to_uppercase();
    KNOWN_MAKES.contains(&upper.as_str())
}

/// Fold aliases and title-case a raw make token.
///
/// Idempotent: `normalize_make(&normalize_make(x)) == normalize_make(x)`.
pub fn normalize_make(raw: &str) -> String {
    let trimmed = raw.trim();
    let upper = trimmed.to_uppercase();
    if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == upper) {
        return (*canonical).to_string();
    }
    title_case(trimmed)
}

/// Uppercase the first letter of every letter run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}

/// A normalized make is kept only if it is at least two characters and not a stopword.
pub fn is_valid_make(name: &str) -> bool {
    let name = name.trim();
    if name.chars().count() < 2 {
        return false;
    }
    let lower = name.to_lowercase();
    !STOPLIST.contains(&lower.as_str())
}

/// Normalize, validate, dedupe and sort a batch of raw candidates.
pub fn normalize_makes<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter(|c| !c.as_ref().trim().is_empty())
        .map(|c| normalize_make(c.as_ref()))
        .filter(|m| is_valid_make(m))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Same as [`normalize_makes`] for a comma-separated list.
pub fn normalize_make_list(list: &str) -> Vec<String> {
    normalize_makes(list.split(','))
}
