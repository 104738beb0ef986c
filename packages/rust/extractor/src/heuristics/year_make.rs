//! `2008 HONDA`, `1999-TOYOTA`: a model year followed by a make.

use std::sync::LazyLock;

use regex::Regex;

use super::CellHeuristic;

static YEAR_MAKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:19|20)\d{2}[-\s]+([A-Z]{2,})").expect("valid regex")
});

/// Matches a 1900–2099 year followed by whitespace or hyphens and an alphabetic token.
pub struct YearMakeHeuristic;

impl CellHeuristic for YearMakeHeuristic {
    fn candidates(&self, text: &str) -> Vec<String> {
        YEAR_MAKE_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn name(&self) -> &str {
        "year-make"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_every_year_make_pair() {
        let got = YearMakeHeuristic.candidates("2004-2008 FORD F-150; 1997 MERCURY VILLAGER");
        assert_eq!(got, vec!["FORD", "MERCURY"]);
    }

    #[test]
    fn ignores_out_of_range_years() {
        assert!(YearMakeHeuristic.candidates("1850 FORD").is_empty());
        assert!(YearMakeHeuristic.candidates("20081 FORD").is_empty());
    }
}
