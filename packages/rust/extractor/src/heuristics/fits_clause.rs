//! `FITS: FORD, MAZDA` style clauses.

use std::sync::LazyLock;

use regex::Regex;

use super::CellHeuristic;

static FITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:fits?|compatible|for)\b[:.\s]*([A-Z\s,]+)").expect("valid regex")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3,})\b").expect("valid regex"));

/// Tokens of three or more letters following the first fits/compatible/for keyword.
pub struct FitsClauseHeuristic;

impl CellHeuristic for FitsClauseHeuristic {
    fn candidates(&self, text: &str) -> Vec<String> {
        let Some(clause) = FITS_RE.captures(text).and_then(|caps| caps.get(1)) else {
            return Vec::new();
        };
        WORD_RE
            .captures_iter(clause.as_str())
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn name(&self) -> &str {
        "fits-clause"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_after_keyword() {
        let got = FitsClauseHeuristic.candidates("FITS: FORD, MAZDA 2001");
        assert_eq!(got, vec!["FORD", "MAZDA"]);
    }

    #[test]
    fn keyword_inside_word_is_not_a_clause() {
        assert!(FitsClauseHeuristic.candidates("PLATFORM FORD").is_empty());
    }

    #[test]
    fn short_tokens_skipped() {
        assert_eq!(FitsClauseHeuristic.candidates("FOR VW, GEO"), vec!["GEO"]);
    }
}
