//! Cell-level heuristics that pull candidate makes out of fitment text.
//!
//! Each heuristic proposes raw tokens; [`HeuristicSet::scan`] keeps only the
//! ones found in the make dictionary.

mod fits_clause;
mod standalone;
mod year_make;

use std::collections::BTreeSet;

pub use fits_clause::FitsClauseHeuristic;
pub use standalone::StandaloneTokenHeuristic;
pub use year_make::YearMakeHeuristic;

use crate::makes::is_known_make;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A single extraction rule applied to the uppercased text of one cell.
pub trait CellHeuristic: Send + Sync {
    /// Raw, unvalidated candidate tokens.
    fn candidates(&self, text: &str) -> Vec<String>;

    /// Human-readable heuristic name for tracing.
    fn name(&self) -> &str;
}

/// Strip everything but word characters from a token.
pub(crate) fn strip_non_word(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds the heuristics applied to every cell, in order.
pub struct HeuristicSet {
    heuristics: Vec<Box<dyn CellHeuristic>>,
}

impl HeuristicSet {
    /// The three built-in heuristics: year-make, standalone token, fits clause.
    pub fn new() -> Self {
        Self {
            heuristics: vec![
                Box::new(YearMakeHeuristic),
                Box::new(StandaloneTokenHeuristic),
                Box::new(FitsClauseHeuristic),
            ],
        }
    }

    /// Dictionary-gated candidates (uppercased) from one cell's text.
    pub fn scan(&self, text: &str) -> BTreeSet<String> {
        let upper = text.to_uppercase();
        let mut found = BTreeSet::new();
        for heuristic in &self.heuristics {
            for candidate in heuristic.candidates(&upper) {
                if is_known_make(&candidate) {
                    tracing::trace!(heuristic = heuristic.name(), %candidate, "make candidate");
                    found.insert(candidate.to_uppercase());
                }
            }
        }
        found
    }

    pub fn names(&self) -> Vec<&str> {
        self.heuristics.iter().map(|h| h.name()).collect()
    }
}

impl Default for HeuristicSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_make_cell() {
        let set = HeuristicSet::new();
        let found = set.scan("2008 HONDA CIVIC");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["HONDA"]);
    }

    #[test]
    fn lowercase_cell_is_uppercased_first() {
        let set = HeuristicSet::new();
        let found = set.scan("1999-toyota camry");
        assert!(found.contains("TOYOTA"));
    }

    #[test]
    fn non_dictionary_tokens_are_dropped() {
        let set = HeuristicSet::new();
        assert!(set.scan("2012 TESLA MODEL S").is_empty());
        assert!(set.scan("FITS: CIVIC, ACCORD").is_empty());
    }

    #[test]
    fn fits_clause_with_punctuation() {
        let set = HeuristicSet::new();
        let found = set.scan("Compatible: Ford, Mazda and others");
        assert!(found.contains("FORD"));
        assert!(found.contains("MAZDA"));
    }

    #[test]
    fn registry_order() {
        assert_eq!(
            HeuristicSet::new().names(),
            vec!["year-make", "standalone-token", "fits-clause"]
        );
    }
}
