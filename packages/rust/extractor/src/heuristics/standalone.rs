use super::{CellHeuristic, strip_non_word};

/// Every whitespace-separated token, stripped of punctuation.
pub struct StandaloneTokenHeuristic;

impl CellHeuristic for StandaloneTokenHeuristic {
    fn candidates(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(strip_non_word)
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn name(&self) -> &str {
        "standalone-token"
    }
}
