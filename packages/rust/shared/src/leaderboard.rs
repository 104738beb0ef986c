//! Running tally of makes across a session.

use serde::{Deserialize, Serialize};

use crate::types::{EnrichedResult, NOT_FOUND};

/// Per-make counters. Both are non-decreasing during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub make: String,
    pub occurrence_count: u64,
    /// Sum of the quantities of every record that matched this make.
    pub weighted_count: u64,
}

/// Make tally kept in first-seen order so ranking ties stay stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Rebuild from scratch out of a result log.
    pub fn from_results(results: &[EnrichedResult]) -> Self {
        let mut board = Self::default();
        for result in results {
            board.update(&result.makes.to_string(), result.part.quantity);
        }
        board
    }

    /// Fold one result's comma-separated makes into the tally.
    ///
    /// Empty input and `NOT_FOUND` leave the board untouched.
    pub fn update(&mut self, makes: &str, quantity: u32) {
        let makes = makes.trim();
        if makes.is_empty() || makes == NOT_FOUND {
            return;
        }

        for make in makes.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            match self.entries.iter_mut().find(|e| e.make == make) {
                Some(entry) => {
                    entry.occurrence_count += 1;
                    entry.weighted_count += u64::from(quantity);
                }
                None => self.entries.push(LeaderboardEntry {
                    make: make.to_string(),
                    occurrence_count: 1,
                    weighted_count: u64::from(quantity),
                }),
            }
        }
    }

    /// Top `n` entries by weighted count; ties keep insertion order.
    pub fn top_n(&self, n: usize) -> Vec<LeaderboardEntry> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.weighted_count.cmp(&a.weighted_count));
        ranked.truncate(n);
        ranked
    }

    /// All entries in first-seen order.
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn get(&self, make: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.make == make)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Makes, PartRecord};

    fn result(index: usize, makes: &[&str], quantity: u32) -> EnrichedResult {
        let part = PartRecord::new(index, format!("X_{index}"), "part", quantity, 1.0, 1.0);
        let makes = if makes.is_empty() {
            Makes::NotFound
        } else {
            Makes::Found(makes.iter().map(|m| m.to_string()).collect())
        };
        EnrichedResult::new(index, part, makes, "RockAuto")
    }

    #[test]
    fn update_counts_and_weights() {
        let mut board = Leaderboard::default();
        board.update("Ford, Honda", 3);
        board.update("Ford", 2);

        let ford = board.get("Ford").expect("ford entry");
        assert_eq!(ford.occurrence_count, 2);
        assert_eq!(ford.weighted_count, 5);
        assert_eq!(board.get("Honda").map(|e| e.weighted_count), Some(3));
    }

    #[test]
    fn not_found_and_empty_are_ignored() {
        let mut board = Leaderboard::default();
        board.update("NOT_FOUND", 10);
        board.update("", 10);
        board.update(" , ,", 10);
        assert!(board.is_empty());
    }

    #[test]
    fn top_n_orders_by_weight_with_stable_ties() {
        let mut board = Leaderboard::default();
        board.update("Acura", 1);
        board.update("Buick", 5);
        board.update("Dodge", 1);
        board.update("Ford", 5);

        let top: Vec<String> = board.top_n(3).into_iter().map(|e| e.make).collect();
        assert_eq!(top, vec!["Buick", "Ford", "Acura"]);
        assert_eq!(board.top_n(10).len(), 4);
    }

    #[test]
    fn additivity_over_concatenated_logs() {
        let first = vec![result(0, &["Ford", "Honda"], 2), result(1, &[], 7)];
        let second = vec![result(2, &["Honda"], 4), result(3, &["Toyota"], 1)];

        let board_a = Leaderboard::from_results(&first);
        let board_b = Leaderboard::from_results(&second);
        let combined: Vec<EnrichedResult> = first.iter().chain(&second).cloned().collect();
        let board_ab = Leaderboard::from_results(&combined);

        for make in ["Ford", "Honda", "Toyota"] {
            let weight = |b: &Leaderboard| b.get(make).map_or(0, |e| e.weighted_count);
            let count = |b: &Leaderboard| b.get(make).map_or(0, |e| e.occurrence_count);
            assert_eq!(weight(&board_ab), weight(&board_a) + weight(&board_b));
            assert_eq!(count(&board_ab), count(&board_a) + count(&board_b));
        }
    }
}
