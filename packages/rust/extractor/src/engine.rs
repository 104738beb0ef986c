//! Per-part lookup: fetch the search page, analyze it, follow part links if needed.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use fitscout_shared::LookupConfig;

use crate::fetcher::PageFetcher;
use crate::heuristics::HeuristicSet;
use crate::panel::{PageAnalysis, PanelOutcome, analyze_page};

/// Result of looking up one part number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Normalized makes, sorted and deduplicated.
    Found(Vec<String>),
    /// A fitment panel said the part has no applications.
    NoApplications,
    /// The source reported no search results and showed no panel.
    NoResults,
    /// Pages were read but nothing passed the dictionary.
    NoMatch,
    /// The search page could not be fetched.
    Unavailable,
}

impl LookupOutcome {
    /// Collapse to "non-empty set of makes, or no confident match".
    pub fn into_makes(self) -> Option<Vec<String>> {
        match self {
            Self::Found(makes) if !makes.is_empty() => Some(makes),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NoApplications => "no_applications",
            Self::NoResults => "no_results",
            Self::NoMatch => "no_match",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Turns fetched pages into a set of vehicle makes.
pub struct MakeExtractor {
    heuristics: HeuristicSet,
    max_followed_links: usize,
}

impl MakeExtractor {
    pub fn new(max_followed_links: usize) -> Self {
        Self {
            heuristics: HeuristicSet::new(),
            max_followed_links,
        }
    }
}

impl Default for MakeExtractor {
    fn default() -> Self {
        Self::new(LookupConfig::default().max_followed_links)
    }
}

impl From<&LookupConfig> for MakeExtractor {
    fn from(config: &LookupConfig) -> Self {
        Self::new(config.max_followed_links)
    }
}

impl MakeExtractor {
    /// Analyze a single page without fetching anything.
    pub fn analyze(&self, html: &str) -> PageAnalysis {
        analyze_page(html, &self.heuristics)
    }

    /// Makes found in a single page, or `None` when it offers no confident match.
    pub fn extract(&self, html: &str) -> Option<Vec<String>> {
        match self.analyze(html).panel {
            PanelOutcome::Makes(makes) => Some(makes.into_iter().collect()),
            _ => None,
        }
    }

    /// Look up `part_number` through `fetcher`.
    ///
    /// The search page is tried first; when it has no usable panel, up to
    /// `max_followed_links` in-page part links are visited and the first page
    /// that yields makes wins. No-results text on the search page only
    /// counts once every followed link came back without a panel.
    #[instrument(skip_all, fields(part_number = %part_number))]
    pub async fn lookup<F: PageFetcher>(
        &self,
        fetcher: &F,
        part_number: &str,
        description: &str,
    ) -> LookupOutcome {
        let part_number = part_number.trim();
        if part_number.is_empty() {
            debug!(description, "empty part number, skipping lookup");
            return LookupOutcome::NoMatch;
        }

        let Some(page) = fetcher.fetch(part_number).await else {
            return LookupOutcome::Unavailable;
        };
        let search = self.analyze(&page);

        match &search.panel {
            PanelOutcome::Makes(makes) => return found(makes.clone()),
            PanelOutcome::NoApplications => return LookupOutcome::NoApplications,
            PanelOutcome::Absent | PanelOutcome::Empty => {}
        }

        let mut makes: BTreeSet<String> = BTreeSet::new();
        let mut saw_no_applications = false;
        for link in search.part_links.iter().take(self.max_followed_links) {
            let Some(page) = fetcher.follow(part_number, link).await else {
                continue;
            };
            match self.analyze(&page).panel {
                PanelOutcome::Makes(found) => {
                    makes.extend(found);
                    break;
                }
                PanelOutcome::NoApplications => saw_no_applications = true,
                PanelOutcome::Absent | PanelOutcome::Empty => {}
            }
        }

        if !makes.is_empty() {
            return found(makes);
        }
        let followed = search.part_links.len().min(self.max_followed_links);
        if saw_no_applications {
            LookupOutcome::NoApplications
        } else if search.panel == PanelOutcome::Absent && search.reports_no_results {
            debug!(followed, "source reports no results");
            LookupOutcome::NoResults
        } else {
            debug!(followed, "no makes found");
            LookupOutcome::NoMatch
        }
    }
}

fn found(makes: BTreeSet<String>) -> LookupOutcome {
    LookupOutcome::Found(makes.into_iter().collect())
}
