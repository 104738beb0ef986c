//! Page analysis: fitment panel, in-page part links, no-results markers.
//!
//! Parsing is synchronous and returns owned data so callers never hold a
//! parsed document across an `.await`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::heuristics::{HeuristicSet, strip_non_word};
use crate::makes::{is_known_make, normalize_makes};

/// Phrases that mark a search page with nothing to offer.
pub const NO_RESULTS_PHRASES: &[&str] = &[
    "no results",
    "no matches",
    "not found",
    "no applications found",
];

const NO_APPLICATIONS: &str = "no applications found";

static PANEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#buyersguidepopup-outer_b").expect("valid selector"));
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static PART_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[id^='vew_partnumber'][href], [id^='vew_partnumber'] a[href]")
        .expect("valid selector")
});

/// What the fitment panel of one page said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelOutcome {
    /// No panel on the page.
    Absent,
    /// The panel explicitly lists no applications.
    NoApplications,
    /// The panel exists but nothing in it passed the dictionary.
    Empty,
    /// Normalized, deduplicated makes.
    Makes(BTreeSet<String>),
}

/// Everything the engine needs from one fetched page.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub panel: PanelOutcome,
    /// Hrefs of in-page part links, in document order, deduplicated.
    pub part_links: Vec<String>,
    /// Page text contains one of [`NO_RESULTS_PHRASES`].
    pub reports_no_results: bool,
}

/// Parse a page and analyze its fitment panel. Never fails on malformed HTML.
pub fn analyze_page(html: &str, heuristics: &HeuristicSet) -> PageAnalysis {
    let doc = Html::parse_document(html);

    let panel = match doc.select(&PANEL_SEL).next() {
        Some(el) => analyze_panel(el, heuristics),
        None => PanelOutcome::Absent,
    };

    let page_text = element_text(doc.root_element()).to_lowercase();
    let reports_no_results = NO_RESULTS_PHRASES.iter().any(|p| page_text.contains(p));

    let mut part_links: Vec<String> = Vec::new();
    for el in doc.select(&PART_LINK_SEL) {
        if let Some(href) = el.value().attr("href") {
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            if !part_links.iter().any(|l| l == href) {
                part_links.push(href.to_string());
            }
        }
    }

    PageAnalysis {
        panel,
        part_links,
        reports_no_results,
    }
}

fn analyze_panel(panel: ElementRef<'_>, heuristics: &HeuristicSet) -> PanelOutcome {
    let text = element_text(panel);
    if text.to_lowercase().contains(NO_APPLICATIONS) {
        return PanelOutcome::NoApplications;
    }

    let mut candidates: BTreeSet<String> = BTreeSet::new();

    if panel.select(&ROW_SEL).next().is_none() {
        // No table: scan the whole panel text word by word
        for word in text.to_uppercase().split_whitespace() {
            let word = strip_non_word(word);
            if is_known_make(&word) {
                candidates.insert(word);
            }
        }
    } else {
        for cell in panel.select(&CELL_SEL) {
            let cell_text = element_text(cell);
            let cell_text = cell_text.trim();
            if cell_text.is_empty() {
                continue;
            }
            candidates.extend(heuristics.scan(cell_text));
        }
    }

    let makes: BTreeSet<String> = normalize_makes(&candidates).into_iter().collect();
    if makes.is_empty() {
        PanelOutcome::Empty
    } else {
        PanelOutcome::Makes(makes)
    }
}

/// Text content of an element with text nodes joined by spaces.
fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}
