//! Vehicle-make extraction from parts-lookup pages.
//!
//! This crate provides:
//! - [`makes`]: the make dictionary, normalization and validation
//! - [`heuristics`]: cell-level extraction rules behind a [`CellHeuristic`] registry
//! - [`panel`]: fitment-panel and page analysis
//! - [`fetcher`]: the [`PageFetcher`] capability and its HTTP implementation
//! - [`engine`]: [`MakeExtractor`], the per-part lookup

pub mod engine;
pub mod fetcher;
pub mod heuristics;
pub mod makes;
pub mod panel;

pub use engine::{LookupOutcome, MakeExtractor};
pub use fetcher::{FetcherFactory, HttpFetcherFactory, HttpPageFetcher, PageFetcher};
pub use heuristics::{CellHeuristic, HeuristicSet};
pub use makes::{
    KNOWN_MAKES, is_known_make, is_valid_make, normalize_make, normalize_make_list,
    normalize_makes,
};
pub use panel::{NO_RESULTS_PHRASES, PageAnalysis, PanelOutcome, analyze_page};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use fitscout_shared::{FitScoutError, Result};

    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    /// Serves fixture pages from memory and records what was requested.
    #[derive(Default)]
    struct FixtureFetcher {
        search: HashMap<String, String>,
        links: HashMap<String, String>,
        followed: Mutex<Vec<String>>,
        released: AtomicBool,
    }

    impl FixtureFetcher {
        fn with_search(mut self, part: &str, fixture: &str) -> Self {
            self.search.insert(part.into(), load_fixture(fixture));
            self
        }

        fn with_link(mut self, link: &str, fixture: &str) -> Self {
            self.links.insert(link.into(), load_fixture(fixture));
            self
        }

        fn followed(&self) -> Vec<String> {
            self.followed.lock().unwrap().clone()
        }
    }

    impl PageFetcher for FixtureFetcher {
        fn source_name(&self) -> &str {
            "Fixture"
        }

        fn ensure_ready(&self) -> Result<()> {
            if self.released.load(Ordering::SeqCst) {
                Err(FitScoutError::Fetcher("released".into()))
            } else {
                Ok(())
            }
        }

        async fn fetch(&self, part_number: &str) -> Option<String> {
            self.search.get(part_number).cloned()
        }

        async fn follow(&self, _part_number: &str, link: &str) -> Option<String> {
            self.followed.lock().unwrap().push(link.to_string());
            self.links.get(link).cloned()
        }

        fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    // -----------------------------------------------------------------------
    // Page analysis
    // -----------------------------------------------------------------------

    #[test]
    fn fitment_panel_fixture() {
        let extractor = MakeExtractor::default();
        let makes = extractor.extract(&load_fixture("fitment_panel.html"));
        assert_eq!(
            makes,
            Some(vec![
                "Acura".to_string(),
                "Chevrolet".to_string(),
                "Geo".to_string(),
                "Honda".to_string(),
            ])
        );
    }

    #[test]
    fn no_applications_fixture_is_none() {
        let extractor = MakeExtractor::default();
        assert_eq!(extractor.extract(&load_fixture("no_applications.html")), None);
    }

    #[test]
    fn search_results_fixture_lists_part_links() {
        let extractor = MakeExtractor::default();
        let analysis = extractor.analyze(&load_fixture("search_results.html"));
        assert_eq!(analysis.panel, PanelOutcome::Absent);
        assert!(!analysis.reports_no_results);
        assert_eq!(analysis.part_links.len(), 4);
        assert_eq!(analysis.part_links[0], "/en/moreinfo.php?pk=201");
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = MakeExtractor::default();
        for fixture in ["fitment_panel.html", "part_detail.html", "no_results.html"] {
            let page = load_fixture(fixture);
            assert_eq!(extractor.extract(&page), extractor.extract(&page), "{fixture}");
        }
    }

    // -----------------------------------------------------------------------
    // Lookup flow
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn lookup_uses_search_page_panel() {
        let fetcher = FixtureFetcher::default().with_search("5208", "fitment_panel.html");
        let outcome = MakeExtractor::default()
            .lookup(&fetcher, "5208", "Brake Line Fitting")
            .await;
        assert!(outcome.is_found());
        assert!(fetcher.followed().is_empty());
    }

    #[tokio::test]
    async fn lookup_follows_links_until_makes_found() {
        let fetcher = FixtureFetcher::default()
            .with_search("K80067", "search_results.html")
            .with_link("/en/moreinfo.php?pk=202", "part_detail.html");

        let outcome = MakeExtractor::default()
            .lookup(&fetcher, "K80067", "Sway Bar Link Kit")
            .await;

        assert_eq!(
            outcome,
            LookupOutcome::Found(vec![
                "Ford".to_string(),
                "Lincoln".to_string(),
                "Mercury".to_string(),
            ])
        );
        assert_eq!(
            fetcher.followed(),
            vec!["/en/moreinfo.php?pk=201", "/en/moreinfo.php?pk=202"]
        );
    }

    #[tokio::test]
    async fn lookup_follows_at_most_three_links() {
        let fetcher = FixtureFetcher::default().with_search("K80067", "search_results.html");
        let outcome = MakeExtractor::default()
            .lookup(&fetcher, "K80067", "Sway Bar Link Kit")
            .await;
        assert_eq!(outcome, LookupOutcome::NoMatch);
        assert_eq!(fetcher.followed().len(), 3);
    }

    #[tokio::test]
    async fn lookup_negative_outcomes() {
        let fetcher = FixtureFetcher::default()
            .with_search("5208", "no_applications.html")
            .with_search("ZZ-0000", "no_results.html");
        let extractor = MakeExtractor::default();

        let no_apps = extractor.lookup(&fetcher, "5208", "").await;
        assert_eq!(no_apps, LookupOutcome::NoApplications);
        assert!(fetcher.followed().is_empty());
        assert_eq!(no_apps.into_makes(), None);

        let no_results = extractor.lookup(&fetcher, "ZZ-0000", "").await;
        assert_eq!(no_results, LookupOutcome::NoResults);

        let missing = extractor.lookup(&fetcher, "UNKNOWN", "").await;
        assert_eq!(missing, LookupOutcome::Unavailable);

        let empty = extractor.lookup(&fetcher, "  ", "").await;
        assert_eq!(empty, LookupOutcome::NoMatch);
    }

    #[tokio::test]
    async fn not_found_footer_does_not_skip_part_links() {
        let fetcher = FixtureFetcher::default()
            .with_search("41-993", "search_with_footer.html")
            .with_link("/en/moreinfo.php?pk=301", "honda_detail.html");

        let outcome = MakeExtractor::default()
            .lookup(&fetcher, "41-993", "Spark Plug")
            .await;

        assert_eq!(outcome, LookupOutcome::Found(vec!["Honda".to_string()]));
        assert_eq!(fetcher.followed(), vec!["/en/moreinfo.php?pk=301"]);
    }

    #[tokio::test]
    async fn no_results_text_counts_after_links_fail() {
        let fetcher = FixtureFetcher::default().with_search("41-993", "search_with_footer.html");

        let outcome = MakeExtractor::default()
            .lookup(&fetcher, "41-993", "Spark Plug")
            .await;

        assert_eq!(outcome, LookupOutcome::NoResults);
        assert_eq!(fetcher.followed().len(), 1);
    }

    #[tokio::test]
    async fn followed_no_applications_page_keeps_following() {
        let fetcher = FixtureFetcher::default()
            .with_search("K80067", "search_results.html")
            .with_link("/en/moreinfo.php?pk=201", "no_applications.html")
            .with_link("/en/moreinfo.php?pk=202", "part_detail.html");
        let extractor = MakeExtractor::default();

        let outcome = extractor.lookup(&fetcher, "K80067", "").await;
        assert!(outcome.is_found());
        assert_eq!(fetcher.followed().len(), 2);

        let only_negative = FixtureFetcher::default()
            .with_search("K80067", "search_results.html")
            .with_link("/en/moreinfo.php?pk=201", "no_applications.html");
        let outcome = extractor.lookup(&only_negative, "K80067", "").await;
        assert_eq!(outcome, LookupOutcome::NoApplications);
        assert_eq!(only_negative.followed().len(), 3);
    }

    #[tokio::test]
    async fn lookup_against_http_fetcher() {
        use fitscout_shared::LookupConfig;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en/partsearch/"))
            .and(query_param("partnum", "K80067"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(load_fixture("search_results.html")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en/moreinfo.php"))
            .and(query_param("pk", "201"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(load_fixture("part_detail.html")),
            )
            .mount(&server)
            .await;

        let config = LookupConfig {
            base_url: server.uri(),
            request_delay_ms: 0,
            ..LookupConfig::default()
        };
        let fetcher = HttpFetcherFactory::new(config.clone()).open().await.unwrap();
        let outcome = MakeExtractor::from(&config)
            .lookup(&fetcher, "K80067", "Sway Bar Link Kit")
            .await;

        assert_eq!(
            outcome.into_makes(),
            Some(vec![
                "Ford".to_string(),
                "Lincoln".to_string(),
                "Mercury".to_string(),
            ])
        );
    }
}
