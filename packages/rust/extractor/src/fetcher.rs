//! The page-fetching capability the extractor depends on, and its HTTP implementation.
//!
//! A [`FetcherFactory`] opens one [`PageFetcher`] per worker run. Per-page
//! failures surface as `None`; a fetcher that can no longer be used reports
//! it through [`PageFetcher::ensure_ready`].

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use fitscout_shared::{FitScoutError, LookupConfig, Result};

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("fitscout/", env!("CARGO_PKG_VERSION"));

/// Transport failures in a row after which the fetcher reports itself unusable.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Fetches raw page content for part numbers.
pub trait PageFetcher: Send + Sync {
    /// Label recorded as the source of matches found through this fetcher.
    fn source_name(&self) -> &str;

    /// `Err` once the fetcher is released or otherwise unusable.
    fn ensure_ready(&self) -> Result<()>;

    /// Content of the part-search page, or `None` on a per-page failure.
    fn fetch(&self, part_number: &str) -> impl Future<Output = Option<String>> + Send;

    /// Content behind an in-page link found on a previously fetched page.
    fn follow(&self, part_number: &str, link: &str)
    -> impl Future<Output = Option<String>> + Send;

    /// Free underlying resources. Safe to call more than once.
    fn release(&self);
}

/// Opens a fresh fetcher for each worker run.
pub trait FetcherFactory: Send + Sync + 'static {
    type Fetcher: PageFetcher + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Fetcher>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Fetches server-rendered search pages over plain HTTP.
pub struct HttpPageFetcher {
    client: Client,
    base_url: Url,
    config: LookupConfig,
    released: AtomicBool,
    consecutive_failures: AtomicU32,
    last_failure: Mutex<Option<FitScoutError>>,
}

impl HttpPageFetcher {
    /// Build a fetcher for the configured lookup source.
    pub fn new(config: LookupConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            FitScoutError::config(format!("invalid lookup base URL '{}': {e}", config.base_url))
        })?;

        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FitScoutError::Fetcher(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            config,
            released: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            last_failure: Mutex::new(None),
        })
    }

    /// Absolute URL of the search page for `part_number`.
    pub fn search_url(&self, part_number: &str) -> Result<Url> {
        let encoded: String = url::form_urlencoded::byte_serialize(part_number.as_bytes()).collect();
        let path = self.config.search_path.replace("{part}", &encoded);
        self.base_url
            .join(&path)
            .map_err(|e| FitScoutError::config(format!("invalid search path '{path}': {e}")))
    }

    /// Resolve an in-page link, refusing anything off the lookup host.
    fn resolve_link(&self, link: &str) -> Option<Url> {
        let resolved = self.base_url.join(link).ok()?;
        if resolved.host_str() != self.base_url.host_str()
            || resolved.port_or_known_default() != self.base_url.port_or_known_default()
        {
            warn!(%resolved, "link leaves the lookup host, skipping");
            return None;
        }
        Some(resolved)
    }

    async fn get_page(&self, url: &Url) -> Option<String> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        debug!(%url, "fetching page");

        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                let err = FitScoutError::Network(format!("GET {url}: {e}"));
                warn!(error = %err, failures, "request failed");
                if let Ok(mut last) = self.last_failure.lock() {
                    *last = Some(err);
                }
                return None;
            }
        };
        self.consecutive_failures.store(0, Ordering::Release);

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "unexpected HTTP status");
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "body read failed");
                return None;
            }
        };

        if self.config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
        Some(body)
    }
}

impl PageFetcher for HttpPageFetcher {
    fn source_name(&self) -> &str {
        &self.config.source_name
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(FitScoutError::Fetcher("fetcher already released".into()));
        }
        let failures = self.consecutive_failures.load(Ordering::Acquire);
        if failures >= MAX_CONSECUTIVE_FAILURES {
            let cause = self
                .last_failure
                .lock()
                .ok()
                .and_then(|last| last.as_ref().map(ToString::to_string))
                .unwrap_or_default();
            return Err(FitScoutError::Network(format!(
                "lookup source unreachable after {failures} consecutive failures ({cause})"
            )));
        }
        Ok(())
    }

    async fn fetch(&self, part_number: &str) -> Option<String> {
        let url = match self.search_url(part_number) {
            Ok(url) => url,
            Err(e) => {
                warn!(part_number, error = %e, "cannot build search URL");
                return None;
            }
        };
        self.get_page(&url).await
    }

    async fn follow(&self, part_number: &str, link: &str) -> Option<String> {
        let url = self.resolve_link(link)?;
        debug!(part_number, %url, "following part link");
        self.get_page(&url).await
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            info!(source = %self.config.source_name, "page fetcher released");
        }
    }
}

/// Opens an [`HttpPageFetcher`] per run.
#[derive(Debug, Clone)]
pub struct HttpFetcherFactory {
    config: LookupConfig,
}

impl HttpFetcherFactory {
    pub fn new(config: LookupConfig) -> Self {
        Self { config }
    }
}

impl FetcherFactory for HttpFetcherFactory {
    type Fetcher = HttpPageFetcher;

    async fn open(&self) -> Result<HttpPageFetcher> {
        HttpPageFetcher::new(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> LookupConfig {
        LookupConfig {
            base_url: base_url.to_string(),
            request_delay_ms: 0,
            timeout_secs: 5,
            ..LookupConfig::default()
        }
    }

    #[test]
    fn search_url_encodes_part_number() {
        let fetcher = HttpPageFetcher::new(test_config("https://parts.example.com")).unwrap();
        let url = fetcher.search_url("12 345/A").unwrap();
        assert_eq!(
            url.as_str(),
            "https://parts.example.com/en/partsearch/?partnum=12+345%2FA"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = HttpPageFetcher::new(test_config("::nope::")).err().unwrap();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn links_off_host_are_refused() {
        let fetcher = HttpPageFetcher::new(test_config("https://parts.example.com")).unwrap();
        assert!(fetcher.resolve_link("/en/moreinfo.php?pk=1").is_some());
        assert!(fetcher.resolve_link("https://evil.example.net/x").is_none());
    }

    #[tokio::test]
    async fn fetch_and_follow_against_mock_server() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/en/partsearch/"))
            .and(query_param("partnum", "5208"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>search page</p>"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/en/moreinfo.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>detail page</p>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcherFactory::new(test_config(&server.uri()))
            .open()
            .await
            .unwrap();

        assert!(fetcher.ensure_ready().is_ok());
        let page = fetcher.fetch("5208").await.unwrap();
        assert!(page.contains("search page"));

        let detail = fetcher.follow("5208", "/en/moreinfo.php?pk=9").await.unwrap();
        assert!(detail.contains("detail page"));
    }

    #[tokio::test]
    async fn http_error_is_a_per_page_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::new(test_config(&server.uri())).unwrap();
        assert!(fetcher.fetch("5208").await.is_none());
        assert!(fetcher.ensure_ready().is_ok());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_final() {
        let server = MockServer::start().await;
        let fetcher = HttpPageFetcher::new(test_config(&server.uri())).unwrap();

        fetcher.release();
        fetcher.release();

        assert!(fetcher.ensure_ready().is_err());
        assert!(fetcher.fetch("5208").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_source_becomes_unusable() {
        // Nothing listens on port 9 of the loopback interface.
        let fetcher = HttpPageFetcher::new(test_config("http://127.0.0.1:9")).unwrap();
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            assert!(fetcher.fetch("5208").await.is_none());
        }
        let err = fetcher.ensure_ready().unwrap_err();
        assert!(matches!(err, FitScoutError::Network(_)));
        assert!(err.to_string().contains("consecutive failures"));
        assert!(err.to_string().contains("127.0.0.1:9"));
    }
}
