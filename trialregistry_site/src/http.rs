//! Page fetcher over plain HTTP.
//!
//! The registry renders detail pages on the server, so a page fetched with
//! reqwest already holds every panel a browser would show, including the
//! hidden institution tab. Activating a tab or forcing a panel visible
//! therefore only has to confirm that the control or panel exists.

use std::time::Duration;

use url::Url;

use crate::{get_user_agent, Document, FetchError, FetcherFactory, PageFetcher};

/// Creates [`HttpFetcher`] sessions sharing one configuration.
#[derive(Clone, Debug)]
pub struct HttpFetcherFactory {
    request_timeout: Duration,
    user_agent: Option<String>,
    headless: bool,
}

impl Default for HttpFetcherFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpFetcherFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            user_agent: None,
            headless: true,
        }
    }

    /// Pins the user agent instead of picking one per session.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Records the interactive/headless preference. Plain HTTP has no window
    /// to show, so the flag is only reported.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

impl FetcherFactory for HttpFetcherFactory {
    type Fetcher = HttpFetcher;

    async fn launch(&self) -> Result<HttpFetcher, FetchError> {
        if !self.headless {
            tracing::debug!("Interactive mode requested; HTTP fetcher always runs headless");
        }
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| get_user_agent().to_string());
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(self.request_timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                FetchError::Launch(e.to_string())
            })?;
        Ok(HttpFetcher {
            http,
            request_timeout: self.request_timeout,
            page: None,
        })
    }
}

struct LoadedPage {
    url: Url,
    html: String,
}

/// A single HTTP browsing session with cookie persistence.
pub struct HttpFetcher {
    http: reqwest::Client,
    request_timeout: Duration,
    page: Option<LoadedPage>,
}

impl HttpFetcher {
    fn document(&self) -> Result<Document, FetchError> {
        let page = self.page.as_ref().ok_or(FetchError::NoPage)?;
        Ok(Document::parse(&page.html))
    }

    fn map_send_error(&self, url: &Url, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                seconds: self.request_timeout.as_secs(),
            }
        } else {
            FetchError::Navigation {
                url: url.to_string(),
                source,
            }
        }
    }
}

impl PageFetcher for HttpFetcher {
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError> {
        self.page = None;
        let resp = self
            .http
            .get(url.clone())
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = resp.status();
        let resolved = resp.url().clone();
        if !status.is_success() {
            tracing::debug!("GET {} answered {}", url, status);
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = resp.text().await.map_err(|e| self.map_send_error(url, e))?;
        self.page = Some(LoadedPage {
            url: resolved,
            html,
        });
        Ok(())
    }

    async fn wait_for_ready(&mut self, _timeout: Duration) -> bool {
        // The body is complete once the response has been read.
        self.document()
            .map(|doc| doc.has_body_content())
            .unwrap_or(false)
    }

    fn current_url(&self) -> Option<Url> {
        self.page.as_ref().map(|page| page.url.clone())
    }

    fn snapshot(&self) -> Result<Document, FetchError> {
        self.document()
    }

    async fn activate(&mut self, label: &str) -> Result<bool, FetchError> {
        let doc = self.document()?;
        let found = ["a", "button", "li > a"].iter().any(|selector| {
            doc.select_all(selector)
                .into_iter()
                .any(|el| el.text().collect::<String>().contains(label))
        });
        Ok(found)
    }

    fn force_visible(&mut self, selector: &str) -> bool {
        self.document()
            .map(|doc| doc.select_first(selector).is_some())
            .unwrap_or(false)
    }
}
