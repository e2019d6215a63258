//! The page-fetcher capability consumed by the crawl engine.
//!
//! The engine never talks to the network directly. It drives a
//! [`PageFetcher`] one page at a time and asks a [`FetcherFactory`] for a
//! fresh fetcher whenever it decides to recycle the current one.

use std::time::Duration;

use url::Url;

use crate::{Document, FetchError};

/// One exclusively owned browsing session.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    /// Loads `url`, following redirects. On success the page becomes the
    /// current page.
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError>;

    /// Waits up to `timeout` for the current page to carry a rendered body.
    async fn wait_for_ready(&mut self, timeout: Duration) -> bool;

    /// The URL the current page actually resolved to, after redirects.
    fn current_url(&self) -> Option<Url>;

    /// A parsed snapshot of the current page as rendered right now.
    fn snapshot(&self) -> Result<Document, FetchError>;

    /// Activates the first tab, link or button whose text contains `label`.
    /// Returns `Ok(false)` when no such control exists.
    async fn activate(&mut self, label: &str) -> Result<bool, FetchError>;

    /// Forces the first element matching `selector` to be displayed.
    /// Returns `false` when nothing matches.
    fn force_visible(&mut self, selector: &str) -> bool;
}

/// Creates fetchers. Each call yields an independent session.
#[allow(async_fn_in_trait)]
pub trait FetcherFactory {
    type Fetcher: PageFetcher;

    async fn launch(&self) -> Result<Self::Fetcher, FetchError>;
}
