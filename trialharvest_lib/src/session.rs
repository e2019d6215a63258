//! Scoped ownership of the page fetcher.

use std::time::Duration;

use trialregistry_site::{FetchError, FetcherFactory};

/// Owns at most one live fetcher at a time. The walker acquires it lazily,
/// tears it down and relaunches it on its maintenance schedule, and releases
/// it when the walk ends.
pub struct FetcherSession<F: FetcherFactory> {
    factory: F,
    fetcher: Option<F::Fetcher>,
    launches: usize,
}

impl<F: FetcherFactory> FetcherSession<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            fetcher: None,
            launches: 0,
        }
    }

    /// The live fetcher, launching one if none is held.
    pub async fn acquire(&mut self) -> Result<&mut F::Fetcher, FetchError> {
        if self.fetcher.is_none() {
            let fetcher = self.factory.launch().await?;
            self.launches += 1;
            tracing::debug!("Launched page fetcher (#{})", self.launches);
            self.fetcher = Some(fetcher);
        }
        match self.fetcher.as_mut() {
            Some(fetcher) => Ok(fetcher),
            None => Err(FetchError::Launch("fetcher vanished after launch".into())),
        }
    }

    /// Drops the current fetcher, waits `pause`, and launches a new one.
    pub async fn recycle(&mut self, pause: Duration) -> Result<&mut F::Fetcher, FetchError> {
        self.release();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        self.acquire().await
    }

    pub fn release(&mut self) {
        if self.fetcher.take().is_some() {
            tracing::debug!("Released page fetcher");
        }
    }

    /// Number of fetchers launched over the session's lifetime.
    pub fn launches(&self) -> usize {
        self.launches
    }
}
