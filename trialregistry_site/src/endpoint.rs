//! Detail-page URL construction for the registry site.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::FetchError;

/// Path of the record detail page, relative to a base endpoint.
pub const DETAIL_PATH: &str = "/clnctest/view.do";

/// Query parameter carrying the record identifier.
pub const IDENTIFIER_PARAM: &str = "clncTestSn";

fn repeated_slashes() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/{2,}").expect("slash pattern is valid"))
}

/// Collapses runs of `/` into a single separator (`//clnctest` -> `/clnctest`).
pub fn normalize_path(path: &str) -> String {
    repeated_slashes().replace_all(path, "/").into_owned()
}

/// Joins `path` and `query` onto the origin of `base`.
///
/// Only the scheme, host and port of `base` are kept; any path or query it
/// carries is replaced. Doubled separators in `path` are collapsed.
pub fn page_url(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
    let origin = origin_of(base);
    let mut url = Url::parse(&origin).map_err(|e| {
        tracing::error!("Invalid base endpoint {}: {}", origin, e);
        FetchError::InvalidUrl(format!("{}: {}", origin, e))
    })?;
    url.set_path(&normalize_path(path));
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(query);
    }
    Ok(url)
}

/// Builds `{base}/clnctest/view.do?clncTestSn={identifier}`.
pub fn detail_url(base: &Url, identifier: u64) -> Result<Url, FetchError> {
    let identifier = identifier.to_string();
    page_url(base, DETAIL_PATH, &[(IDENTIFIER_PARAM, identifier.as_str())])
}

/// Returns `scheme://host[:port]` for `url`, the unit a base endpoint is
/// compared and pinned by.
pub fn origin_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}
