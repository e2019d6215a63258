mod document;
mod endpoint;
mod errors;
mod fetcher;
mod http;
mod user_agent;
pub use self::document::{rendered_text, squash_whitespace, Document, Scope};
pub use self::endpoint::{
    detail_url, normalize_path, origin_of, page_url, DETAIL_PATH, IDENTIFIER_PARAM,
};
pub use self::errors::FetchError;
pub use self::fetcher::{FetcherFactory, PageFetcher};
pub use self::http::{HttpFetcher, HttpFetcherFactory};
pub use self::user_agent::get_user_agent;
pub use scraper::ElementRef;
pub use url::Url;
