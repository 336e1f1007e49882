//! Source adapters: one per external source, each mapping its own
//! response shape into canonical `RawItem`s / `RawImageRef`s. Unknown
//! fields stay empty. All rate-limit, retry and budget state lives with
//! the coordinator.

pub mod goat;
pub mod image_search;
pub mod sneakerdb;
pub mod stockx;

pub use goat::GoatAdapter;
pub use image_search::BingImageSearchAdapter;
pub use sneakerdb::SneakerDbAdapter;
pub use stockx::StockxAdapter;

use scrapeninja_client::ScrapeNinjaError;
use soledex_common::SourceError;

/// Map rendering-proxy failures onto the adapter error taxonomy.
pub(crate) fn proxy_error(err: ScrapeNinjaError) -> SourceError {
    match err {
        ScrapeNinjaError::RateLimited => SourceError::RateLimited { retry_after: None },
        ScrapeNinjaError::Network(msg) if msg == "timeout" => SourceError::Timeout,
        ScrapeNinjaError::Network(msg) => SourceError::BadResponse(msg),
        ScrapeNinjaError::Api { status: 401, message } | ScrapeNinjaError::Api { status: 403, message } => {
            SourceError::Auth(message)
        }
        ScrapeNinjaError::Api { status, message } => {
            SourceError::BadResponse(format!("status {status}: {message}"))
        }
        ScrapeNinjaError::Parse(msg) => SourceError::BadResponse(msg),
        ScrapeNinjaError::EmptyBody(_) => SourceError::NotFound,
    }
}
