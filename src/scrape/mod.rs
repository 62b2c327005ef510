//! Scraping collaborators
//!
//! - `traits`: the listing/detail fetch contracts and their data types
//! - `parser`: selector-driven HTML extraction
//! - `http`: the reqwest-backed implementation of both contracts

mod http;
pub(crate) mod parser;
mod traits;

pub use http::{build_http_client, classify_status, classify_transport_error, HttpScraper};
pub use parser::PageParser;
pub use traits::{
    DetailRecord, DetailSource, FetchError, FetchResult, ListingItem, ListingPage, ListingSource,
};
