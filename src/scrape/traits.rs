//! Fetch contracts between the orchestrator and its scraping collaborators
//!
//! The orchestrator only ever needs two capabilities: read one listing page,
//! and read one detail page. Each is a single-method trait so that tests and
//! alternative engines can provide either independently.

use crate::retry::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A failed fetch, tagged with its retry classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    /// How the retry policy should treat this failure
    pub kind: ErrorKind,

    /// Human-readable description
    pub message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

/// Result type alias for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// One row of a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    /// Notice number; stable across runs and used as the dedup key
    pub id: String,

    /// Notice title, when the listing shows one
    pub title: Option<String>,

    /// Absolute URL of the detail page
    pub detail_url: Option<String>,

    /// Any additional listing columns, keyed by configured field name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ListingItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            detail_url: None,
            fields: BTreeMap::new(),
        }
    }

    /// Identifying information recorded when this item fails
    pub fn identifying_info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("id".to_string(), self.id.clone());
        if let Some(title) = &self.title {
            info.insert("title".to_string(), title.clone());
        }
        if let Some(url) = &self.detail_url {
            info.insert("url".to_string(), url.clone());
        }
        info
    }
}

/// One page of listing results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Items in the page's natural order
    pub items: Vec<ListingItem>,

    /// Whether another listing page follows this one
    pub has_next_page: bool,

    /// Total number of pages, when the site reports it
    pub total_pages: Option<u32>,
}

/// A fully collected record: the listing row plus its detail fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    /// Notice number
    pub id: String,

    /// The listing row this record was reached from
    pub listing: ListingItem,

    /// Detail page fields, keyed by configured field name
    pub fields: BTreeMap<String, String>,

    /// When the detail page was read
    pub fetched_at: DateTime<Utc>,
}

impl DetailRecord {
    pub fn new(listing: ListingItem, fields: BTreeMap<String, String>) -> Self {
        Self {
            id: listing.id.clone(),
            listing,
            fields,
            fetched_at: Utc::now(),
        }
    }
}

/// Reads one page of listing items
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetches listing page `page` (1-based)
    async fn fetch_list(&self, page: u32) -> FetchResult<ListingPage>;

    /// Releases any session held by this source
    ///
    /// Called once when the run reaches a terminal phase.
    async fn close(&self) {}
}

/// Reads the detail page behind one listing item
///
/// Implementations must be idempotent: a call may be repeated after a timeout
/// whose outcome is unknown.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, item: &ListingItem) -> FetchResult<DetailRecord>;

    /// Releases any session held by this source
    async fn close(&self) {}
}
