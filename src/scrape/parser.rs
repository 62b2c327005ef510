//! HTML extraction for listing and detail pages
//!
//! This module turns fetched markup into crawl data:
//! - Listing rows (id, title, detail link, extra columns)
//! - Pagination hints (next-page marker, total page count)
//! - Detail page fields, with required-field checks
//!
//! All selectors come from the `[site]` configuration section and are compiled
//! once when the parser is built.

use crate::config::SiteConfig;
use crate::scrape::traits::{FetchError, FetchResult, ListingItem, ListingPage};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// Compiled selectors for one site
#[derive(Debug, Clone)]
pub struct PageParser {
    base_url: Url,
    item: Selector,
    id: Selector,
    title: Option<Selector>,
    link: Option<Selector>,
    next_page: Option<Selector>,
    total_pages: Option<Selector>,
    list_fields: Vec<(String, Selector)>,
    detail_fields: Vec<(String, Selector)>,
    required_fields: Vec<String>,
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

fn compile_optional(selector: &Option<String>) -> Result<Option<Selector>, ConfigError> {
    selector.as_deref().map(compile).transpose()
}

fn compile_fields(fields: &BTreeMap<String, String>) -> Result<Vec<(String, Selector)>, ConfigError> {
    fields
        .iter()
        .map(|(name, selector)| Ok((name.clone(), compile(selector)?)))
        .collect()
}

/// Whitespace-normalized text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match of `selector` under `scope`, if non-empty
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Last run of ASCII digits in `text` ("Page 1 of 12" -> 12)
fn last_number(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .last()
        .and_then(|run| run.parse().ok())
}

impl PageParser {
    /// Compiles the selectors of a site configuration
    ///
    /// # Returns
    ///
    /// * `Ok(PageParser)` - All selectors compiled
    /// * `Err(ConfigError)` - A selector or the base URL is invalid
    pub fn from_config(site: &SiteConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&site.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

        Ok(Self {
            base_url,
            item: compile(&site.item_selector)?,
            id: compile(&site.id_selector)?,
            title: compile_optional(&site.title_selector)?,
            link: compile_optional(&site.link_selector)?,
            next_page: compile_optional(&site.next_page_selector)?,
            total_pages: compile_optional(&site.total_pages_selector)?,
            list_fields: compile_fields(&site.list_fields)?,
            detail_fields: compile_fields(&site.detail_fields)?,
            required_fields: site.required_fields.clone(),
        })
    }

    /// Extracts listing rows and pagination hints from listing page `page`
    ///
    /// Rows without an id are skipped with a warning. Without a configured
    /// next-page selector, a page with at least one row is assumed to have a
    /// successor; the crawl then ends on the first empty page.
    ///
    /// # Returns
    ///
    /// * `Ok(ListingPage)` - The page was read; it may legitimately be empty
    /// * `Err(FetchError)` - Permanent: rows matched but none carried an id, or
    ///   the page has no rows while its own pagination says more pages follow
    pub fn parse_listing(&self, html: &str, page: u32) -> FetchResult<ListingPage> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut rows = 0;
        let mut items = Vec::new();
        for (position, row) in document.select(&self.item).enumerate() {
            rows += 1;
            let Some(id) = first_text(row, &self.id) else {
                warn!("Skipping listing row {} without an id", position);
                continue;
            };

            let mut item = ListingItem::new(id);
            item.title = self.title.as_ref().and_then(|s| first_text(row, s));
            item.detail_url = self.link.as_ref().and_then(|s| self.detail_link(row, s));
            for (name, selector) in &self.list_fields {
                if let Some(value) = first_text(row, selector) {
                    item.fields.insert(name.clone(), value);
                }
            }
            items.push(item);
        }

        if rows > 0 && items.is_empty() {
            return Err(FetchError::permanent(format!(
                "listing page {}: {} rows matched but none had an id",
                page, rows
            )));
        }

        let next_marker = self
            .next_page
            .as_ref()
            .map(|selector| root.select(selector).next().is_some());

        let total_pages = self
            .total_pages
            .as_ref()
            .and_then(|s| first_text(root, s))
            .and_then(|text| last_number(&text));

        if items.is_empty() {
            if next_marker == Some(true) {
                return Err(FetchError::permanent(format!(
                    "listing page {} has a next-page link but no rows",
                    page
                )));
            }
            if let Some(total) = total_pages.filter(|total| page < *total) {
                return Err(FetchError::permanent(format!(
                    "listing page {} of {} has no rows",
                    page, total
                )));
            }
        }

        Ok(ListingPage {
            has_next_page: next_marker.unwrap_or(!items.is_empty()),
            items,
            total_pages,
        })
    }

    /// Extracts the configured detail fields from a detail page
    ///
    /// # Returns
    ///
    /// * `Ok(fields)` - Field name to text for every field found
    /// * `Err(FetchError)` - Permanent: a required field is missing, or none of
    ///   the configured fields are present
    pub fn parse_detail(&self, item: &ListingItem, html: &str) -> FetchResult<BTreeMap<String, String>> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut fields = BTreeMap::new();
        for (name, selector) in &self.detail_fields {
            if let Some(value) = first_text(root, selector) {
                fields.insert(name.clone(), value);
            }
        }

        if let Some(missing) = self
            .required_fields
            .iter()
            .find(|name| !fields.contains_key(*name))
        {
            return Err(FetchError::permanent(format!(
                "detail page for {} is missing required field '{}'",
                item.id, missing
            )));
        }

        if fields.is_empty() && !self.detail_fields.is_empty() {
            return Err(FetchError::permanent(format!(
                "detail page for {} has none of the configured fields",
                item.id
            )));
        }

        Ok(fields)
    }

    /// Resolves a possibly relative link against the site base URL
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
            return None;
        }
        self.base_url.join(href).ok().map(String::from)
    }

    fn detail_link(&self, row: ElementRef<'_>, selector: &Selector) -> Option<String> {
        let anchor = row.select(selector).next()?;
        let href = anchor.value().attr("href")?;
        self.resolve(href)
    }
}
