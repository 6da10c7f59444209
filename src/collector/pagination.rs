//! Page walking for list endpoints
//!
//! A [`PageCursor`] requests `page = 1, 2, ...` and stops after the page the
//! pager reports as last, on the first empty page, or on a later page the
//! API answers with `success: false`. Includes safety mechanisms:
//! - Maximum page limit to prevent infinite loops
//! - Empty response detection

use crate::client::{ApiClient, ApiError, Endpoint};
use crate::config::MAX_PAGES;
use serde_json::Value;
use tracing::{debug, warn};

/// One page of records
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    /// Records on the page
    pub records: Vec<Value>,
    /// Whether the pager reported this as the last page
    pub is_last: bool,
}

/// Why a page could not be read
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// Request failed
    #[error("page {page}: {source}")]
    Request {
        /// Page requested
        page: u32,
        /// Client failure
        #[source]
        source: ApiError,
    },

    /// Envelope reported `success: false` on the first page
    #[error("page {page}: API reported failure")]
    Unsuccessful {
        /// Page requested
        page: u32,
    },

    /// Pager never reached its last page
    #[error("max pages ({0}) exceeded, possible infinite loop")]
    TooManyPages(u32),
}

impl PageError {
    /// Page the failure happened on
    pub fn page(&self) -> u32 {
        match self {
            PageError::Request { page, .. } | PageError::Unsuccessful { page } => *page,
            PageError::TooManyPages(max) => *max,
        }
    }

    /// Whether the underlying request failure must abort the stage
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::Request { source, .. } if source.is_fatal())
    }
}

/// Cursor over the pages of one list endpoint
#[derive(Debug, Clone)]
pub struct PageCursor {
    endpoint: Endpoint,
    params: Vec<(&'static str, String)>,
    next_page: u32,
    finished: bool,
    requests: u64,
}

impl PageCursor {
    /// Start at page 1; `page` is appended to `params` per request
    pub fn new(endpoint: Endpoint, params: Vec<(&'static str, String)>) -> Self {
        Self {
            endpoint,
            params,
            next_page: 1,
            finished: false,
            requests: 0,
        }
    }

    /// Requests issued so far (one per page, retries not included)
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Fetch the next page, `Ok(None)` once exhausted.
    ///
    /// `success: false` is an error on page 1 and the end of the listing on
    /// any later page.
    pub async fn next(&mut self, client: &ApiClient) -> Result<Option<Page>, PageError> {
        if self.finished {
            return Ok(None);
        }

        let page = self.next_page;
        if page > MAX_PAGES {
            self.finished = true;
            return Err(PageError::TooManyPages(MAX_PAGES));
        }

        let mut params = self.params.clone();
        params.push(("page", page.to_string()));

        self.requests += 1;
        let response = client
            .request(self.endpoint, &params)
            .await
            .map_err(|source| PageError::Request { page, source })?;

        if !response.success {
            if page == 1 {
                return Err(PageError::Unsuccessful { page });
            }
            warn!(endpoint = %self.endpoint, page = page, "API reported failure, treating as last page");
            self.finished = true;
            return Ok(None);
        }

        let records = response.records();
        if records.is_empty() {
            debug!(endpoint = %self.endpoint, page = page, "Empty page, pagination complete");
            self.finished = true;
            return Ok(None);
        }

        let is_last = response.is_last_page(page);
        if is_last {
            self.finished = true;
        } else {
            self.next_page += 1;
        }

        debug!(
            endpoint = %self.endpoint,
            page = page,
            records = records.len(),
            is_last = is_last,
            "Fetched page"
        );

        Ok(Some(Page {
            number: page,
            records,
            is_last,
        }))
    }
}
