//! Reading the complaint listing.
//!
//! Every page is fetched before anything reaches the store, so a refresh
//! either yields the complete listing or an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{HttpError, HttpRequest, HttpResponse, HttpTransport, ValidatedUrl};
use crate::config::PanelConfig;
use crate::filters::FilterSet;
use crate::model::Complaint;
use crate::status::CanonicalStatus;
use crate::{AppError, AppResult, ErrorKind, MAX_PAGES};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Paginated {
        results: Vec<Value>,
        #[serde(default)]
        next: Option<String>,
    },
    Bare(Vec<Value>),
}

#[derive(Debug, Default)]
pub struct Page {
    pub complaints: Vec<Complaint>,
    /// Records that could not be read as complaints.
    pub skipped: usize,
    pub next: Option<String>,
}

pub fn parse_page(response: &HttpResponse) -> AppResult<Page> {
    let body: ListBody = response.json().map_err(|e| {
        AppError::new(ErrorKind::Parse, "unexpected listing format")
            .with_internal(e.to_string())
            .with_context("request_id", response.request_id())
    })?;

    let (records, next) = match body {
        ListBody::Paginated { results, next } => (results, next),
        ListBody::Bare(records) => (records, None),
    };

    let mut page = Page {
        complaints: Vec::with_capacity(records.len()),
        skipped: 0,
        next: next.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    };
    for record in records {
        match serde_json::from_value::<Complaint>(record) {
            Ok(complaint) => page.complaints.push(complaint),
            Err(e) => {
                debug!(error = %e, "skipping unreadable complaint record");
                page.skipped += 1;
            }
        }
    }
    Ok(page)
}

/// The full listing behind one refresh.
#[derive(Debug, Default)]
pub struct Listing {
    pub complaints: Vec<Complaint>,
    pub pages: usize,
    pub skipped: usize,
}

fn list_request(config: &PanelConfig, url: ValidatedUrl) -> AppResult<HttpRequest> {
    Ok(HttpRequest::get(url)
        .with_header("Authorization", config.authorization())?
        .with_header("Accept", "application/json")?
        .with_timeout(config.request_timeout)?)
}

#[instrument(skip(transport, config, filters))]
pub async fn fetch_listing<T: HttpTransport + ?Sized>(
    transport: &T,
    config: &PanelConfig,
    filters: &FilterSet,
) -> AppResult<Listing> {
    let query = filters.query_pairs();
    let mut url = config
        .list_url
        .with_query(query.iter().map(|(k, v)| (*k, v.as_str())))?;
    let mut seen = HashSet::new();
    let mut listing = Listing::default();

    while listing.pages < MAX_PAGES {
        if !seen.insert(url.as_str().to_string()) {
            warn!(url = url.as_str(), "pagination points back to a visited page");
            return Err(AppError::new(ErrorKind::Network, "pagination loop detected")
                .with_context("url", url.as_str()));
        }

        let response = transport.execute(list_request(config, url.clone())?).await?;
        if !response.is_success() {
            warn!(status = response.status(), page = listing.pages + 1, "listing page failed");
            return Err(HttpError::Status {
                status: response.status(),
                request_id: response.request_id().to_string(),
            }
            .into());
        }

        let page = parse_page(&response)?;
        listing.pages += 1;
        listing.skipped += page.skipped;
        listing.complaints.extend(page.complaints);

        let Some(next) = page.next else {
            info!(
                pages = listing.pages,
                complaints = listing.complaints.len(),
                skipped = listing.skipped,
                "listing fetched"
            );
            return Ok(listing);
        };
        url = url.join(&next).map_err(|e| {
            AppError::new(ErrorKind::Parse, "invalid next page link").with_internal(e.to_string())
        })?;
    }

    warn!(max = MAX_PAGES, "listing exceeded the page limit");
    Err(AppError::new(ErrorKind::Network, "too many pages")
        .with_context("max_pages", MAX_PAGES.to_string()))
}

/// Orders refreshes so an older one never overrides a newer one that has
/// already finished, whether that one succeeded or failed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Generations {
    started: u64,
    settled: u64,
}

impl Generations {
    pub fn begin(&mut self) -> u64 {
        self.started += 1;
        self.started
    }

    /// Whether a refresh started as `generation` may still touch the panel.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        generation > self.settled
    }

    /// Records that `generation` finished. Returns `false` when a newer
    /// refresh already settled, in which case its outcome must be dropped.
    pub fn settle(&mut self, generation: u64) -> bool {
        if self.is_current(generation) {
            self.settled = generation;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub total: usize,
    pub pages: usize,
    pub skipped: usize,
    pub counts: Vec<(CanonicalStatus, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Applied(RefreshSummary),
    /// A newer refresh already landed; this result was dropped.
    Superseded,
}
