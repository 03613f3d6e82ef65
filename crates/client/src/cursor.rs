use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("could not decode page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One page of a listing response.
///
/// Records stay as raw JSON values here so a malformed record can fail
/// parsing on its own without taking the rest of the page with it.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageLinks {
    pub prev: Option<String>,
    pub next: Option<String>,
}

enum PageRequest {
    /// The initial request: endpoint plus caller-supplied filters.
    First {
        url: String,
        query: Vec<(String, String)>,
    },
    /// A follow-up request using the server's `links.next` URL verbatim;
    /// it already encodes the filters, so no query is re-applied.
    Follow { url: String },
}

/// A stateful pointer to "the next page to fetch" of one paginated listing.
///
/// Each [`next_page`](PageCursor::next_page) call performs exactly one
/// authenticated GET. The sequence ends when a page arrives with a null
/// `links.next`, or immediately on the first fetch failure: an errored
/// cursor yields `Ok(None)` from then on, and pages already handed to the
/// caller are never rolled back.
pub struct PageCursor {
    http: reqwest::Client,
    auth: HeaderValue,
    next: Option<PageRequest>,
}

impl PageCursor {
    pub(crate) fn new(
        http: reqwest::Client,
        auth: HeaderValue,
        url: String,
        query: Vec<(String, String)>,
    ) -> Self {
        Self {
            http,
            auth,
            next: Some(PageRequest::First { url, query }),
        }
    }

    /// Fetch and decode the next page, or `Ok(None)` once pagination is done.
    pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
        let Some(request) = self.next.take() else {
            return Ok(None);
        };

        let (url, builder) = match request {
            PageRequest::First { url, query } => {
                let builder = self.http.get(&url).query(&query);
                (url, builder)
            }
            PageRequest::Follow { url } => {
                let builder = self.http.get(&url);
                (url, builder)
            }
        };

        let response = builder
            .header(AUTHORIZATION, self.auth.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(FetchError::Status { url, status, body });
        }

        let page: Page =
            serde_json::from_str(&body).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;

        tracing::debug!(%url, records = page.data.len(), "fetched page");

        if let Some(next_url) = &page.links.next {
            self.next = Some(PageRequest::Follow {
                url: next_url.clone(),
            });
        }

        Ok(Some(page))
    }
}
