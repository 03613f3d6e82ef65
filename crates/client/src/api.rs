use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use thiserror::Error;

use crate::cursor::PageCursor;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bearer token is not usable as a header value")]
    InvalidToken,
    #[error("could not initialize HTTP client: {0}")]
    ClientInit(reqwest::Error),
    #[error("ping request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ping rejected with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Authenticated handle on the remote API.
///
/// Holds the base URL and the pre-built bearer header; both are supplied
/// explicitly at construction (the test/mock environment is just a
/// different base URL, never ambient state read mid-run). Cloning is cheap
/// since the underlying `reqwest::Client` is a shared pool, so each
/// concurrent sync task carries its own copy.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: HeaderValue,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AuthError> {
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AuthError::InvalidToken)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(AuthError::ClientInit)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Probe `{base}/util/ping` with the configured token.
    ///
    /// Anything other than a 2xx means the token (or the base URL) is bad
    /// and the whole sync run should stop before touching any listing.
    pub async fn ping(&self) -> Result<(), AuthError> {
        let url = format!("{}/util/ping", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.auth.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(%url, "ping ok");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Rejected { status, body })
    }

    /// Cursor over the full account listing, unfiltered.
    pub fn accounts(&self) -> PageCursor {
        PageCursor::new(
            self.http.clone(),
            self.auth.clone(),
            format!("{}/accounts", self.base_url),
            Vec::new(),
        )
    }

    /// Cursor over one account's transactions created on or after `since`.
    pub fn transactions(&self, account_id: &str, since: &str) -> PageCursor {
        PageCursor::new(
            self.http.clone(),
            self.auth.clone(),
            format!("{}/accounts/{}/transactions", self.base_url, account_id),
            vec![("filter[since]".to_string(), since.to_string())],
        )
    }
}
