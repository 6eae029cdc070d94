use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, COOKIE, HeaderMap, HeaderName, HeaderValue, PRAGMA,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};

use crate::config::{self, Config};
use crate::error::PageError;
use crate::types::PageNumber;

/// Fetches the raw markup of one listing page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, page: PageNumber) -> Result<String, PageError>;
}

// -------------------------
// HTTP fetcher
// -------------------------

pub struct HttpPageFetcher {
    client: reqwest::Client,
    listing_url: String,
}

impl HttpPageFetcher {
    /// One client for the whole run: session cookie and browser headers are
    /// baked in, redirects are never followed.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(session_headers(config.cookie.expose())?)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()
            .context("building page client")?;
        Ok(Self {
            client,
            listing_url: config.listing_url.clone(),
        })
    }

    fn page_url(&self, page: PageNumber) -> String {
        config::page_url(&self.listing_url, page)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, page: PageNumber) -> Result<String, PageError> {
        let url = self.page_url(page);
        let rsp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PageError::FetchFailed {
                page,
                reason: transport_reason(&e),
            })?;

        let status = rsp.status();
        tracing::debug!(page, %status, url = %url, "[fetch] response");
        classify(page, status)?;

        rsp.text().await.map_err(|e| PageError::FetchFailed {
            page,
            reason: format!("reading body: {e}"),
        })
    }
}

/// Maps a response status onto the page outcome: 200 is the only success,
/// any redirect means the session was bounced to the login screen.
pub fn classify(page: PageNumber, status: StatusCode) -> Result<(), PageError> {
    if status == StatusCode::OK {
        Ok(())
    } else if status.is_redirection() {
        Err(PageError::StaleCredentials {
            page,
            status: status.as_u16(),
        })
    } else {
        Err(PageError::FetchFailed {
            page,
            reason: format!("unexpected status {status}"),
        })
    }
}

fn transport_reason(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connect error: {e}")
    } else {
        e.to_string()
    }
}

// -------------------------
// Header helpers
// -------------------------

/// Normalises a `k=v; k2=v2` cookie string, dropping fragments without `=`.
pub fn normalize_cookie(raw: &str) -> String {
    raw.split(';')
        .filter_map(|item| {
            let (k, v) = item.trim().split_once('=')?;
            let k = k.trim();
            (!k.is_empty()).then(|| format!("{k}={}", v.trim()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn session_headers(raw_cookie: &str) -> Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(
        USER_AGENT,
        HeaderValue::from_str(&random_desktop_ua()).context("user agent header")?,
    );
    h.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    h.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,tr;q=0.8"),
    );
    h.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    h.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );

    let cookie = normalize_cookie(raw_cookie);
    if cookie.is_empty() {
        tracing::warn!("no session cookie configured, every page will likely redirect");
    } else {
        let mut value = HeaderValue::from_str(&cookie)
            .context("session cookie is not a valid header value")?;
        value.set_sensitive(true);
        h.insert(COOKIE, value);
    }
    Ok(h)
}

fn random_desktop_ua() -> String {
    const UAS: &[&str] = &[
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    ];
    let i = rng().random_range(0..UAS.len());
    UAS[i].to_string()
}
