//! The deposit endpoint seam and its reqwest adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use reqwest::header::CONTENT_TYPE;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::codec::EncodedChunk;
use crate::config::Credentials;
use crate::status::StatusEvent;
use crate::types::StatusHandle;

/// Remote ids assigned to entities a chunk created, keyed by local id.
pub type CreatedIds = FxHashMap<String, String>;

/// Typed result of an accepted chunk deposit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositReceipt {
    pub status_handle: StatusHandle,
}

/// Failures talking to the deposit endpoint.
#[derive(Debug, Error, Diagnostic)]
pub enum DepositError {
    #[error("deposit endpoint rejected the chunk: HTTP {status}")]
    #[diagnostic(
        code(packferry::deposit::rejected),
        help("fix the cause and resume the submission; completed chunks are not resubmitted")
    )]
    Rejected { status: u16, body: String },

    #[error("transport failure talking to the deposit endpoint")]
    #[diagnostic(code(packferry::deposit::transport))]
    Transport(#[from] reqwest::Error),

    #[error("accepted response carried no status href")]
    #[diagnostic(
        code(packferry::deposit::missing_href),
        help("a 2xx deposit response must carry an href=\"...\" token naming the status URL")
    )]
    MissingHref { body: String },

    #[error("status href is not a valid URL: {href}")]
    #[diagnostic(code(packferry::deposit::bad_href))]
    BadHref {
        href: String,
        #[source]
        source: url::ParseError,
    },

    #[error("deposit client failure: {message}")]
    #[diagnostic(code(packferry::deposit::client))]
    Other { message: String },
}

impl DepositError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// The remote deposit/status endpoints, as the pipeline sees them.
///
/// One implementation per deployment: [`HttpDepositClient`] for real
/// endpoints, scripted doubles in tests.
#[async_trait]
pub trait DepositClient: Send + Sync {
    /// POST one encoded chunk. Any 2xx response yields a receipt carrying
    /// the status handle; anything else is an error. No retry happens here.
    async fn submit_chunk(&self, body: EncodedChunk) -> Result<DepositReceipt, DepositError>;

    /// Events for `handle` with timestamps strictly after `since`, in no
    /// particular order.
    async fn events_since(
        &self,
        handle: &StatusHandle,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusEvent>, DepositError>;

    /// The remote ids assigned to entities the chunk behind `handle` created.
    async fn created_ids(&self, handle: &StatusHandle) -> Result<CreatedIds, DepositError>;
}

#[derive(Deserialize)]
struct EventsDocument {
    events: Vec<StatusEvent>,
}

#[derive(Deserialize)]
struct CreatedIdsDocument {
    ids: CreatedIds,
}

/// Reqwest-backed adapter for HTTP deposit endpoints.
///
/// Sends HTTP basic credentials on every call and declares the chunk's
/// packaging via headers on submit. Extracting the status URL from the
/// response body's `href="..."` token lives here, not in the pipeline.
pub struct HttpDepositClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
}

impl HttpDepositClient {
    pub fn new(endpoint: Url, credentials: Credentials) -> Result<Self, DepositError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(
            self.credentials.username(),
            Some(self.credentials.password()),
        )
    }
}

#[async_trait]
impl DepositClient for HttpDepositClient {
    async fn submit_chunk(&self, body: EncodedChunk) -> Result<DepositReceipt, DepositError> {
        debug!(endpoint = %self.endpoint, bytes = body.bytes.len(), "submitting chunk");
        let request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, &body.content_type)
            .header("X-Packaging", &body.packaging)
            .header("X-Verbose", "true")
            .body(body.bytes);
        let response = self.auth(request).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DepositError::Rejected {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }
        let href = extract_href(&text).ok_or_else(|| DepositError::MissingHref {
            body: truncate(&text),
        })?;
        let url = Url::parse(&href).map_err(|source| DepositError::BadHref { href, source })?;
        debug!(handle = %url, "chunk accepted");
        Ok(DepositReceipt {
            status_handle: StatusHandle::new(url),
        })
    }

    async fn events_since(
        &self,
        handle: &StatusHandle,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusEvent>, DepositError> {
        let mut url = handle.as_url().clone();
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339());
        }
        let response = self.auth(self.http.get(url)).send().await?.error_for_status()?;
        let document: EventsDocument = response.json().await?;
        Ok(document.events)
    }

    async fn created_ids(&self, handle: &StatusHandle) -> Result<CreatedIds, DepositError> {
        let url = handle.content_url();
        let response = self.auth(self.http.get(url)).send().await?.error_for_status()?;
        let document: CreatedIdsDocument = response.json().await?;
        Ok(document.ids)
    }
}

/// First `href="..."` value in a response body.
fn extract_href(body: &str) -> Option<String> {
    let start = body.find("href=\"")? + "href=\"".len();
    let rest = &body[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Bodies quoted in errors are capped so diagnostics stay readable.
fn truncate(body: &str) -> String {
    const CAP: usize = 512;
    if body.len() <= CAP {
        body.to_string()
    } else {
        let mut cut = CAP;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    }
}
