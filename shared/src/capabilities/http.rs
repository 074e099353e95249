//! Requests the panel hands to the shell and the answers it gets back.
//!
//! Everything here is plain data. A [`HttpRequest`] is checked while it is
//! built, so the transport never sees a URL with credentials in it or a
//! header that could split the request line.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

const URL_LIMIT: usize = 2048;
const SHOWN_URL_CHARS: usize = 96;
const HEADER_LIMIT: usize = 32;
const HEADER_VALUE_LIMIT: usize = 4096;
// Update bodies are a handful of fields; anything near this is a bug.
const BODY_LIMIT: usize = 64 * 1024;

/// Headers the platform client sets itself.
const RESERVED_HEADERS: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("bad URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("bad header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request rejected before sending: {reason}")]
    Malformed { reason: String },

    #[error("could not encode request body: {message}")]
    Unencodable { message: String },

    #[error("could not reach {host}: {message}")]
    Unreachable { host: String, message: String },

    #[error("no answer within {after_ms}ms")]
    TimedOut { after_ms: u64, request_id: String },

    #[error("server answered {status}")]
    Status { status: u16, request_id: String },

    #[error("unreadable answer: {reason}")]
    Undecodable { reason: String, request_id: String },
}

impl HttpError {
    /// Set for failures that happened after the request left the core.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::TimedOut { request_id, .. }
            | Self::Status { request_id, .. }
            | Self::Undecodable { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    fn url(url: &str, reason: impl Into<String>) -> Self {
        let shown = if url.chars().count() > SHOWN_URL_CHARS {
            let head: String = url.chars().take(SHOWN_URL_CHARS).collect();
            format!("{head}...")
        } else {
            url.to_string()
        };
        Self::InvalidUrl {
            url: shown,
            reason: reason.into(),
        }
    }

    fn header(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.chars().take(64).collect(),
            reason: reason.into(),
        }
    }
}

/// An absolute `http`/`https` URL with a host and no userinfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, HttpError> {
        let raw = url.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HttpError::url(&raw, "empty"));
        }
        if trimmed.len() > URL_LIMIT {
            return Err(HttpError::url(trimmed, format!("longer than {URL_LIMIT} bytes")));
        }
        let parsed = Url::parse(trimmed).map_err(|e| HttpError::url(trimmed, e.to_string()))?;
        Self::checked(parsed)
    }

    fn checked(parsed: Url) -> Result<Self, HttpError> {
        if !matches!(parsed.scheme(), "http" | "https") {
            let reason = format!("scheme '{}' is not http(s)", parsed.scheme());
            return Err(HttpError::url(parsed.as_str(), reason));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(HttpError::url(parsed.as_str(), "embedded credentials"));
        }
        let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
            return Err(HttpError::url(parsed.as_str(), "no host"));
        };
        Ok(Self {
            url: parsed.into(),
            host,
        })
    }

    fn parsed(&self) -> Result<Url, HttpError> {
        Url::parse(&self.url).map_err(|e| HttpError::url(&self.url, e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolves `reference` (absolute or relative) against this URL.
    pub fn join(&self, reference: &str) -> Result<Self, HttpError> {
        let joined = self
            .parsed()?
            .join(reference.trim())
            .map_err(|e| HttpError::url(reference, e.to_string()))?;
        Self::checked(joined)
    }

    /// Replaces the query string with `pairs`, in order. No pairs, no `?`.
    pub fn with_query<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, HttpError> {
        let mut parsed = self.parsed()?;
        let pairs: Vec<_> = pairs.into_iter().collect();
        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
        }
        Self::checked(parsed)
    }

    /// Decoded query pairs, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.parsed()
            .map(|u| u.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
            .unwrap_or_default()
    }
}

/// Case-insensitive header list; setting a name again replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpHeaders(Vec<(String, String)>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        let (name, value) = (name.into(), value.into());
        check_header(&name, &value)?;

        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        if self.0.len() >= HEADER_LIMIT {
            return Err(HttpError::header(&name, format!("more than {HEADER_LIMIT} headers")));
        }
        self.0.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find_map(|(n, v)| n.eq_ignore_ascii_case(name).then_some(v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn check_header(name: &str, value: &str) -> Result<(), HttpError> {
    if name.is_empty() {
        return Err(HttpError::header(name, "empty name"));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
        return Err(HttpError::header(name, format!("'{bad}' not allowed in a name")));
    }
    if RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r)) {
        return Err(HttpError::header(name, "set by the platform client"));
    }
    if value.len() > HEADER_VALUE_LIMIT {
        return Err(HttpError::header(name, format!("value longer than {HEADER_VALUE_LIMIT} bytes")));
    }
    if value.contains(['\r', '\n', '\0']) {
        return Err(HttpError::header(name, "control character in value"));
    }
    Ok(())
}

/// The panel only reads listings and patches complaints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Patch => "PATCH",
        }
    }
}

/// A request the shell must execute on the core's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    method: HttpMethod,
    url: ValidatedUrl,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
    timeout_ms: u64,
    request_id: String,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: ValidatedUrl) -> Self {
        Self {
            method,
            url,
            headers: HttpHeaders::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn get(url: ValidatedUrl) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn patch(url: ValidatedUrl) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, HttpError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    /// Serializes `value` as the body and sets the content type. Reads
    /// carry no body.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, HttpError> {
        if self.method == HttpMethod::Get {
            return Err(HttpError::Malformed {
                reason: "a GET carries no body".into(),
            });
        }
        let encoded = serde_json::to_vec(value).map_err(|e| HttpError::Unencodable {
            message: e.to_string(),
        })?;
        if encoded.len() > BODY_LIMIT {
            return Err(HttpError::Malformed {
                reason: format!("body of {} bytes is over {BODY_LIMIT}", encoded.len()),
            });
        }
        self.headers.insert("Content-Type", "application/json")?;
        self.body = Some(encoded);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, HttpError> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if !(1..=MAX_TIMEOUT_MS).contains(&ms) {
            return Err(HttpError::Malformed {
                reason: format!("timeout of {ms}ms outside 1..={MAX_TIMEOUT_MS}"),
            });
        }
        self.timeout_ms = ms;
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Whatever the server said, whatever the status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: HttpHeaders,
    body: Vec<u8>,
    request_id: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HttpHeaders, body: Vec<u8>, request_id: String) -> Self {
        Self {
            status,
            headers,
            body,
            request_id,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True when there is nothing but whitespace to parse.
    pub fn is_blank(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Undecodable {
            reason: e.to_string(),
            request_id: self.request_id.clone(),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// Executes requests for the core. The shell provides the implementation
/// (browser `fetch`, a native client, or a scripted fake in tests).
///
/// Implementations must return `Ok` for every response the server produced,
/// whatever its status; `Err` is reserved for transport failures.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResult;
}

#[async_trait::async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        (**self).execute(request).await
    }
}
