//! Side effects the core asks the shell to perform.
//!
//! The panel only needs HTTP. The shell implements [`HttpTransport`] with
//! whatever client the platform offers and hands it to [`crate::Panel`].

mod http;

pub use self::http::{
    HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    HttpTransport, ValidatedUrl, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};
