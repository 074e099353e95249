#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod crew;
pub mod event;
pub mod filters;
pub mod model;
pub mod mutation;
pub mod policy;
pub mod status;
pub mod store;
pub mod sync;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use app::Panel;
pub use capabilities::{HttpError, HttpRequest, HttpResponse, HttpResult, HttpTransport};
pub use config::{ConfigError, PanelConfig, StatusDisplayConfig};
pub use event::Event;
pub use filters::{FilterSet, QuickFilter};
pub use model::{Complaint, ComplaintId, ComplaintUpdate, CrewChief, Role, UserId};
pub use mutation::ProposedChanges;
pub use status::{normalize, CanonicalStatus, StatusToken};
pub use store::{ComplaintStore, StoreError};
pub use view::ViewModel;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_PAGES: usize = 200;
pub const NOTICE_DURATION_MS: u64 = 6000;
pub const DESCRIPTION_PREVIEW_LENGTH: usize = 80;

pub const LOAD_ERROR_MESSAGE: &str = "No se pudieron cargar las denuncias. Intenta nuevamente.";
pub const SAVE_ERROR_MESSAGE: &str = "No se pudieron guardar los cambios";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport failure, or a non-2xx while listing.
    Network,
    /// A local precondition failed; nothing was sent.
    Validation,
    /// The server refused a mutation.
    RemoteRejected,
    Parse,
    NotFound,
    /// A submission for the same complaint is still pending.
    Busy,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::RemoteRejected => "REMOTE_REJECTED",
            Self::Parse => "PARSE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Busy => "BUSY",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Busy => ErrorSeverity::Transient,
            Self::Validation | Self::RemoteRejected | Self::Parse | Self::NotFound => {
                ErrorSeverity::Permanent
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "No se pudo conectar con el servidor. Revisa tu conexión e intenta nuevamente."
                    .into()
            }
            ErrorKind::Validation | ErrorKind::RemoteRejected => self.message.clone(),
            ErrorKind::Parse => "La respuesta del servidor no tiene el formato esperado.".into(),
            ErrorKind::NotFound => {
                "La denuncia ya no está disponible. Actualiza el listado.".into()
            }
            ErrorKind::Busy => "Ya se están guardando cambios para esta denuncia.".into(),
        }
    }

}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let error = match &e {
            // Reads only; mutations classify their own refusals.
            HttpError::Status { status, .. } => AppError::new(ErrorKind::Network, e.to_string())
                .with_context("http_status", status.to_string()),
            HttpError::Unreachable { .. } | HttpError::TimedOut { .. } => {
                AppError::new(ErrorKind::Network, e.to_string())
            }
            HttpError::Undecodable { .. } | HttpError::Unencodable { .. } => {
                AppError::new(ErrorKind::Parse, e.to_string())
            }
            HttpError::InvalidUrl { .. }
            | HttpError::InvalidHeader { .. }
            | HttpError::Malformed { .. } => AppError::new(ErrorKind::Validation, e.to_string()),
        };
        match e.request_id() {
            Some(request_id) => error.with_context("request_id", request_id),
            None => error,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// The dismissable error banner shown above the lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl Notice {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(message, get_current_time_ms())
    }

    #[must_use]
    pub fn at(message: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            message: message.into(),
            created_at_ms,
            duration_ms: NOTICE_DURATION_MS,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}
