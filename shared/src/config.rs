//! Values the host page hands to the panel at startup.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::capabilities::{HttpError, ValidatedUrl, MAX_TIMEOUT_MS};
use crate::model::{ComplaintId, Role};
use crate::status::{normalize, CanonicalStatus, StatusToken, DEFAULT_STATUS_COLOR};
use crate::{AppError, ErrorKind, DEFAULT_REQUEST_TIMEOUT};

pub const CSRF_COOKIE_NAME: &str = "csrftoken";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(&'static str),
    #[error("invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: HttpError,
    },
    #[error("request timeout must be between 1 and {max} ms, got {got}")]
    InvalidTimeout { got: u64, max: u64 },
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// Raw values as read from the page (data attributes, cookie string,
/// embedded JSON). Everything is optional here; [`PanelConfig::from_host`]
/// decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostValues {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default)]
    pub crew_chiefs_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub status_config: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug)]
pub struct PanelConfig {
    pub list_url: ValidatedUrl,
    pub update_base_url: ValidatedUrl,
    pub crew_chiefs_url: Option<ValidatedUrl>,
    pub bearer_token: SecretString,
    pub csrf_token: Option<SecretString>,
    pub role: Role,
    pub request_timeout: Duration,
    pub status_display: StatusDisplayConfig,
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_url(raw: &str, field: &'static str) -> Result<ValidatedUrl, ConfigError> {
    ValidatedUrl::new(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })
}

/// Page-relative endpoints are resolved against the list URL.
fn resolve_url(
    base: &ValidatedUrl,
    raw: &str,
    field: &'static str,
) -> Result<ValidatedUrl, ConfigError> {
    base.join(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}

impl PanelConfig {
    pub fn from_host(values: &HostValues) -> Result<Self, ConfigError> {
        let token = required(values.token.as_deref(), "token")?;
        let list_url = parse_url(required(values.api_url.as_deref(), "api_url")?, "api_url")?;
        let update_template = required(values.update_url.as_deref(), "update_url")?;
        let update_base_url =
            resolve_url(&list_url, &update_base_from_template(update_template), "update_url")?;

        let crew_chiefs_url = values
            .crew_chiefs_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| resolve_url(&list_url, u, "crew_chiefs_url"))
            .transpose()?;

        let request_timeout = match values.timeout_ms {
            None => DEFAULT_REQUEST_TIMEOUT,
            Some(ms) if ms == 0 || ms > MAX_TIMEOUT_MS => {
                return Err(ConfigError::InvalidTimeout {
                    got: ms,
                    max: MAX_TIMEOUT_MS,
                })
            }
            Some(ms) => Duration::from_millis(ms),
        };

        Ok(Self {
            list_url,
            update_base_url,
            crew_chiefs_url,
            bearer_token: SecretString::new(token.to_string()),
            csrf_token: values
                .cookie
                .as_deref()
                .and_then(csrf_from_cookie)
                .map(SecretString::new),
            role: Role::from_str(values.role.as_deref().unwrap_or_default()),
            request_timeout,
            status_display: StatusDisplayConfig::from_json(values.status_config.as_deref()),
        })
    }

    pub fn update_url(&self, id: ComplaintId) -> Result<ValidatedUrl, HttpError> {
        self.update_base_url.join(&format!("{id}/"))
    }

    pub(crate) fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer_token.expose_secret())
    }
}

/// The page renders the update URL for a placeholder id `0`; drop that last
/// segment so the real id can be appended.
#[must_use]
pub fn update_base_from_template(template: &str) -> String {
    let template = template.trim();
    let without_slash = template.strip_suffix('/').unwrap_or(template);
    let mut base = match without_slash.strip_suffix('0') {
        Some(rest) if rest.ends_with('/') => rest.to_string(),
        _ => template.to_string(),
    };
    if !base.ends_with('/') {
        base.push('/');
    }
    base
}

#[must_use]
pub fn csrf_from_cookie(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == CSRF_COOKIE_NAME)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDisplay {
    pub label: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
struct StatusDisplayEntry {
    value: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

/// Label and marker color per canonical status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDisplayConfig {
    entries: BTreeMap<CanonicalStatus, StatusDisplay>,
}

impl Default for StatusDisplayConfig {
    fn default() -> Self {
        let entries = CanonicalStatus::ALL
            .into_iter()
            .map(|status| {
                (
                    status,
                    StatusDisplay {
                        label: status.display_name().to_string(),
                        color: status.default_color().to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

impl StatusDisplayConfig {
    /// Parses the embedded `[{value, label, color}]` table over the defaults.
    /// A missing or malformed table leaves the defaults in place.
    #[must_use]
    pub fn from_json(raw: Option<&str>) -> Self {
        let mut config = Self::default();
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return config;
        };

        let entries: Vec<StatusDisplayEntry> = match serde_json::from_str(raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "status display config is malformed, using defaults");
                return config;
            }
        };

        for entry in entries {
            let Some(status) = normalize(&entry.value).canonical() else {
                warn!(value = %entry.value, "status display config names an unknown status");
                continue;
            };
            let Some(display) = config.entries.get_mut(&status) else {
                continue;
            };
            if let Some(label) = entry.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) {
                display.label = label;
            }
            match entry.color.map(|c| c.trim().to_string()) {
                Some(color) if is_hex_color(&color) => display.color = color,
                Some(color) if !color.is_empty() => {
                    warn!(%status, %color, "ignoring invalid status color");
                }
                _ => {}
            }
        }
        config
    }

    #[must_use]
    pub fn label(&self, status: CanonicalStatus) -> &str {
        self.entries
            .get(&status)
            .map_or(status.display_name(), |d| d.label.as_str())
    }

    #[must_use]
    pub fn color(&self, status: CanonicalStatus) -> &str {
        self.entries
            .get(&status)
            .map_or(status.default_color(), |d| d.color.as_str())
    }

    #[must_use]
    pub fn color_for(&self, token: &StatusToken) -> &str {
        token
            .canonical()
            .map_or(DEFAULT_STATUS_COLOR, |status| self.color(status))
    }
}
