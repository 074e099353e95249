//! Sending one complaint update to the API.
//!
//! Validation happens before anything is sent; the server's answer is
//! reduced to either the fields it stored or a single readable message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::capabilities::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::config::PanelConfig;
use crate::model::{Complaint, ComplaintId, ComplaintUpdate, CrewChief, CrewChiefRef, CrewReport, Role, UserId};
use crate::policy::{can_edit, precondition, PolicyViolation, TransitionContext};
use crate::status::CanonicalStatus;
use crate::{AppError, AppResult, ErrorKind, SAVE_ERROR_MESSAGE};

/// What the user asked to change in the popup form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChanges {
    #[serde(default)]
    pub status: Option<CanonicalStatus>,
    #[serde(default)]
    pub crew_label: Option<String>,
    #[serde(default)]
    pub crew_chief_id: Option<UserId>,
    #[serde(default)]
    pub report_text: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl ProposedChanges {
    #[must_use]
    pub fn status(status: CanonicalStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Moves a pending complaint into management under `chief`.
    #[must_use]
    pub fn assign(chief: UserId) -> Self {
        Self {
            status: Some(CanonicalStatus::InManagement),
            crew_chief_id: Some(chief),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            status: Some(CanonicalStatus::Rejected),
            rejection_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.crew_label.is_none()
            && self.crew_chief_id.is_none()
            && non_blank(self.report_text.as_ref()).is_none()
            && non_blank(self.rejection_reason.as_ref()).is_none()
    }

    fn patch_body(&self) -> PatchBody<'_> {
        PatchBody {
            status: self.status.map(CanonicalStatus::wire_value),
            crew_label: self.crew_label.as_deref().map(str::trim),
            crew_chief_id: self.crew_chief_id,
            report: non_blank(self.report_text.as_ref()),
            rejection_reason: non_blank(self.rejection_reason.as_ref()),
        }
    }

    /// The update the server is expected to have stored, used wherever its
    /// response does not say otherwise.
    #[must_use]
    pub fn expected_update(&self, chief: Option<&CrewChief>) -> ComplaintUpdate {
        ComplaintUpdate {
            raw_status: self.status.map(|s| s.wire_value().to_string()),
            status_display: None,
            crew_label: self.crew_label.as_deref().map(|l| l.trim().to_string()),
            crew_chief: self.crew_chief_id.map(|id| match chief {
                Some(chief) if chief.id == id => CrewChiefRef::Full(chief.clone()),
                _ => CrewChiefRef::Id(id),
            }),
            crew_report: non_blank(self.report_text.as_ref())
                .map(|text| CrewReport::Text(text.to_string())),
            rejection_reason: non_blank(self.rejection_reason.as_ref()).map(str::to_string),
            zone: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct PatchBody<'a> {
    #[serde(rename = "estado", skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(rename = "cuadrilla_asignada", skip_serializing_if = "Option::is_none")]
    crew_label: Option<&'a str>,
    #[serde(rename = "jefe_cuadrilla_asignado_id", skip_serializing_if = "Option::is_none")]
    crew_chief_id: Option<UserId>,
    #[serde(rename = "reporte_cuadrilla", skip_serializing_if = "Option::is_none")]
    report: Option<&'a str>,
    #[serde(rename = "motivo_rechazo", skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<&'a str>,
}

/// Local checks run before a request is built.
pub fn validate(
    role: &Role,
    complaint: &Complaint,
    changes: &ProposedChanges,
) -> Result<(), PolicyViolation> {
    if !can_edit(role) {
        return Err(PolicyViolation::ReadOnlyRole(role.to_string()));
    }
    if changes.is_empty() {
        return Err(PolicyViolation::NoChanges);
    }
    match changes.status {
        Some(to) => precondition(
            role,
            &complaint.status(),
            to,
            TransitionContext { complaint, changes },
        ),
        None => Ok(()),
    }
}

pub fn build_request(
    config: &PanelConfig,
    id: ComplaintId,
    changes: &ProposedChanges,
) -> Result<HttpRequest, HttpError> {
    let mut request = HttpRequest::patch(config.update_url(id)?)
        .with_header("Authorization", config.authorization())?
        .with_header("Accept", "application/json")?
        .with_json(&changes.patch_body())?
        .with_timeout(config.request_timeout)?;

    if let Some(csrf) = &config.csrf_token {
        use secrecy::ExposeSecret;
        request = request.with_header("X-CSRFToken", csrf.expose_secret().as_str())?;
    }
    Ok(request)
}

/// Pulls a readable message out of an error body: `detail`, then `error`,
/// then every field error joined by a space. Anything unreadable yields the
/// generic message.
#[must_use]
pub fn extract_error_message(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return SAVE_ERROR_MESSAGE.to_string();
    };

    let preferred = match &value {
        Value::Object(map) => ["detail", "error"]
            .iter()
            .filter_map(|key| map.get(*key))
            .map(joined_messages)
            .find(|message| !message.is_empty()),
        _ => None,
    };

    preferred
        .or_else(|| Some(joined_messages(&value)).filter(|m| !m.is_empty()))
        .unwrap_or_else(|| SAVE_ERROR_MESSAGE.to_string())
}

fn joined_messages(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_messages(value, &mut parts);
    parts.join(" ")
}

fn collect_messages<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim()),
        Value::Array(items) => items.iter().for_each(|v| collect_messages(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_messages(v, out)),
        _ => {}
    }
}

/// Turns the server's answer into the fields it reports as stored. A 2xx
/// without a usable body is still a success.
pub fn read_response(response: &HttpResponse) -> AppResult<Option<ComplaintUpdate>> {
    if !response.is_success() {
        let message = extract_error_message(response.body());
        return Err(AppError::new(ErrorKind::RemoteRejected, message)
            .with_context("http_status", response.status().to_string())
            .with_context("request_id", response.request_id()));
    }

    if response.is_blank() {
        return Ok(None);
    }

    match response.json::<ComplaintUpdate>() {
        Ok(update) if update.is_empty() => Ok(None),
        Ok(update) => Ok(Some(update)),
        Err(e) => {
            debug!(error = %e, "update response carried no usable fields");
            Ok(None)
        }
    }
}

#[instrument(skip(transport, config, changes), fields(complaint_id = %id))]
pub async fn send_update<T: HttpTransport + ?Sized>(
    transport: &T,
    config: &PanelConfig,
    id: ComplaintId,
    changes: &ProposedChanges,
) -> AppResult<Option<ComplaintUpdate>> {
    let request = build_request(config, id, changes)?;
    let response = transport.execute(request).await.map_err(|e| {
        warn!(error = %e, "update request failed");
        let error: AppError = e.into();
        match error.kind {
            ErrorKind::Validation => error,
            _ => AppError::new(ErrorKind::Network, SAVE_ERROR_MESSAGE)
                .with_internal(error.message),
        }
    })?;

    let result = read_response(&response);
    if let Err(e) = &result {
        warn!(status = response.status(), message = %e.message, "update rejected");
    }
    result
}

/// Inline feedback shown under the popup form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum FormFeedback {
    Saving,
    Saved,
    Failed(String),
}

impl FormFeedback {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Saving => "Guardando cambios...",
            Self::Saved => "Cambios guardados correctamente",
            Self::Failed(message) => message,
        }
    }
}
