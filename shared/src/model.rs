use chrono::{DateTime, FixedOffset};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::status::{normalize, StatusToken};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintId(pub u64);

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated lat/lon
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() { return None; }
        if !(-90.0..=90.0).contains(&lat) { return None; }
        if !(-180.0..=180.0).contains(&lon) { return None; }
        Some(Self { lat, lon })
    }
}

/// Staff roles as the API reports them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Inspector,
    Administrator,
    MunicipalOfficer,
    CrewChief,
    Citizen,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match crate::status::normalize_token(s).as_str() {
            "fiscalizador" | "inspector" => Self::Inspector,
            "administrador" | "administrator" | "admin" => Self::Administrator,
            "funcionario_municipal" | "funcionario" => Self::MunicipalOfficer,
            "jefe_cuadrilla" | "jefe_de_cuadrilla" | "crew_chief" => Self::CrewChief,
            "ciudadano" | "citizen" => Self::Citizen,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inspector => "fiscalizador",
            Self::Administrator => "administrador",
            Self::MunicipalOfficer => "funcionario_municipal",
            Self::CrewChief => "jefe_cuadrilla",
            Self::Citizen => "ciudadano",
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub const fn is_inspector(&self) -> bool {
        matches!(self, Self::Inspector)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Reporter {
    pub id: UserId,
    #[serde(default, alias = "username", alias = "nombre")]
    pub name: String,
    #[serde(default, rename = "rol")]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CrewChief {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
}

/// The API has shipped the chief both as a bare id and as a nested object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum CrewChiefRef {
    Id(UserId),
    Full(CrewChief),
}

impl CrewChiefRef {
    #[must_use]
    pub fn id(&self) -> UserId {
        match self {
            Self::Id(id) => *id,
            Self::Full(chief) => chief.id,
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Full(chief) => Some(chief.username.as_str()).filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct CrewReportDetail {
    #[serde(default, rename = "comentario")]
    pub comment: String,
    #[serde(default, rename = "foto_trabajo")]
    pub photo_url: Option<String>,
    #[serde(default, rename = "jefe_cuadrilla")]
    pub chief: Option<CrewChiefRef>,
    #[serde(default, rename = "fecha_reporte")]
    pub reported_at: Option<String>,
}

/// Older API versions stored the report as free text; some serializers only
/// send the report's primary key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum CrewReport {
    Reference(u64),
    Text(String),
    Detailed(CrewReportDetail),
}

impl CrewReport {
    #[must_use]
    pub fn comment(&self) -> &str {
        match self {
            Self::Reference(_) => "",
            Self::Text(text) => text,
            Self::Detailed(detail) => &detail.comment,
        }
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        matches!(self, Self::Reference(_)) || !self.comment().trim().is_empty()
    }

    #[must_use]
    pub fn photo_url(&self) -> Option<&str> {
        match self {
            Self::Reference(_) | Self::Text(_) => None,
            Self::Detailed(detail) => detail.photo_url.as_deref(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Nested objects whose shape changed between API versions: anything that
/// does not fit becomes `None` instead of failing the whole page.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A complaint as served by the list endpoint.
///
/// The canonical status is never stored: [`Complaint::status`] derives it from
/// the raw token on every read, so it cannot drift from `raw_status`.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Complaint {
    pub id: ComplaintId,
    #[serde(default, rename = "descripcion", deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, rename = "direccion", deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, rename = "direccion_textual", deserialize_with = "null_as_default")]
    pub address_text: String,
    #[serde(default, rename = "zona", deserialize_with = "null_as_default")]
    pub zone: String,
    #[serde(default, rename = "latitud")]
    pub latitude: Option<f64>,
    #[serde(default, rename = "longitud")]
    pub longitude: Option<f64>,
    #[serde(default, rename = "fecha_creacion")]
    pub created_at_raw: Option<String>,
    #[serde(default, rename = "estado", deserialize_with = "null_as_default")]
    pub raw_status: String,
    #[serde(default, rename = "estado_display")]
    pub status_display: Option<String>,
    #[serde(default, rename = "cuadrilla_asignada", deserialize_with = "null_as_default")]
    pub crew_label: String,
    #[serde(default, rename = "jefe_cuadrilla_asignado", deserialize_with = "lenient")]
    pub crew_chief: Option<CrewChiefRef>,
    #[serde(default, rename = "reporte_cuadrilla", deserialize_with = "lenient")]
    pub crew_report: Option<CrewReport>,
    #[serde(default, rename = "motivo_rechazo")]
    pub rejection_reason: Option<String>,
    #[serde(default, rename = "imagen")]
    pub image_url: Option<String>,
    #[serde(default, rename = "usuario", deserialize_with = "lenient")]
    pub reporter: Option<Reporter>,
}

impl Complaint {
    #[must_use]
    pub fn new(id: ComplaintId, raw_status: impl Into<String>) -> Self {
        Self {
            id,
            description: String::new(),
            address: String::new(),
            address_text: String::new(),
            zone: String::new(),
            latitude: None,
            longitude: None,
            created_at_raw: None,
            raw_status: raw_status.into(),
            status_display: None,
            crew_label: String::new(),
            crew_chief: None,
            crew_report: None,
            rejection_reason: None,
            image_url: None,
            reporter: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusToken {
        normalize(&self.raw_status)
    }

    /// Creation time, or `None` when missing or unparseable.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        self.created_at_raw
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
    }

    #[must_use]
    pub fn location(&self) -> Option<LatLon> {
        LatLon::new(self.latitude?, self.longitude?)
    }

    #[must_use]
    pub fn display_address(&self) -> Option<&str> {
        [self.address_text.as_str(), self.address.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|a| !a.is_empty())
    }

    #[must_use]
    pub fn crew_chief_id(&self) -> Option<UserId> {
        self.crew_chief.as_ref().map(CrewChiefRef::id)
    }

    #[must_use]
    pub fn has_crew_report(&self) -> bool {
        self.crew_report.as_ref().is_some_and(CrewReport::has_content)
    }

    pub fn description_preview(&self, max_len: usize) -> String {
        let trimmed = self.description.trim();
        if trimmed.chars().count() <= max_len {
            trimmed.to_string()
        } else {
            let cut: String = trimmed.chars().take(max_len.saturating_sub(1)).collect();
            format!("{}…", cut.trim_end())
        }
    }
}

// Redact debug output because this can contain citizen-provided data.
impl fmt::Debug for Complaint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Complaint")
            .field("id", &self.id)
            .field("raw_status", &self.raw_status)
            .field("created_at_raw", &self.created_at_raw)
            .field("has_location", &self.location().is_some())
            .field("description_present", &!self.description.is_empty())
            .field("crew_chief", &self.crew_chief_id())
            .field("crew_report_present", &self.crew_report.is_some())
            .field("reporter_present", &self.reporter.is_some())
            .finish()
    }
}

/// Fields a successful mutation may change.
///
/// Every field is optional: the update endpoint may echo the whole record,
/// a subset, or nothing at all.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ComplaintUpdate {
    #[serde(default, rename = "estado", skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    #[serde(default, rename = "estado_display", skip_serializing_if = "Option::is_none")]
    pub status_display: Option<String>,
    #[serde(default, rename = "cuadrilla_asignada", skip_serializing_if = "Option::is_none")]
    pub crew_label: Option<String>,
    #[serde(default, rename = "jefe_cuadrilla_asignado", skip_serializing_if = "Option::is_none")]
    pub crew_chief: Option<CrewChiefRef>,
    #[serde(default, rename = "reporte_cuadrilla", skip_serializing_if = "Option::is_none")]
    pub crew_report: Option<CrewReport>,
    #[serde(default, rename = "motivo_rechazo", skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, rename = "zona", skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl ComplaintUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Fills every field missing here from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            raw_status: self.raw_status.or(fallback.raw_status),
            status_display: self.status_display.or(fallback.status_display),
            crew_label: self.crew_label.or(fallback.crew_label),
            crew_chief: self.crew_chief.or(fallback.crew_chief),
            crew_report: self.crew_report.or(fallback.crew_report),
            rejection_reason: self.rejection_reason.or(fallback.rejection_reason),
            zone: self.zone.or(fallback.zone),
        }
    }

    pub fn apply_to(self, complaint: &mut Complaint) {
        if let Some(raw_status) = self.raw_status {
            complaint.raw_status = raw_status;
            // the server label belongs to the old status unless it came with the update
            complaint.status_display = self.status_display;
        } else if self.status_display.is_some() {
            complaint.status_display = self.status_display;
        }
        if let Some(crew_label) = self.crew_label {
            complaint.crew_label = crew_label;
        }
        if self.crew_chief.is_some() {
            complaint.crew_chief = self.crew_chief;
        }
        if self.crew_report.is_some() {
            complaint.crew_report = self.crew_report;
        }
        if self.rejection_reason.is_some() {
            complaint.rejection_reason = self.rejection_reason;
        }
        if let Some(zone) = self.zone {
            complaint.zone = zone;
        }
    }
}
