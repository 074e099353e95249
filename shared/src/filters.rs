use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::status::{normalize, CanonicalStatus};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Listing filters, named as the filter form and the list endpoint name them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default, rename = "estado")]
    pub status: Option<String>,
    #[serde(default, rename = "zona")]
    pub zone: Option<String>,
    #[serde(default, rename = "fecha_desde")]
    pub date_from: Option<String>,
    #[serde(default, rename = "fecha_hasta")]
    pub date_to: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn valid_date(value: Option<&String>, param: &'static str) -> Option<String> {
    let raw = present(value)?;
    match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Some(date.format(DATE_FORMAT).to_string()),
        Err(_) => {
            warn!(param, value = raw, "ignoring malformed date filter");
            None
        }
    }
}

impl FilterSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Query parameters for the list endpoint. Blank fields are left out and
    /// the status is sent normalized: its stored spelling when known, the
    /// folded token otherwise.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);

        if let Some(raw) = present(self.status.as_ref()) {
            pairs.push(("estado", normalize(raw).wire_value().to_string()));
        }
        if let Some(zone) = present(self.zone.as_ref()) {
            pairs.push(("zona", zone.to_string()));
        }
        if let Some(from) = valid_date(self.date_from.as_ref(), "fecha_desde") {
            pairs.push(("fecha_desde", from));
        }
        if let Some(to) = valid_date(self.date_to.as_ref(), "fecha_hasta") {
            pairs.push(("fecha_hasta", to));
        }
        pairs
    }

    /// Applies a shortcut over the active filters. Fields the shortcut does
    /// not mention are carried over unchanged.
    #[must_use]
    pub fn with_quick(&self, quick: &QuickFilter, today: NaiveDate) -> Self {
        let mut next = self.clone();
        match quick {
            QuickFilter::Clear => return Self::default(),
            QuickFilter::Status(status) => next.status = Some(status.wire_value().to_string()),
            QuickFilter::AnyStatus => next.status = None,
            QuickFilter::Zone(zone) => next.zone = Some(zone.clone()),
            QuickFilter::Today => {
                let day = today.format(DATE_FORMAT).to_string();
                next.date_from = Some(day.clone());
                next.date_to = Some(day);
            }
            QuickFilter::LastDays(days) => {
                let from = today
                    .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
                    .unwrap_or(today);
                next.date_from = Some(from.format(DATE_FORMAT).to_string());
                next.date_to = Some(today.format(DATE_FORMAT).to_string());
            }
        }
        next
    }
}

/// One-click shortcuts next to the filter form (status tabs, "hoy", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QuickFilter {
    Status(CanonicalStatus),
    AnyStatus,
    Zone(String),
    Today,
    LastDays(u32),
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_empty_fields_are_not_sent() {
        let filters = FilterSet {
            status: Some("  ".into()),
            zone: Some(String::new()),
            date_from: None,
            date_to: Some("\t".into()),
        };
        assert!(filters.query_pairs().is_empty());
        assert!(filters.is_empty());
    }

    #[test]
    fn test_status_sent_as_stored_value() {
        let filters = FilterSet {
            status: Some("En Gestión".into()),
            zone: Some(" Centro ".into()),
            ..Default::default()
        };
        assert_eq!(
            filters.query_pairs(),
            vec![("estado", "en_gestion".to_string()), ("zona", "Centro".to_string())]
        );

        let filters = FilterSet {
            status: Some("archivada".into()),
            ..Default::default()
        };
        assert_eq!(filters.query_pairs(), vec![("estado", "archivada".to_string())]);

        let filters = FilterSet {
            status: Some(" En Revisión ".into()),
            ..Default::default()
        };
        assert_eq!(filters.query_pairs(), vec![("estado", "en_revision".to_string())]);
    }

    #[test]
    fn test_dates_validated() {
        let filters = FilterSet {
            date_from: Some("2024-05-01".into()),
            date_to: Some("31/05/2024".into()),
            ..Default::default()
        };
        assert_eq!(
            filters.query_pairs(),
            vec![("fecha_desde", "2024-05-01".to_string())]
        );
    }

    #[test]
    fn test_form_field_names() {
        let filters: FilterSet = serde_json::from_value(serde_json::json!({
            "estado": "pendiente",
            "zona": "Norte",
            "fecha_desde": "",
            "fecha_hasta": "2024-05-31"
        }))
        .unwrap();
        assert_eq!(filters.zone.as_deref(), Some("Norte"));
        assert_eq!(filters.query_pairs().len(), 3);
    }

    #[test]
    fn test_quick_filter_carries_over_other_fields() {
        let active = FilterSet {
            status: Some("pendiente".into()),
            zone: Some("Norte".into()),
            ..Default::default()
        };

        let next = active.with_quick(&QuickFilter::Status(CanonicalStatus::Finalized), today());
        assert_eq!(next.status.as_deref(), Some("finalizado"));
        assert_eq!(next.zone.as_deref(), Some("Norte"));

        let next = active.with_quick(&QuickFilter::Today, today());
        assert_eq!(next.status.as_deref(), Some("pendiente"));
        assert_eq!(next.date_from.as_deref(), Some("2024-05-10"));
        assert_eq!(next.date_to.as_deref(), Some("2024-05-10"));

        let next = active.with_quick(&QuickFilter::AnyStatus, today());
        assert!(next.status.is_none());
        assert_eq!(next.zone.as_deref(), Some("Norte"));

        assert_eq!(active.with_quick(&QuickFilter::Clear, today()), FilterSet::default());
    }

    #[test]
    fn test_last_days_range() {
        let next = FilterSet::default().with_quick(&QuickFilter::LastDays(7), today());
        assert_eq!(next.date_from.as_deref(), Some("2024-05-04"));
        assert_eq!(next.date_to.as_deref(), Some("2024-05-10"));

        let next = FilterSet::default().with_quick(&QuickFilter::LastDays(0), today());
        assert_eq!(next.date_from.as_deref(), Some("2024-05-10"));
    }
}
