//! What the shell renders: map markers, per-status lists, popup forms and
//! the banner. Built from the panel state on demand and never stored.

use chrono::{DateTime, Utc};
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::StatusDisplayConfig;
use crate::crew::CrewDirectory;
use crate::filters::FilterSet;
use crate::model::{Complaint, ComplaintId, CrewChief, LatLon, Role};
use crate::mutation::FormFeedback;
use crate::policy::{allowed_transitions, can_edit, can_reject, help_text, is_read_only};
use crate::status::{CanonicalStatus, StatusToken};
use crate::store::ComplaintStore;
use crate::{Notice, DESCRIPTION_PREVIEW_LENGTH};

pub const DEFAULT_MAP_CENTER: LatLon = LatLon {
    lat: -33.4507,
    lon: -70.6671,
};
pub const DEFAULT_MAP_ZOOM: u8 = 12;
pub const MAP_FIT_PADDING_PX: u32 = 40;

pub const MISSING_ADDRESS: &str = "Sin dirección registrada";
pub const MISSING_ZONE: &str = "No asignada";
pub const MISSING_DATE: &str = "Fecha no disponible";
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y %H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub markers: FeatureCollection,
    pub lists: Vec<StatusList>,
    /// Complaints whose status is not recognized; they only show on the map.
    pub unknown_count: usize,
    pub total: usize,
    pub map: MapView,
    pub notice: Option<Notice>,
    pub last_updated: Option<DateTime<Utc>>,
    pub loading: bool,
    pub active_filters: FilterSet,
    /// Options for the crew-chief selector; empty for roles that cannot assign.
    pub crew_chiefs: Vec<CrewChief>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusList {
    pub status: CanonicalStatus,
    pub label: String,
    pub color: String,
    pub count: usize,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: ComplaintId,
    pub preview: String,
    pub address: String,
    pub zone: String,
    pub reported_at: String,
    pub crew_label: Option<String>,
    pub has_location: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MapView {
    Fit {
        south_west: LatLon,
        north_east: LatLon,
        padding_px: u32,
    },
    Center {
        center: LatLon,
        zoom: u8,
    },
}

impl MapView {
    /// Bounds of every located point, or the default city view when none is.
    #[must_use]
    pub fn covering(points: impl IntoIterator<Item = LatLon>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::Center {
                center: DEFAULT_MAP_CENTER,
                zoom: DEFAULT_MAP_ZOOM,
            };
        };
        let (mut south_west, mut north_east) = (first, first);
        for p in points {
            south_west.lat = south_west.lat.min(p.lat);
            south_west.lon = south_west.lon.min(p.lon);
            north_east.lat = north_east.lat.max(p.lat);
            north_east.lon = north_east.lon.max(p.lon);
        }
        Self::Fit {
            south_west,
            north_east,
            padding_px: MAP_FIT_PADDING_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorOption {
    pub status: CanonicalStatus,
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSelector {
    pub options: Vec<SelectorOption>,
    pub disabled: bool,
    pub can_reject: bool,
    /// The assignment form needs a crew chief picked.
    pub requires_crew_chief: bool,
    /// The done transition needs the crew's report.
    pub requires_report: bool,
    pub help_text: Option<String>,
}

impl StatusSelector {
    #[must_use]
    pub fn for_complaint(
        role: &Role,
        status: &StatusToken,
        display: &StatusDisplayConfig,
    ) -> Self {
        let Some(current) = status.canonical() else {
            return Self {
                options: Vec::new(),
                disabled: true,
                can_reject: false,
                requires_crew_chief: false,
                requires_report: false,
                help_text: None,
            };
        };

        let allowed = allowed_transitions(role, current);
        let editable = can_edit(role);
        Self {
            options: allowed
                .iter()
                .map(|s| SelectorOption {
                    status: *s,
                    value: s.wire_value().to_string(),
                    label: display.label(*s).to_string(),
                    selected: *s == current,
                })
                .collect(),
            disabled: !editable || is_read_only(role, current),
            can_reject: editable && can_reject(role, current),
            requires_crew_chief: current == CanonicalStatus::Pending
                && allowed.contains(&CanonicalStatus::InManagement),
            requires_report: current == CanonicalStatus::InManagement
                && allowed.contains(&CanonicalStatus::Done),
            help_text: help_text(role, current).map(str::to_string),
        }
    }
}

/// Everything the popup shows for one complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Popup {
    pub id: ComplaintId,
    pub status_label: String,
    pub status_color: String,
    pub description: String,
    pub address: String,
    pub zone: String,
    pub reported_at: String,
    pub image_url: Option<String>,
    pub crew_label: String,
    pub crew_chief: Option<String>,
    pub crew_report: Option<String>,
    pub crew_report_photo_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub selector: StatusSelector,
    pub feedback: Option<FormFeedback>,
    pub saving: bool,
}

/// Borrowed panel state the view model is built from.
#[derive(Debug, Clone, Copy)]
pub struct ViewSource<'a> {
    pub store: &'a ComplaintStore,
    pub role: &'a Role,
    pub display: &'a StatusDisplayConfig,
    pub active_filters: &'a FilterSet,
    pub notice: Option<&'a Notice>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub feedback: &'a HashMap<ComplaintId, FormFeedback>,
    pub in_flight: &'a HashSet<ComplaintId>,
    pub crew: Option<&'a CrewDirectory>,
    pub loading: bool,
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

#[must_use]
pub fn format_reported_at(complaint: &Complaint) -> String {
    complaint
        .created_at()
        .map_or_else(|| MISSING_DATE.to_string(), |dt| dt.format(DISPLAY_DATE_FORMAT).to_string())
}

fn status_label(complaint: &Complaint, display: &StatusDisplayConfig) -> String {
    let status = complaint.status();
    match status.canonical() {
        Some(s) => display.label(s).to_string(),
        None => complaint
            .status_display
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(status.as_str())
            .to_string(),
    }
}

fn crew_chief_name(complaint: &Complaint, crew: Option<&CrewDirectory>) -> Option<String> {
    let chief = complaint.crew_chief.as_ref()?;
    chief
        .username()
        .map(str::to_string)
        .or_else(|| {
            crew.and_then(|d| d.find(chief.id()))
                .map(|c| c.username.clone())
        })
        .or_else(|| Some(format!("#{}", chief.id())))
}

impl ViewSource<'_> {
    #[must_use]
    pub fn popup(&self, complaint: &Complaint) -> Popup {
        let status = complaint.status();
        Popup {
            id: complaint.id,
            status_label: status_label(complaint, self.display),
            status_color: self.display.color_for(&status).to_string(),
            description: complaint.description.trim().to_string(),
            address: complaint
                .display_address()
                .unwrap_or(MISSING_ADDRESS)
                .to_string(),
            zone: non_blank(&complaint.zone).unwrap_or(MISSING_ZONE).to_string(),
            reported_at: format_reported_at(complaint),
            image_url: complaint.image_url.as_deref().and_then(non_blank).map(str::to_string),
            crew_label: complaint.crew_label.trim().to_string(),
            crew_chief: crew_chief_name(complaint, self.crew),
            crew_report: complaint
                .crew_report
                .as_ref()
                .and_then(|r| non_blank(r.comment()))
                .map(str::to_string),
            crew_report_photo_url: complaint
                .crew_report
                .as_ref()
                .and_then(|r| r.photo_url())
                .map(str::to_string),
            rejection_reason: complaint
                .rejection_reason
                .as_deref()
                .and_then(non_blank)
                .map(str::to_string),
            selector: StatusSelector::for_complaint(self.role, &status, self.display),
            feedback: self.feedback.get(&complaint.id).cloned(),
            saving: self.in_flight.contains(&complaint.id),
        }
    }

    fn marker(&self, complaint: &Complaint, location: LatLon) -> Feature {
        let popup = self.popup(complaint);
        let mut properties = match serde_json::to_value(&popup) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => JsonObject::new(),
        };
        properties.insert("color".into(), popup.status_color.clone().into());
        properties.insert("status".into(), complaint.status().as_str().into());

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeoValue::Point(vec![location.lon, location.lat]))),
            id: Some(Id::Number(complaint.id.0.into())),
            properties: Some(properties),
            foreign_members: None,
        }
    }

    fn list_item(complaint: &Complaint) -> ListItem {
        ListItem {
            id: complaint.id,
            preview: complaint.description_preview(DESCRIPTION_PREVIEW_LENGTH),
            address: complaint
                .display_address()
                .unwrap_or(MISSING_ADDRESS)
                .to_string(),
            zone: non_blank(&complaint.zone).unwrap_or(MISSING_ZONE).to_string(),
            reported_at: format_reported_at(complaint),
            crew_label: non_blank(&complaint.crew_label).map(str::to_string),
            has_location: complaint.location().is_some(),
        }
    }

    #[must_use]
    pub fn build(&self, now_ms: u64) -> ViewModel {
        let located: Vec<(&Complaint, LatLon)> = self
            .store
            .iter()
            .filter_map(|c| c.location().map(|l| (c, l)))
            .collect();

        let markers = FeatureCollection {
            bbox: None,
            features: located.iter().map(|(c, l)| self.marker(c, *l)).collect(),
            foreign_members: None,
        };

        let lists = CanonicalStatus::ALL
            .into_iter()
            .map(|status| StatusList {
                status,
                label: self.display.label(status).to_string(),
                color: self.display.color(status).to_string(),
                count: self.store.count(status),
                items: self.store.bucket(status).map(Self::list_item).collect(),
            })
            .collect();

        ViewModel {
            markers,
            lists,
            unknown_count: self.store.unknown().count(),
            total: self.store.len(),
            map: MapView::covering(located.iter().map(|(_, l)| *l)),
            notice: self.notice.filter(|n| !n.is_expired(now_ms)).cloned(),
            last_updated: self.last_refresh,
            loading: self.loading,
            active_filters: self.active_filters.clone(),
            crew_chiefs: if self.role.is_inspector() {
                self.crew.map(|d| d.iter().cloned().collect()).unwrap_or_default()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrewChiefRef, UserId};

    struct Fixture {
        store: ComplaintStore,
        role: Role,
        display: StatusDisplayConfig,
        filters: FilterSet,
        feedback: HashMap<ComplaintId, FormFeedback>,
        in_flight: HashSet<ComplaintId>,
    }

    impl Fixture {
        fn new(role: Role, complaints: Vec<Complaint>) -> Self {
            let mut store = ComplaintStore::new();
            store.replace_all(complaints);
            Self {
                store,
                role,
                display: StatusDisplayConfig::default(),
                filters: FilterSet::default(),
                feedback: HashMap::new(),
                in_flight: HashSet::new(),
            }
        }

        fn source(&self) -> ViewSource<'_> {
            ViewSource {
                store: &self.store,
                role: &self.role,
                display: &self.display,
                active_filters: &self.filters,
                notice: None,
                last_refresh: None,
                feedback: &self.feedback,
                in_flight: &self.in_flight,
                crew: None,
                loading: false,
            }
        }
    }

    fn located(id: u64, status: &str, lat: f64, lon: f64) -> Complaint {
        let mut c = Complaint::new(ComplaintId(id), status);
        c.latitude = Some(lat);
        c.longitude = Some(lon);
        c
    }

    #[test]
    fn test_markers_only_for_valid_locations() {
        let mut unlocated = Complaint::new(ComplaintId(3), "pendiente");
        unlocated.latitude = Some(f64::NAN);
        unlocated.longitude = Some(-70.0);
        let fixture = Fixture::new(
            Role::Inspector,
            vec![
                located(1, "pendiente", -33.45, -70.66),
                located(2, "archivada", -33.40, -70.60),
                unlocated,
                located(4, "finalizado", 95.0, -70.0),
            ],
        );

        let view = fixture.source().build(0);
        assert_eq!(view.markers.features.len(), 2);
        assert_eq!(view.total, 4);
        assert_eq!(view.unknown_count, 1);

        let unknown = &view.markers.features[1];
        let props = unknown.properties.as_ref().unwrap();
        assert_eq!(props["color"], crate::status::DEFAULT_STATUS_COLOR);
        assert_eq!(props["status_label"], "archivada");

        let first = &view.markers.features[0];
        match &first.geometry.as_ref().unwrap().value {
            GeoValue::Point(coords) => assert_eq!(coords, &vec![-70.66, -33.45]),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn test_unlocated_complaints_still_listed() {
        let fixture = Fixture::new(
            Role::Inspector,
            vec![Complaint::new(ComplaintId(1), "pendiente")],
        );
        let view = fixture.source().build(0);
        assert!(view.markers.features.is_empty());
        let pending = &view.lists[CanonicalStatus::Pending.index()];
        assert_eq!(pending.count, 1);
        assert_eq!(pending.items[0].address, MISSING_ADDRESS);
        assert_eq!(pending.items[0].zone, MISSING_ZONE);
        assert_eq!(pending.items[0].reported_at, MISSING_DATE);
        assert!(!pending.items[0].has_location);
        assert_eq!(
            view.map,
            MapView::Center {
                center: DEFAULT_MAP_CENTER,
                zoom: DEFAULT_MAP_ZOOM
            }
        );
    }

    #[test]
    fn test_map_bounds_cover_markers() {
        let fixture = Fixture::new(
            Role::Inspector,
            vec![
                located(1, "pendiente", -33.50, -70.70),
                located(2, "pendiente", -33.40, -70.60),
            ],
        );
        assert_eq!(
            fixture.source().build(0).map,
            MapView::Fit {
                south_west: LatLon { lat: -33.50, lon: -70.70 },
                north_east: LatLon { lat: -33.40, lon: -70.60 },
                padding_px: MAP_FIT_PADDING_PX,
            }
        );
    }

    #[test]
    fn test_selector_for_inspector_on_pending() {
        let display = StatusDisplayConfig::default();
        let selector = StatusSelector::for_complaint(
            &Role::Inspector,
            &StatusToken::Canonical(CanonicalStatus::Pending),
            &display,
        );
        assert_eq!(
            selector.options.iter().map(|o| o.value.as_str()).collect::<Vec<_>>(),
            vec!["pendiente", "en_gestion"]
        );
        assert!(selector.options[0].selected);
        assert!(!selector.disabled);
        assert!(selector.can_reject);
        assert!(selector.requires_crew_chief);
        assert!(selector.help_text.is_some());
    }

    #[test]
    fn test_selector_disabled_for_read_only() {
        let display = StatusDisplayConfig::default();
        let selector = StatusSelector::for_complaint(
            &Role::Administrator,
            &StatusToken::Canonical(CanonicalStatus::Pending),
            &display,
        );
        assert!(selector.disabled);
        assert!(!selector.can_reject);
        assert_eq!(selector.options.len(), 1);

        let selector = StatusSelector::for_complaint(
            &Role::Citizen,
            &StatusToken::Unknown("archivada".into()),
            &display,
        );
        assert!(selector.disabled);
        assert!(selector.options.is_empty());
    }

    #[test]
    fn test_popup_fields() {
        let mut complaint = located(5, "en_gestion", -33.45, -70.66);
        complaint.description = "  Poste caído  ".into();
        complaint.zone = "Norte".into();
        complaint.created_at_raw = Some("2024-05-10T14:05:00-04:00".into());
        complaint.crew_chief = Some(CrewChiefRef::Id(UserId(8)));

        let mut fixture = Fixture::new(Role::Inspector, vec![complaint]);
        fixture.in_flight.insert(ComplaintId(5));
        fixture
            .feedback
            .insert(ComplaintId(5), FormFeedback::Saving);

        let crew = CrewDirectory::new(vec![CrewChief {
            id: UserId(8),
            username: "rsoto".into(),
        }]);
        let source = ViewSource {
            crew: Some(&crew),
            ..fixture.source()
        };
        let popup = source.popup(fixture.store.get(ComplaintId(5)).unwrap());

        assert_eq!(popup.description, "Poste caído");
        assert_eq!(popup.zone, "Norte");
        assert_eq!(popup.reported_at, "10-05-2024 14:05");
        assert_eq!(popup.crew_chief.as_deref(), Some("rsoto"));
        assert_eq!(popup.status_label, "En gestión");
        assert!(popup.saving);
        assert_eq!(popup.feedback, Some(FormFeedback::Saving));
        assert!(popup.selector.requires_report);
    }

    #[test]
    fn test_expired_notice_hidden() {
        let fixture = Fixture::new(Role::Inspector, Vec::new());
        let notice = Notice::at("hola", 1_000);
        let source = ViewSource {
            notice: Some(&notice),
            ..fixture.source()
        };
        assert!(source.build(2_000).notice.is_some());
        assert!(source.build(1_000 + crate::NOTICE_DURATION_MS + 1).notice.is_none());
    }

    #[test]
    fn test_crew_chiefs_only_offered_to_inspectors() {
        let crew = CrewDirectory::new(vec![CrewChief {
            id: UserId(1),
            username: "a".into(),
        }]);
        let fixture = Fixture::new(Role::Administrator, Vec::new());
        let source = ViewSource {
            crew: Some(&crew),
            ..fixture.source()
        };
        assert!(source.build(0).crew_chiefs.is_empty());
    }
}
