//! Crew chiefs an inspector can assign to a complaint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::config::PanelConfig;
use crate::model::{CrewChief, UserId};
use crate::{AppError, AppResult, ErrorKind};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChiefsBody {
    Bare(Vec<Value>),
    Paginated { results: Vec<Value> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewDirectory {
    chiefs: Vec<CrewChief>,
}

impl CrewDirectory {
    #[must_use]
    pub fn new(chiefs: Vec<CrewChief>) -> Self {
        Self { chiefs }
    }

    #[must_use]
    pub fn find(&self, id: UserId) -> Option<&CrewChief> {
        self.chiefs.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrewChief> + '_ {
        self.chiefs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chiefs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chiefs.is_empty()
    }
}

/// Only inspectors assign crews, and only when the page exposes the endpoint.
#[must_use]
pub fn is_available(config: &PanelConfig) -> bool {
    config.role.is_inspector() && config.crew_chiefs_url.is_some()
}

pub fn parse_crew_chiefs(response: &HttpResponse) -> AppResult<CrewDirectory> {
    let body: ChiefsBody = response.json().map_err(|e| {
        AppError::new(ErrorKind::Parse, "unexpected crew chief list format")
            .with_internal(e.to_string())
    })?;
    let records = match body {
        ChiefsBody::Bare(records) | ChiefsBody::Paginated { results: records } => records,
    };

    let mut chiefs: Vec<CrewChief> = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<CrewChief>(record) {
            Ok(chief) if chiefs.iter().all(|c| c.id != chief.id) => chiefs.push(chief),
            Ok(chief) => debug!(chief_id = %chief.id, "duplicate crew chief ignored"),
            Err(e) => debug!(error = %e, "skipping unreadable crew chief"),
        }
    }
    chiefs.sort_by(|a, b| a.username.to_lowercase().cmp(&b.username.to_lowercase()));
    Ok(CrewDirectory::new(chiefs))
}

/// Fetches the directory. Callers decide whether it may be requested at all;
/// see [`is_available`].
#[instrument(skip(transport, config))]
pub async fn fetch_crew_chiefs<T: HttpTransport + ?Sized>(
    transport: &T,
    config: &PanelConfig,
) -> AppResult<CrewDirectory> {
    let Some(url) = config.crew_chiefs_url.clone() else {
        return Ok(CrewDirectory::default());
    };

    let request = HttpRequest::get(url)
        .with_header("Authorization", config.authorization())?
        .with_header("Accept", "application/json")?
        .with_timeout(config.request_timeout)?;
    let response = transport.execute(request).await?;
    if !response.is_success() {
        warn!(status = response.status(), "crew chief list failed");
        return Err(HttpError::Status {
            status: response.status(),
            request_id: response.request_id().to_string(),
        }
        .into());
    }

    let directory = parse_crew_chiefs(&response)?;
    info!(count = directory.len(), "crew chiefs loaded");
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::ScriptedTransport;
    use crate::capabilities::HttpHeaders;
    use crate::config::HostValues;
    use serde_json::json;

    fn config(role: &str, with_url: bool) -> PanelConfig {
        PanelConfig::from_host(&HostValues {
            token: Some("tkn".into()),
            api_url: Some("https://muni.example.cl/api/denuncias/".into()),
            update_url: Some("/api/denuncias/admin/0/".into()),
            crew_chiefs_url: with_url.then(|| "/api/usuarios/jefes-cuadrilla/".into()),
            role: Some(role.into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn response(body: Value) -> HttpResponse {
        HttpResponse::new(200, HttpHeaders::new(), body.to_string().into_bytes(), "r".into())
    }

    #[test]
    fn test_availability_is_role_gated() {
        assert!(is_available(&config("fiscalizador", true)));
        assert!(!is_available(&config("fiscalizador", false)));
        assert!(!is_available(&config("administrador", true)));
        assert!(!is_available(&config("jefe_cuadrilla", true)));
    }

    #[test]
    fn test_parse_both_shapes() {
        let directory = parse_crew_chiefs(&response(json!([
            {"id": 2, "username": "rsoto"},
            {"id": 1, "username": "Ajara"}
        ])))
        .unwrap();
        assert_eq!(
            directory.iter().map(|c| c.username.as_str()).collect::<Vec<_>>(),
            vec!["Ajara", "rsoto"]
        );
        assert_eq!(directory.find(UserId(2)).map(|c| c.username.as_str()), Some("rsoto"));
        assert!(directory.find(UserId(3)).is_none());

        let directory = parse_crew_chiefs(&response(json!({
            "results": [{"id": 5, "username": "mperez"}, {"id": 5, "username": "mperez"}, {"username": "x"}],
            "next": null
        })))
        .unwrap();
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert_eq!(
            parse_crew_chiefs(&response(json!({"detail": "no"}))).unwrap_err().kind,
            ErrorKind::Parse
        );
    }

    #[tokio::test]
    async fn test_fetch_resolves_relative_endpoint() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!([{"id": 1, "username": "ajara"}]));

        let directory = fetch_crew_chiefs(&transport, &config("fiscalizador", true))
            .await
            .unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(
            transport.requests()[0].url().as_str(),
            "https://muni.example.cl/api/usuarios/jefes-cuadrilla/"
        );
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let transport = ScriptedTransport::new();
        transport.push_json(403, json!({"detail": "forbidden"}));
        let error = fetch_crew_chiefs(&transport, &config("fiscalizador", true))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_a_network_failure() {
        let transport = ScriptedTransport::new();
        transport.push_json(404, json!({"detail": "Not found."}));
        let error = fetch_crew_chiefs(&transport, &config("fiscalizador", true))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Network);
        assert_eq!(error.context.get("http_status").map(String::as_str), Some("404"));
    }
}
