#![allow(dead_code)]

use async_trait::async_trait;
use denuncias_shared::capabilities::HttpHeaders;
use denuncias_shared::config::HostValues;
use denuncias_shared::{HttpError, HttpRequest, HttpResponse, HttpResult, HttpTransport, Panel, PanelConfig};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const API_URL: &str = "https://muni.example.cl/api/denuncias/";

pub enum Reply {
    Json(u16, Value),
    /// Answered only once the gate is opened.
    Held(u16, Value, Arc<Notify>),
    Fail(HttpError),
}

/// In-memory stand-in for the municipal API: answers from a script, in
/// order, and keeps every request it saw.
#[derive(Default)]
pub struct FakeApi {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    arrived: Notify,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn json(&self, status: u16, body: Value) {
        self.reply(Reply::Json(status, body));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Waits until at least `count` requests have reached the fake.
    pub async fn wait_for_requests(&self, count: usize) {
        while self.request_count() < count {
            self.arrived.notified().await;
        }
    }

    pub fn last_body(&self) -> Option<Value> {
        let requests = self.requests.lock().unwrap();
        let body = requests.last()?.body()?;
        serde_json::from_slice(body).ok()
    }
}

fn respond(status: u16, body: &Value, request_id: String) -> HttpResult {
    Ok(HttpResponse::new(
        status,
        HttpHeaders::new(),
        body.to_string().into_bytes(),
        request_id,
    ))
}

#[async_trait]
impl HttpTransport for FakeApi {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        let request_id = request.request_id().to_string();
        let host = request.url().host().to_string();
        let reply = self.script.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(request);
        self.arrived.notify_one();

        match reply {
            Some(Reply::Json(status, body)) => respond(status, &body, request_id),
            Some(Reply::Held(status, body, gate)) => {
                gate.notified().await;
                respond(status, &body, request_id)
            }
            Some(Reply::Fail(error)) => Err(error),
            None => Err(HttpError::Unreachable {
                host,
                message: "nothing scripted".into(),
            }),
        }
    }
}

pub fn config(role: &str) -> PanelConfig {
    PanelConfig::from_host(&HostValues {
        token: Some("token-de-prueba".into()),
        api_url: Some(API_URL.into()),
        update_url: Some("/api/denuncias/admin/0/".into()),
        crew_chiefs_url: Some("/api/usuarios/jefes-cuadrilla/".into()),
        role: Some(role.into()),
        cookie: Some("sessionid=abc; csrftoken=csrf-123".into()),
        status_config: None,
        timeout_ms: None,
    })
    .expect("test config is valid")
}

pub fn panel(role: &str) -> (Arc<FakeApi>, Arc<Panel<FakeApi>>) {
    let api = FakeApi::new();
    let panel = Arc::new(Panel::new(api.clone(), config(role)));
    (api, panel)
}
