#![allow(dead_code)]

use async_trait::async_trait;
use core_lib::adapters::{InMemoryEventBus, InMemorySessionStore};
use core_lib::domain::role::Role;
use core_lib::{SessionEventPublisher, SessionStore};
use http::StatusCode;
use serde_json::{Value, json};
use session_gateway::application::router::RequestRouter;
use session_gateway::application::routing::RouteTable;
use session_gateway::application::transport::{
    OutgoingRequest, Transport, TransportError, TransportResponse,
};
use session_gateway::{GatewayState, SessionGateway};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub type Responder =
    Box<dyn Fn(&OutgoingRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

struct Pause {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// In-process Transport: answers with a closure and records every request.
pub struct ScriptedTransport {
    responder: Responder,
    sent: Mutex<Vec<OutgoingRequest>>,
    pauses: Mutex<HashMap<String, Pause>>,
}

pub struct PauseHandle {
    pub entered: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&OutgoingRequest) -> Result<TransportResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
            pauses: Mutex::new(HashMap::new()),
        })
    }

    /// Holds the next request to `path` until the returned handle releases it.
    pub fn pause_next(&self, path: &str) -> PauseHandle {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.pauses.lock().unwrap().insert(
            path.to_string(),
            Pause {
                entered: entered_tx,
                release: release_rx,
            },
        );
        PauseHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, path: &str) -> Vec<OutgoingRequest> {
        self.sent()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let pause = self.pauses.lock().unwrap().remove(&request.path);
        if let Some(pause) = pause {
            let _ = pause.entered.send(());
            let _ = pause.release.await;
        }
        (self.responder)(&request)
    }
}

pub fn respond(status: StatusCode, body: Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse { status, body })
}

pub fn body_field<'a>(request: &'a OutgoingRequest, key: &str) -> Option<&'a str> {
    request.body.as_ref()?.get(key)?.as_str()
}

/// Backend that issues the login password back as the token and the email as
/// the subject id, rejects the password "wrong", and answers 200 with `[]`
/// elsewhere.
pub fn echo_login_backend(request: &OutgoingRequest) -> Result<TransportResponse, TransportError> {
    let login_role = ["admin", "staff", "student"]
        .into_iter()
        .find(|role| request.path == format!("/{}/login", role));
    match login_role {
        Some(role) => {
            let password = body_field(request, "password").unwrap_or_default();
            if password == "wrong" {
                return respond(
                    StatusCode::UNAUTHORIZED,
                    json!({ "message": "Invalid credentials" }),
                );
            }
            let email = body_field(request, "email").unwrap_or_default();
            respond(
                StatusCode::OK,
                json!({ "token": password, role: { "_id": email, "name": format!("{} user", role) } }),
            )
        }
        None => respond(StatusCode::OK, json!([])),
    }
}

pub struct Harness {
    pub gateway: SessionGateway,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<InMemorySessionStore>,
    pub bus: InMemoryEventBus,
}

pub fn harness(
    responder: impl Fn(&OutgoingRequest) -> Result<TransportResponse, TransportError>
    + Send
    + Sync
    + 'static,
) -> Harness {
    let transport = ScriptedTransport::new(responder);
    let store = Arc::new(InMemorySessionStore::new());
    let bus = InMemoryEventBus::default();
    let state = GatewayState {
        session_store: store.clone(),
        event_bus: bus.clone(),
        transport: transport.clone(),
    };
    Harness {
        gateway: SessionGateway::new(state),
        transport,
        store,
        bus,
    }
}

/// A bare router over the same fakes, for tests that skip the facade.
pub fn router(store: Arc<dyn SessionStore>, transport: Arc<ScriptedTransport>) -> RequestRouter {
    let events: Arc<dyn SessionEventPublisher> = Arc::new(InMemoryEventBus::default());
    RequestRouter::new(RouteTable::default(), store, events, transport)
}

pub fn bearer(token: &str) -> Option<String> {
    Some(format!("Bearer {}", token))
}

pub async fn login_all(h: &Harness) {
    for role in Role::ALL {
        h.gateway
            .login(role, &format!("{}-id", role), &format!("{}-tok", role))
            .await
            .unwrap();
    }
}
