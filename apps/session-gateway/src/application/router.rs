use core_lib::domain::role::Role;
use core_lib::domain::session::{Credential, EndReason, SessionEvent};
use core_lib::{SessionEventPublisher, SessionStore};
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Span, debug, field, info, instrument, warn};
use uuid::Uuid;

use super::GatewayError;
use super::routing::RouteTable;
use super::transport::{OutgoingRequest, Transport, TransportResponse};

/// A call as the rest of the gateway describes it, before any role is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds the parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }
}

/// A successful answer, tagged with the role and epoch it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub role: Role,
    pub epoch: u64,
    pub status: StatusCode,
    pub body: Value,
}

/// Attaches the right role's credential to each call and tears that role down
/// when the server rejects it.
pub struct RequestRouter {
    routes: RouteTable,
    session_store: Arc<dyn SessionStore>,
    events: Arc<dyn SessionEventPublisher>,
    transport: Arc<dyn Transport>,
}

impl RequestRouter {
    pub fn new(
        routes: RouteTable,
        session_store: Arc<dyn SessionStore>,
        events: Arc<dyn SessionEventPublisher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            routes,
            session_store,
            events,
            transport,
        }
    }

    pub fn role_for(&self, path: &str) -> Role {
        self.routes.resolve(path)
    }

    #[instrument(
        name = "dispatch",
        skip(self, request),
        fields(method = %request.method, path = %request.path, role = field::Empty, request_id = field::Empty)
    )]
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let role = self.routes.resolve(&request.path);
        let request_id = Uuid::new_v4();
        let span = Span::current();
        span.record("role", field::display(role));
        span.record("request_id", field::display(request_id));

        let snapshot = self.session_store.snapshot(role).await?;
        let issued = snapshot.epoch;
        debug!(epoch = issued, authenticated = snapshot.is_live(), "Dispatching request");

        let outgoing = OutgoingRequest {
            method: request.method,
            path: request.path,
            query: request.query,
            body: request.body,
            authorization: snapshot.credential.as_ref().map(Credential::bearer),
            request_id,
        };
        let response = self.transport.send(outgoing).await.map_err(|e| {
            warn!(error = %e, "Transport failure");
            GatewayError::from(e)
        })?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Err(self.reject(role, issued).await);
        }

        let current = self.session_store.epoch(role).await?;
        if current != issued {
            warn!(issued, current, "Credential changed while request was in flight");
            return Err(GatewayError::StaleResponse {
                role,
                issued,
                current,
            });
        }

        if !response.status.is_success() {
            let message = server_message(&response);
            warn!(status = %response.status, %message, "Request failed");
            return Err(GatewayError::Status {
                code: response.status,
                message,
            });
        }

        Ok(ApiResponse {
            role,
            epoch: issued,
            status: response.status,
            body: response.body,
        })
    }

    /// Handles a 401 for `role`. Only the credential the request was sent with
    /// is torn down; a newer login for the same role survives.
    async fn reject(&self, role: Role, issued: u64) -> GatewayError {
        match self.session_store.clear_if_epoch(role, issued).await {
            Ok(true) => {
                info!("Credential rejected, session ended");
                let event = SessionEvent::Ended {
                    role,
                    epoch: issued + 1,
                    reason: EndReason::Rejected,
                };
                if let Err(e) = self.events.publish(event).await {
                    warn!(error = %e, "Failed to publish session ended event");
                }
                GatewayError::SessionEnded { role }
            }
            Ok(false) => match self.session_store.epoch(role).await {
                Ok(current) => {
                    debug!(issued, current, "Ignoring 401 for a superseded credential");
                    GatewayError::StaleResponse {
                        role,
                        issued,
                        current,
                    }
                }
                Err(e) => e.into(),
            },
            Err(e) => e.into(),
        }
    }
}

fn server_message(response: &TransportResponse) -> String {
    match &response.body {
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
    .unwrap_or_else(|| {
        response
            .status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    })
}
