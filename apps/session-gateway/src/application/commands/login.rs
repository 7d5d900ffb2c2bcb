use core_lib::domain::role::Role;
use core_lib::domain::session::SessionEvent;
use core_lib::{Command, CommandHandler, SessionEventPublisher, SessionStore};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::GatewayError;
use crate::application::router::{ApiRequest, RequestRouter};

#[derive(Clone)]
pub struct LoginCommand {
    pub role: Role,
    pub email: String,
    pub password: String,
}

impl Command for LoginCommand {}

impl std::fmt::Debug for LoginCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCommand")
            .field("role", &self.role)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Who ended up logged in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub role: Role,
    pub subject_id: String,
    pub epoch: u64,
    pub profile: Option<Value>,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
    admin: Option<Value>,
    staff: Option<Value>,
    student: Option<Value>,
    user: Option<Value>,
}

impl LoginResponse {
    /// The subject object, under the role's own key or the generic `user`.
    fn subject(self, role: Role) -> Option<Value> {
        let own = match role {
            Role::Admin => self.admin,
            Role::Staff => self.staff,
            Role::Student => self.student,
        };
        own.or(self.user).filter(Value::is_object)
    }
}

fn subject_id(subject: &Value) -> Option<String> {
    match subject.get("_id").or_else(|| subject.get("id"))? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

pub struct LoginHandler {
    router: Arc<RequestRouter>,
    session_store: Arc<dyn SessionStore>,
    events: Arc<dyn SessionEventPublisher>,
}

impl LoginHandler {
    pub fn new(
        router: Arc<RequestRouter>,
        session_store: Arc<dyn SessionStore>,
        events: Arc<dyn SessionEventPublisher>,
    ) -> Self {
        Self {
            router,
            session_store,
            events,
        }
    }

    /// Logs `command.role` in, replacing any credential that role already had.
    /// Other roles are left untouched.
    pub async fn login(&self, command: LoginCommand) -> Result<LoginOutcome, GatewayError> {
        if command.email.trim().is_empty() || command.password.is_empty() {
            return Err(core_lib::CoreError::Validation(
                "Email and password are required".to_string(),
            )
            .into());
        }

        let role = command.role;
        let path = format!("/{}/login", role.as_str());
        let body = json!({ "email": command.email, "password": command.password });
        let response = self.router.dispatch(ApiRequest::post(path, body)).await?;

        let parsed: LoginResponse = serde_json::from_value(response.body)
            .map_err(|e| GatewayError::Decode(format!("login response: {}", e)))?;
        let token = parsed
            .token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GatewayError::Decode("login response has no token".to_string()))?;
        let profile = parsed.subject(role);
        let subject_id = match profile.as_ref().and_then(subject_id) {
            Some(id) => id,
            None => {
                warn!(%role, "Login response carries no subject id, using the login email");
                command.email.clone()
            }
        };

        let epoch = self
            .session_store
            .set_credential(role, &token, &subject_id, profile.clone())
            .await?;
        if let Err(e) = self
            .events
            .publish(SessionEvent::Started {
                role,
                subject_id: subject_id.clone(),
                epoch,
            })
            .await
        {
            warn!(error = %e, "Failed to publish session started event");
        }
        info!(%role, %subject_id, epoch, "Logged in");

        Ok(LoginOutcome {
            role,
            subject_id,
            epoch,
            profile,
        })
    }
}

impl CommandHandler<LoginCommand> for LoginHandler {
    type Error = GatewayError;

    async fn handle(&self, command: LoginCommand) -> Result<(), GatewayError> {
        self.login(command).await.map(|_| ())
    }
}
