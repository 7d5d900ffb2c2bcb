use core_lib::domain::role::Role;
use core_lib::domain::session::{EndReason, SessionEvent};
use core_lib::{Command, CommandHandler, SessionEventPublisher, SessionStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct LogoutCommand {
    pub role: Role,
}

impl Command for LogoutCommand {}

/// Clears one role locally. The backend keeps no session to close.
pub struct LogoutHandler {
    session_store: Arc<dyn SessionStore>,
    events: Arc<dyn SessionEventPublisher>,
}

impl LogoutHandler {
    pub fn new(session_store: Arc<dyn SessionStore>, events: Arc<dyn SessionEventPublisher>) -> Self {
        Self {
            session_store,
            events,
        }
    }
}

impl CommandHandler<LogoutCommand> for LogoutHandler {
    type Error = GatewayError;

    async fn handle(&self, command: LogoutCommand) -> Result<(), GatewayError> {
        let role = command.role;
        let epoch = self.session_store.clear_credential(role).await?;
        if let Err(e) = self
            .events
            .publish(SessionEvent::Ended {
                role,
                epoch,
                reason: EndReason::Logout,
            })
            .await
        {
            warn!(error = %e, "Failed to publish session ended event");
        }
        info!(%role, epoch, "Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::adapters::{InMemoryEventBus, InMemorySessionStore};

    #[tokio::test]
    async fn test_logout_clears_one_role_and_signals() {
        let store = Arc::new(InMemorySessionStore::new());
        let bus = InMemoryEventBus::default();
        let mut staff_events = bus.subscribe(Role::Staff);
        store.set_credential(Role::Staff, "staff-tok", "T1", None).await.unwrap();
        store.set_credential(Role::Admin, "admin-tok", "A1", None).await.unwrap();

        let handler = LogoutHandler::new(store.clone(), Arc::new(bus.clone()));
        handler.handle(LogoutCommand { role: Role::Staff }).await.unwrap();

        assert_eq!(store.token(Role::Staff).await.unwrap(), None);
        assert_eq!(store.token(Role::Admin).await.unwrap().as_deref(), Some("admin-tok"));
        assert_eq!(
            staff_events.recv().await.unwrap(),
            SessionEvent::Ended {
                role: Role::Staff,
                epoch: 2,
                reason: EndReason::Logout,
            }
        );
    }
}
