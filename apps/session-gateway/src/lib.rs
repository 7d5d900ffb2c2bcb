use chrono::NaiveDate;
use core_lib::adapters::{CachedSessionStore, InMemoryCache, InMemoryEventBus};
use core_lib::domain::ledger::AttendanceLedger;
use core_lib::domain::role::Role;
use core_lib::domain::session::SessionEvent;
use core_lib::{Cache, CommandHandler, SessionEventPublisher, SessionStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing::info;

pub mod application;
pub mod config;

use application::GatewayError;
use application::commands::{
    LoginCommand, LoginHandler, LoginOutcome, LogoutCommand, LogoutHandler, MarkAttendanceCommand,
    MarkAttendanceHandler, MarkReceipt,
};
use application::query::{self, ModuleSummary, StudentLogQuery};
use application::router::RequestRouter;
use application::routing::RouteTable;
use application::transport::{ReqwestTransport, Transport};
use config::GatewayConfig;

const SESSION_CACHE_CAPACITY: u64 = 64;

// Holds shared dependencies
#[derive(Clone)]
pub struct GatewayState {
    pub session_store: Arc<dyn SessionStore>,
    pub event_bus: InMemoryEventBus,
    pub transport: Arc<dyn Transport>,
}

/// Client-side entry point: one object per process holding every role's session.
pub struct SessionGateway {
    state: GatewayState,
    router: Arc<RequestRouter>,
    login: LoginHandler,
    logout: LogoutHandler,
    marker: MarkAttendanceHandler,
}

impl SessionGateway {
    pub fn new(state: GatewayState) -> Self {
        Self::with_routes(state, RouteTable::default())
    }

    pub fn with_routes(state: GatewayState, routes: RouteTable) -> Self {
        let events: Arc<dyn SessionEventPublisher> = Arc::new(state.event_bus.clone());
        let router = Arc::new(RequestRouter::new(
            routes,
            state.session_store.clone(),
            events.clone(),
            state.transport.clone(),
        ));
        Self {
            login: LoginHandler::new(router.clone(), state.session_store.clone(), events.clone()),
            logout: LogoutHandler::new(state.session_store.clone(), events),
            marker: MarkAttendanceHandler::new(router.clone()),
            router,
            state,
        }
    }

    /// Wires the production adapters: reqwest transport and a TTL-bound session cache.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(&config.api_url, config.request_timeout)?);
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new(
            SESSION_CACHE_CAPACITY,
            config.session_ttl_seconds,
        ));
        let session_store: Arc<dyn SessionStore> =
            Arc::new(CachedSessionStore::new(cache, config.session_ttl_seconds));
        info!(api_url = %config.api_url, "Session gateway configured");
        Ok(Self::new(GatewayState {
            session_store,
            event_bus: InMemoryEventBus::new(config.event_capacity),
            transport,
        }))
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.state.session_store
    }

    /// Session events for one role, e.g. to return that role's UI to its login entry.
    pub fn subscribe(&self, role: Role) -> Receiver<SessionEvent> {
        self.state.event_bus.subscribe(role)
    }

    pub fn subscribe_all(&self) -> Receiver<SessionEvent> {
        self.state.event_bus.subscribe_all()
    }

    pub async fn login(
        &self,
        role: Role,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, GatewayError> {
        self.login
            .login(LoginCommand {
                role,
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
    }

    pub async fn logout(&self, role: Role) -> Result<(), GatewayError> {
        self.logout.handle(LogoutCommand { role }).await
    }

    pub async fn profile(&self, role: Role) -> Result<Option<Value>, GatewayError> {
        Ok(self.state.session_store.profile(role).await?)
    }

    pub async fn mark_attendance(
        &self,
        command: MarkAttendanceCommand,
    ) -> Result<MarkReceipt, GatewayError> {
        self.marker.mark(command).await
    }

    pub async fn my_attendance(&self) -> Result<AttendanceLedger, GatewayError> {
        query::my_attendance(&self.router, self.state.session_store.as_ref()).await
    }

    pub async fn module_attendance(
        &self,
        module_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<AttendanceLedger, GatewayError> {
        query::module_attendance(&self.router, module_id, date).await
    }

    pub async fn all_attendance_logs(&self) -> Result<AttendanceLedger, GatewayError> {
        query::all_attendance_logs(&self.router).await
    }

    pub async fn student_attendance(&self, student_id: &str) -> Result<AttendanceLedger, GatewayError> {
        query::student_attendance(&self.router, student_id).await
    }

    pub async fn staff_student_logs(
        &self,
        student_id: &str,
        filter: &StudentLogQuery,
    ) -> Result<AttendanceLedger, GatewayError> {
        query::staff_student_logs(&self.router, student_id, filter).await
    }

    pub async fn modules(&self, role: Role) -> Result<Vec<ModuleSummary>, GatewayError> {
        query::modules(&self.router, role).await
    }
}
