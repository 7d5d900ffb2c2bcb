use async_trait::async_trait;
use std::future::Future;

// Declare modules
pub mod adapters;
pub mod domain;

use domain::role::Role;
use domain::session::{SessionEvent, SessionSnapshot};

// Common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// Marker trait for commands
pub trait Command: Send + Sync + 'static {}

// Port for handling commands (login, logout, marking attendance)
pub trait CommandHandler<C: Command>: Send + Sync {
    type Error;

    fn handle(&self, command: C) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Port for the per-role credential store.
///
/// Every method is scoped to a single role: an implementation must never let an
/// operation on one role observe or mutate another role's slot. Each role carries
/// a credential epoch that advances by exactly one on every set and clear, so
/// callers can tell whether a credential they read earlier is still the live one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replaces the credential for `role` and returns the new epoch.
    /// The previous subject's profile is replaced by `profile` in the same write.
    async fn set_credential(
        &self,
        role: Role,
        token: &str,
        subject_id: &str,
        profile: Option<serde_json::Value>,
    ) -> Result<u64, CoreError>;

    /// Removes the credential and cached profile for `role`. Idempotent.
    /// Returns the new epoch.
    async fn clear_credential(&self, role: Role) -> Result<u64, CoreError>;

    /// Clears `role` only if its epoch still equals `expected_epoch`.
    /// Returns whether the clear happened.
    async fn clear_if_epoch(&self, role: Role, expected_epoch: u64) -> Result<bool, CoreError>;

    /// Atomic view of the role's epoch and live credential.
    async fn snapshot(&self, role: Role) -> Result<SessionSnapshot, CoreError>;

    /// Caches display data for the logged-in subject of `role`.
    async fn set_profile(&self, role: Role, profile: serde_json::Value) -> Result<(), CoreError>;

    async fn profile(&self, role: Role) -> Result<Option<serde_json::Value>, CoreError>;

    async fn token(&self, role: Role) -> Result<Option<String>, CoreError> {
        Ok(self.snapshot(role).await?.credential.map(|c| c.token))
    }

    async fn epoch(&self, role: Role) -> Result<u64, CoreError> {
        Ok(self.snapshot(role).await?.epoch)
    }
}

// Port for publishing session lifecycle signals
#[async_trait]
pub trait SessionEventPublisher: Send + Sync {
    async fn publish(&self, event: SessionEvent) -> Result<(), CoreError>;
}

// Port for caching data
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;
}
