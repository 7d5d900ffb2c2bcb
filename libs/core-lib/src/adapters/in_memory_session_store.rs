use crate::domain::role::Role;
use crate::domain::session::{Credential, SessionSnapshot};
use crate::{CoreError, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// State held for one role. Credential, profile and epoch change together.
#[derive(Debug, Clone, Default)]
struct RoleSlot {
    epoch: u64,
    credential: Option<Credential>,
    profile: Option<serde_json::Value>,
}

/// In-memory implementation of the SessionStore port.
///
/// Each role lives under its own map entry and every mutation goes through that
/// entry's guard, so concurrent callers see either the state before or after a
/// write, never a mix, and never another role's slot.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    slots: Arc<DashMap<Role, RoleSlot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn set_credential(
        &self,
        role: Role,
        token: &str,
        subject_id: &str,
        profile: Option<serde_json::Value>,
    ) -> Result<u64, CoreError> {
        let mut slot = self.slots.entry(role).or_default();
        slot.epoch += 1;
        slot.credential = Some(Credential::new(role, token, subject_id));
        slot.profile = profile;
        debug!(%role, epoch = slot.epoch, "Credential set");
        Ok(slot.epoch)
    }

    async fn clear_credential(&self, role: Role) -> Result<u64, CoreError> {
        let mut slot = self.slots.entry(role).or_default();
        slot.epoch += 1;
        slot.credential = None;
        slot.profile = None;
        debug!(%role, epoch = slot.epoch, "Credential cleared");
        Ok(slot.epoch)
    }

    async fn clear_if_epoch(&self, role: Role, expected_epoch: u64) -> Result<bool, CoreError> {
        let mut slot = self.slots.entry(role).or_default();
        if slot.epoch != expected_epoch {
            return Ok(false);
        }
        slot.epoch += 1;
        slot.credential = None;
        slot.profile = None;
        debug!(%role, epoch = slot.epoch, "Credential cleared after rejection");
        Ok(true)
    }

    async fn snapshot(&self, role: Role) -> Result<SessionSnapshot, CoreError> {
        Ok(match self.slots.get(&role) {
            Some(slot) => SessionSnapshot {
                role,
                epoch: slot.epoch,
                credential: slot.credential.clone(),
            },
            None => SessionSnapshot::empty(role, 0),
        })
    }

    async fn set_profile(&self, role: Role, profile: serde_json::Value) -> Result<(), CoreError> {
        match self.slots.get_mut(&role) {
            Some(mut slot) if slot.credential.is_some() => {
                slot.profile = Some(profile);
                Ok(())
            }
            _ => Err(CoreError::Validation(format!(
                "No live {} session to attach a profile to",
                role
            ))),
        }
    }

    async fn profile(&self, role: Role) -> Result<Option<serde_json::Value>, CoreError> {
        Ok(self.slots.get(&role).and_then(|slot| slot.profile.clone()))
    }
}
