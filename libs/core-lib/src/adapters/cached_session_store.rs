use crate::domain::role::Role;
use crate::domain::session::{Credential, SessionSnapshot};
use crate::{Cache, CoreError, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One cache entry per role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSlot {
    epoch: u64,
    credential: Option<Credential>,
    profile: Option<serde_json::Value>,
}

/// SessionStore over any Cache port, so sessions survive as long as the cache
/// entry's TTL.
///
/// Writes for one role are serialized through that role's lock. The lock also
/// holds the highest epoch this process has handed out, so an expired or
/// evicted entry never makes the epoch go backwards.
pub struct CachedSessionStore {
    cache: Arc<dyn Cache>,
    ttl_seconds: u64,
    epoch_floors: DashMap<Role, Arc<Mutex<u64>>>,
}

impl CachedSessionStore {
    pub fn new(cache: Arc<dyn Cache>, ttl_seconds: u64) -> Self {
        Self {
            cache,
            ttl_seconds,
            epoch_floors: DashMap::new(),
        }
    }

    fn key(role: Role) -> String {
        format!("session:{}", role)
    }

    fn lock_for(&self, role: Role) -> Arc<Mutex<u64>> {
        self.epoch_floors
            .entry(role)
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .value()
            .clone()
    }

    async fn load(&self, role: Role, floor: u64) -> Result<StoredSlot, CoreError> {
        let mut slot = match self.cache.get(&Self::key(role)).await? {
            Some(bytes) => serde_json::from_slice::<StoredSlot>(&bytes).map_err(|e| {
                CoreError::Deserialization(format!("Session entry for {}: {}", role, e))
            })?,
            None => StoredSlot::default(),
        };
        if slot.epoch < floor {
            // entry expired or was evicted; keep counting from what we handed out
            slot.epoch = floor;
            slot.credential = None;
            slot.profile = None;
        }
        Ok(slot)
    }

    async fn save(&self, role: Role, slot: &StoredSlot) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(slot)
            .map_err(|e| CoreError::Serialization(format!("Session entry for {}: {}", role, e)))?;
        self.cache
            .set(&Self::key(role), &bytes, Some(self.ttl_seconds))
            .await
    }
}

#[async_trait]
impl SessionStore for CachedSessionStore {
    async fn set_credential(
        &self,
        role: Role,
        token: &str,
        subject_id: &str,
        profile: Option<serde_json::Value>,
    ) -> Result<u64, CoreError> {
        let lock = self.lock_for(role);
        let mut floor = lock.lock().await;
        let mut slot = self.load(role, *floor).await?;
        slot.epoch += 1;
        slot.credential = Some(Credential::new(role, token, subject_id));
        slot.profile = profile;
        self.save(role, &slot).await?;
        *floor = slot.epoch;
        debug!(%role, epoch = slot.epoch, "Credential set");
        Ok(slot.epoch)
    }

    async fn clear_credential(&self, role: Role) -> Result<u64, CoreError> {
        let lock = self.lock_for(role);
        let mut floor = lock.lock().await;
        let mut slot = self.load(role, *floor).await?;
        slot.epoch += 1;
        slot.credential = None;
        slot.profile = None;
        self.save(role, &slot).await?;
        *floor = slot.epoch;
        debug!(%role, epoch = slot.epoch, "Credential cleared");
        Ok(slot.epoch)
    }

    async fn clear_if_epoch(&self, role: Role, expected_epoch: u64) -> Result<bool, CoreError> {
        let lock = self.lock_for(role);
        let mut floor = lock.lock().await;
        let mut slot = self.load(role, *floor).await?;
        if slot.epoch != expected_epoch {
            return Ok(false);
        }
        slot.epoch += 1;
        slot.credential = None;
        slot.profile = None;
        self.save(role, &slot).await?;
        *floor = slot.epoch;
        debug!(%role, epoch = slot.epoch, "Credential cleared after rejection");
        Ok(true)
    }

    async fn snapshot(&self, role: Role) -> Result<SessionSnapshot, CoreError> {
        let lock = self.lock_for(role);
        let floor = lock.lock().await;
        let slot = self.load(role, *floor).await?;
        Ok(SessionSnapshot {
            role,
            epoch: slot.epoch,
            credential: slot.credential,
        })
    }

    async fn set_profile(&self, role: Role, profile: serde_json::Value) -> Result<(), CoreError> {
        let lock = self.lock_for(role);
        let floor = lock.lock().await;
        let mut slot = self.load(role, *floor).await?;
        if slot.credential.is_none() {
            warn!(%role, "Profile offered without a live session");
            return Err(CoreError::Validation(format!(
                "No live {} session to attach a profile to",
                role
            )));
        }
        slot.profile = Some(profile);
        self.save(role, &slot).await
    }

    async fn profile(&self, role: Role) -> Result<Option<serde_json::Value>, CoreError> {
        let lock = self.lock_for(role);
        let floor = lock.lock().await;
        Ok(self.load(role, *floor).await?.profile)
    }
}
