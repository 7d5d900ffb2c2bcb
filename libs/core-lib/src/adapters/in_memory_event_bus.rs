use crate::domain::role::Role;
use crate::domain::session::SessionEvent;
use crate::{CoreError, SessionEventPublisher};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::trace;

/// In-memory implementation of the SessionEventPublisher port using Tokio broadcast channels.
///
/// Each role gets its own channel so a listener for one role never wakes for
/// another. A second "all roles" channel carries every event. Receivers that lag
/// behind lose the oldest messages, which is acceptable for UI-style listeners.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    channels: Arc<DashMap<Role, Sender<SessionEvent>>>,
    all: Sender<SessionEvent>,
    channel_capacity: usize,
}

impl InMemoryEventBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (all, _) = broadcast::channel(channel_capacity);
        Self {
            channels: Arc::new(DashMap::new()),
            all,
            channel_capacity,
        }
    }

    fn get_or_create_sender(&self, role: Role) -> Sender<SessionEvent> {
        self.channels
            .entry(role)
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(self.channel_capacity);
                sender
            })
            .value()
            .clone()
    }

    /// Receives events for `role` only.
    pub fn subscribe(&self, role: Role) -> Receiver<SessionEvent> {
        self.get_or_create_sender(role).subscribe()
    }

    /// Receives events for every role.
    pub fn subscribe_all(&self) -> Receiver<SessionEvent> {
        self.all.subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl SessionEventPublisher for InMemoryEventBus {
    async fn publish(&self, event: SessionEvent) -> Result<(), CoreError> {
        let sender = self.get_or_create_sender(event.role());
        // send only fails when nobody is listening right now
        let role_listeners = sender.send(event.clone()).unwrap_or(0);
        let all_listeners = self.all.send(event).unwrap_or(0);
        trace!(role_listeners, all_listeners, "Session event published");
        Ok(())
    }
}
