pub mod cached_session_store;
pub mod in_memory_cache;
pub mod in_memory_event_bus;
pub mod in_memory_session_store;

pub use cached_session_store::CachedSessionStore;
pub use in_memory_cache::InMemoryCache;
pub use in_memory_event_bus::InMemoryEventBus;
pub use in_memory_session_store::InMemorySessionStore;
