//! Session persistence and lifecycle module.
//!
//! The store is the only state that survives restarts; the cache holds
//! live connections and is rebuilt from the store on demand.

mod cache;
mod manager;
mod store;

pub use cache::{LiveSession, SessionCache};
pub use manager::SessionManager;
pub use store::{PersistenceError, SessionMap, SessionRecord, SessionStore};
