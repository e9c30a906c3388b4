//! Client identity helpers
//!
//! Guest display-name generation and the persisted username cache used by
//! clients before they join a chat.

mod names;
mod username;

pub use names::{is_guest_name, GuestNameGenerator};
pub use username::{FileStore, KeyValueStore, MemoryStore, UsernameService, STORAGE_KEY};
