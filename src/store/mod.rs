//! Session store implementations

mod memory;
mod traits;

pub use memory::{MemoryStore, SweeperHandle};
pub use traits::{FieldChanges, SessionStore};
