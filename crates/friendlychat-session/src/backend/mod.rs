//! Collaborator backends.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::{MemoryAuth, MemoryDatabase, ScriptedSignIn};
