//! Shared utilities

pub mod hash;
pub mod memory;

pub use hash::{content_digest, fnv1a_hash64};
pub use memory::{flush_icache, read_memory, ProtectionGuard};
