//! Storage Adapters
//!
//! Adapters receive fully-forged physical queries together with the frozen
//! datastore they target. The ORM core never inspects how an adapter stores
//! data; it only relies on the uniform [`Adapter`] contract.

pub mod core;
pub mod memory;

// Re-export core traits and types
pub use core::*;
pub use memory::MemoryAdapter;
