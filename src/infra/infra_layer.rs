// The infra module contains implementations of core traits.
// Each integration goes in its own submodule.

#[path = "auth/mod.rs"]
pub mod auth;

#[path = "google_docs/mod.rs"]
pub mod google_docs;

#[cfg(test)]
#[path = "in_memory/mod.rs"]
pub mod in_memory;
