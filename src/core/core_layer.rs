// The core module contains all business logic.
// Each feature gets its own submodule; remote I/O is reached only through ports.

#[path = "errors.rs"]
pub mod errors;

#[path = "credentials/mod.rs"]
pub mod credentials;

#[path = "documents/mod.rs"]
pub mod documents;

#[path = "comments/mod.rs"]
pub mod comments;

#[path = "remote/mod.rs"]
pub mod remote;
