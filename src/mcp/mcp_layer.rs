// The MCP layer adapts the core to the tool-calling transport.
// Handlers live in `docs_tools` so they can be tested without a transport.

#[path = "docs_tools.rs"]
pub mod docs_tools;

#[path = "docs_server.rs"]
pub mod docs_server;

pub use docs_server::{DocsServer, SharedDocsApi};
pub use docs_tools::DocsTools;
