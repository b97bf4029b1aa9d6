// =============================================================================
// GOOGLE DOCS MODULE
// =============================================================================
//
// Talks to Google over HTTP. The core only knows the DocsApi port; this module
// owns URLs, wire shapes and the mapping of Google's errors onto DocsError.

pub mod api_models;
pub mod google_docs_client;

pub use google_docs_client::GoogleDocsClient;
