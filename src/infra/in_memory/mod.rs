pub mod in_memory_docs;

pub use in_memory_docs::{InMemoryDocs, RemoteCall};
