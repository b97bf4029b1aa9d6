pub mod document_models;
pub mod edit_planner;
pub mod retry;
pub mod sync_service;

pub use document_models::{
    normalize_document_id, BatchOutcome, CreatedDocument, DocumentSnapshot, EditOp, Revision,
};
pub use retry::RetryPolicy;
pub use sync_service::DocumentService;
