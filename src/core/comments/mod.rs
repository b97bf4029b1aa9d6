pub mod comment_models;
pub mod comment_service;

pub use comment_models::{Anchor, AnchorRequest, Author, Comment, CommentPage, Reply};
pub use comment_service::CommentManager;
