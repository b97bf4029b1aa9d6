// Remote document client port.
//
// The core defines WHAT it needs from the remote document service; the infra layer
// provides the HTTP implementation. Implementations inject credentials, translate
// shapes and classify failures into `DocsError`, and hold no state across calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::comments::comment_models::{Anchor, Comment, CommentPage, Reply};
use crate::core::documents::document_models::{
    BatchOutcome, CreatedDocument, DocumentSnapshot, EditOp, Revision,
};
use crate::core::errors::DocsError;

#[async_trait]
pub trait DocsApi: Send + Sync {
    async fn create_document(&self, title: &str) -> Result<CreatedDocument, DocsError>;

    async fn fetch_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError>;

    /// Submit `operations` as one atomic batch. With `revision` set, the remote must
    /// reject the batch if the document has moved past it.
    async fn apply_batch(
        &self,
        document_id: &str,
        revision: Option<&Revision>,
        operations: &[EditOp],
    ) -> Result<BatchOutcome, DocsError>;

    async fn fetch_comments(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, DocsError>;

    /// `Ok(None)` when the comment does not exist (or was deleted).
    async fn fetch_comment(
        &self,
        document_id: &str,
        comment_id: &str,
    ) -> Result<Option<Comment>, DocsError>;

    async fn create_comment(
        &self,
        document_id: &str,
        content: &str,
        anchor: Option<&Anchor>,
    ) -> Result<Comment, DocsError>;

    async fn create_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Reply, DocsError>;

    async fn delete_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<(), DocsError>;
}

// Shared handles let the synchronizer and the comment manager use one client.
#[async_trait]
impl<T: DocsApi + ?Sized> DocsApi for Arc<T> {
    async fn create_document(&self, title: &str) -> Result<CreatedDocument, DocsError> {
        (**self).create_document(title).await
    }

    async fn fetch_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError> {
        (**self).fetch_snapshot(document_id).await
    }

    async fn apply_batch(
        &self,
        document_id: &str,
        revision: Option<&Revision>,
        operations: &[EditOp],
    ) -> Result<BatchOutcome, DocsError> {
        (**self).apply_batch(document_id, revision, operations).await
    }

    async fn fetch_comments(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, DocsError> {
        (**self).fetch_comments(document_id, page_token).await
    }

    async fn fetch_comment(
        &self,
        document_id: &str,
        comment_id: &str,
    ) -> Result<Option<Comment>, DocsError> {
        (**self).fetch_comment(document_id, comment_id).await
    }

    async fn create_comment(
        &self,
        document_id: &str,
        content: &str,
        anchor: Option<&Anchor>,
    ) -> Result<Comment, DocsError> {
        (**self).create_comment(document_id, content, anchor).await
    }

    async fn create_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Reply, DocsError> {
        (**self).create_reply(document_id, comment_id, content).await
    }

    async fn delete_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<(), DocsError> {
        (**self).delete_reply(document_id, comment_id, reply_id).await
    }
}
