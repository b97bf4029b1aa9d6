// Comment Thread Consistency Manager.
//
// Threads are validated against a fresh fetch right before every mutation. The
// remote is never trusted to reject a reply that belongs to another thread.

use tracing::{info, warn};

use super::comment_models::{Anchor, AnchorRequest, Comment, CommentPage, Reply};
use crate::core::documents::{normalize_document_id, RetryPolicy};
use crate::core::errors::{validate_id, DocsError};
use crate::core::remote::DocsApi;

pub struct CommentManager<A: DocsApi> {
    api: A,
    read_policy: RetryPolicy,
}

impl<A: DocsApi> CommentManager<A> {
    pub fn new(api: A, read_policy: RetryPolicy) -> Self {
        Self { api, read_policy }
    }

    /// Create a top-level comment, optionally anchored to a range of the current content.
    ///
    /// Never retried: a create that timed out may still have landed.
    pub async fn create(
        &self,
        document_id: &str,
        content: &str,
        anchor: Option<AnchorRequest>,
    ) -> Result<Comment, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        require_content("comment content", content)?;

        let anchor = match anchor {
            Some(request) => Some(self.bind_anchor(&document_id, request).await?),
            None => None,
        };
        let comment = self
            .api
            .create_comment(&document_id, content, anchor.as_ref())
            .await?;
        info!(document_id = %document_id, comment_id = %comment.id, anchored = anchor.is_some(), "Created comment");
        Ok(comment)
    }

    /// All comments in thread order, replies nested. Deleted replies are not included.
    pub async fn list(&self, document_id: &str) -> Result<Vec<Comment>, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(&document_id, page_token.as_deref()).await?;
            comments.extend(page.comments);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(comments)
    }

    /// One page of comments. Feed `next_page_token` back in to continue where it stopped.
    pub async fn list_page(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        let id = document_id.as_str();
        self.read_policy
            .run("list_comments", move || self.api.fetch_comments(id, page_token))
            .await
    }

    pub async fn reply(
        &self,
        document_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Reply, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        validate_id("comment_id", comment_id)?;
        require_content("reply content", content)?;

        self.live_comment(&document_id, comment_id).await?;
        let reply = self
            .api
            .create_reply(&document_id, comment_id, content)
            .await?;
        info!(document_id = %document_id, comment_id, reply_id = %reply.id, "Replied to comment");
        Ok(reply)
    }

    /// Delete `reply_id`, which must currently be a live reply of `comment_id`.
    pub async fn delete_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<(), DocsError> {
        let document_id = normalize_document_id(document_id)?;
        validate_id("comment_id", comment_id)?;
        validate_id("reply_id", reply_id)?;

        let comment = self.live_comment(&document_id, comment_id).await?;
        if comment.live_reply(reply_id).is_none() {
            warn!(document_id = %document_id, comment_id, reply_id, "Reply is not part of this thread");
            return Err(DocsError::NotFound(format!(
                "reply '{}' is not a reply to comment '{}'",
                reply_id, comment_id
            )));
        }

        self.api
            .delete_reply(&document_id, comment_id, reply_id)
            .await?;
        info!(document_id = %document_id, comment_id, reply_id, "Deleted reply");
        Ok(())
    }

    async fn live_comment(&self, document_id: &str, comment_id: &str) -> Result<Comment, DocsError> {
        let fetched = self
            .read_policy
            .run("fetch_comment", move || {
                self.api.fetch_comment(document_id, comment_id)
            })
            .await?;
        match fetched {
            Some(comment) if !comment.deleted => Ok(comment),
            _ => Err(DocsError::NotFound(format!(
                "comment '{}' in document '{}'",
                comment_id, document_id
            ))),
        }
    }

    async fn bind_anchor(
        &self,
        document_id: &str,
        request: AnchorRequest,
    ) -> Result<Anchor, DocsError> {
        if request.length == 0 {
            return Err(DocsError::Validation("anchor length must be positive".into()));
        }
        let total_length = request.total_length.unwrap_or(request.length);
        if total_length < request.length {
            return Err(DocsError::Validation(format!(
                "anchor total length {} is shorter than its length {}",
                total_length, request.length
            )));
        }

        let snapshot = self
            .read_policy
            .run("fetch_snapshot", move || self.api.fetch_snapshot(document_id))
            .await?;
        let end = request.offset.saturating_add(request.length);
        if end > snapshot.length() {
            return Err(DocsError::Validation(format!(
                "anchor [{}, {}) is outside the document (length {})",
                request.offset,
                end,
                snapshot.length()
            )));
        }

        Ok(Anchor {
            revision: snapshot.revision.0,
            offset: request.offset,
            length: request.length,
            total_length,
        })
    }
}

fn require_content(field: &str, content: &str) -> Result<(), DocsError> {
    if content.trim().is_empty() {
        return Err(DocsError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
