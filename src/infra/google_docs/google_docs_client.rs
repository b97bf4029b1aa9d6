// =============================================================================
// GOOGLE DOCS CLIENT
// =============================================================================
//
// HTTP implementation of the DocsApi port: Docs v1 for content, Drive v3 for
// comments. Each call fetches a bearer token from the credential manager, so
// refreshes happen transparently. A 401 invalidates the cached token and the
// request is replayed once with a fresh one; only a second 401 is reported as
// an authentication failure.
//
// Holds no document state between calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api_models::{
    batch_update_body, classify_failure, encode_anchor, request_chars, to_comment, to_reply,
    to_snapshot, BatchUpdateResponse, CommentList, Document, DriveComment, DriveReply,
    COMMENT_FIELDS, REPLY_FIELDS,
};
use crate::core::comments::{Anchor, Comment, CommentPage, Reply};
use crate::core::credentials::AccessTokenProvider;
use crate::core::documents::document_models::ElementKind;
use crate::core::documents::{BatchOutcome, CreatedDocument, DocumentSnapshot, EditOp, Revision};
use crate::core::errors::DocsError;
use crate::core::remote::DocsApi;

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const COMMENT_PAGE_SIZE: &str = "100";

pub struct GoogleDocsClient {
    http: Client,
    tokens: Arc<dyn AccessTokenProvider>,
    docs_api: String,
    drive_files_api: String,
}

impl GoogleDocsClient {
    pub fn new(
        tokens: Arc<dyn AccessTokenProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            tokens,
            docs_api: DOCS_API.to_string(),
            drive_files_api: DRIVE_FILES_API.to_string(),
        })
    }

    /// Point both APIs at a local server.
    #[cfg(test)]
    fn with_endpoint(tokens: Arc<dyn AccessTokenProvider>, base: &str) -> Self {
        Self {
            http: Client::builder().no_proxy().build().unwrap(),
            tokens,
            docs_api: base.to_string(),
            drive_files_api: base.to_string(),
        }
    }

    /// Attach credentials, send, and classify any non-success status.
    ///
    /// Cached tokens can die early (revocation, clock skew), so a 401 forces a
    /// refresh and the request goes out once more before giving up.
    async fn send(&self, request: RequestBuilder) -> Result<Response, DocsError> {
        let replay = request.try_clone();
        let response = self.send_once(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        tracing::warn!("Google rejected the access token; refreshing and retrying once");
        self.tokens.invalidate().await;
        match replay {
            Some(request) => check_status(self.send_once(request).await?).await,
            None => check_status(response).await,
        }
    }

    async fn send_once(&self, request: RequestBuilder) -> Result<Response, DocsError> {
        let token = self.tokens.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, DocsError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DocsError::Transient(format!("could not decode {}: {}", what, e)))
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/{}", self.docs_api, document_id)
    }

    fn comments_url(&self, document_id: &str) -> String {
        format!("{}/{}/comments", self.drive_files_api, document_id)
    }
}

async fn check_status(response: Response) -> Result<Response, DocsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body))
}

fn transport_error(err: reqwest::Error) -> DocsError {
    if err.is_timeout() {
        DocsError::Transient(format!("request timed out: {}", err))
    } else {
        DocsError::Transient(format!("could not reach Google: {}", err))
    }
}

#[async_trait]
impl DocsApi for GoogleDocsClient {
    async fn create_document(&self, title: &str) -> Result<CreatedDocument, DocsError> {
        let request = self.http.post(&self.docs_api).json(&json!({ "title": title }));
        let document: Document = self.send_json(request, "created document").await?;
        Ok(CreatedDocument::new(document.document_id, document.title))
    }

    async fn fetch_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError> {
        tracing::debug!(document_id, "Fetching document");
        let request = self.http.get(self.document_url(document_id));
        let document: Document = self.send_json(request, "document").await?;
        let snapshot = to_snapshot(document)?;
        tracing::debug!(
            document_id,
            title = %snapshot.title,
            revision = %snapshot.revision,
            length = snapshot.length(),
            elements = snapshot.elements.len(),
            tables = snapshot
                .elements
                .iter()
                .filter(|e| e.kind == ElementKind::Table)
                .count(),
            "Fetched document"
        );
        Ok(snapshot)
    }

    async fn apply_batch(
        &self,
        document_id: &str,
        revision: Option<&Revision>,
        operations: &[EditOp],
    ) -> Result<BatchOutcome, DocsError> {
        tracing::debug!(
            document_id,
            operations = operations.len(),
            inserted_chars = request_chars(operations),
            required_revision = ?revision.map(|r| r.0.as_str()),
            "Submitting batch"
        );
        let request = self
            .http
            .post(format!("{}:batchUpdate", self.document_url(document_id)))
            .json(&batch_update_body(revision, operations));
        let response: BatchUpdateResponse = self.send_json(request, "batch response").await?;

        let occurrences_changed = response.occurrences_changed();
        let revision = match response.revision() {
            Some(revision) => revision,
            None => self.fetch_snapshot(document_id).await?.revision,
        };
        Ok(BatchOutcome {
            revision,
            occurrences_changed,
        })
    }

    async fn fetch_comments(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, DocsError> {
        let fields = format!("comments({}),nextPageToken", COMMENT_FIELDS);
        let mut request = self.http.get(self.comments_url(document_id)).query(&[
            ("fields", fields.as_str()),
            ("pageSize", COMMENT_PAGE_SIZE),
            ("includeDeleted", "false"),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let list: CommentList = self.send_json(request, "comment list").await?;
        Ok(CommentPage {
            comments: list.comments.into_iter().map(to_comment).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_comment(
        &self,
        document_id: &str,
        comment_id: &str,
    ) -> Result<Option<Comment>, DocsError> {
        let request = self
            .http
            .get(format!("{}/{}", self.comments_url(document_id), comment_id))
            .query(&[("fields", COMMENT_FIELDS), ("includeDeleted", "true")]);
        match self.send_json::<DriveComment>(request, "comment").await {
            Ok(comment) => Ok(Some(to_comment(comment))),
            Err(DocsError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_comment(
        &self,
        document_id: &str,
        content: &str,
        anchor: Option<&Anchor>,
    ) -> Result<Comment, DocsError> {
        let mut body = json!({ "content": content });
        if let Some(anchor) = anchor {
            body["anchor"] = json!(encode_anchor(anchor));
        }
        let request = self
            .http
            .post(self.comments_url(document_id))
            .query(&[("fields", COMMENT_FIELDS)])
            .json(&body);
        let comment: DriveComment = self.send_json(request, "created comment").await?;
        Ok(to_comment(comment))
    }

    async fn create_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Reply, DocsError> {
        let request = self
            .http
            .post(format!(
                "{}/{}/replies",
                self.comments_url(document_id),
                comment_id
            ))
            .query(&[("fields", REPLY_FIELDS)])
            .json(&json!({ "content": content }));
        let reply: DriveReply = self.send_json(request, "created reply").await?;
        Ok(to_reply(comment_id, reply))
    }

    async fn delete_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<(), DocsError> {
        let request = self.http.delete(format!(
            "{}/{}/replies/{}",
            self.comments_url(document_id),
            comment_id,
            reply_id
        ));
        self.send(request).await?;
        Ok(())
    }
}
