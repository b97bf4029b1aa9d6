// Tool handlers, independent of the MCP transport.
//
// Each handler validates its parameters, calls into the core and renders the
// outcome as text: JSON for structured results, the raw body for `read-doc`.
// Failures become `{"error": {"kind", "message"}}`.

use rmcp::schemars;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::comments::{AnchorRequest, CommentManager};
use crate::core::documents::{DocumentService, Revision};
use crate::core::errors::{DocsError, ErrorKind};
use crate::core::remote::DocsApi;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateDocParams {
    /// Title of the new document. Defaults to "New Document".
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DocumentParams {
    /// Document ID or full Google Docs URL.
    pub document_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RewriteDocParams {
    /// Document ID or full Google Docs URL.
    pub document_id: String,
    /// The complete new content of the document.
    pub content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct InsertTextParams {
    pub document_id: String,
    /// Position to insert at, counted in characters from the start of the body.
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteContentParams {
    pub document_id: String,
    /// First character to delete (inclusive).
    pub start_index: usize,
    /// End of the deleted range (exclusive).
    pub end_index: usize,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReplaceTextParams {
    pub document_id: String,
    pub search_text: String,
    pub replace_text: String,
    #[serde(default)]
    pub match_case: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateCommentParams {
    pub document_id: String,
    pub content: String,
    /// Start of the commented range. Omit for an unanchored comment.
    #[serde(default)]
    pub start_offset: Option<usize>,
    /// Length of the commented range. Required with `start_offset`.
    #[serde(default)]
    pub length: Option<usize>,
    /// Total characters in the anchored region. Defaults to `length`.
    #[serde(default)]
    pub total_length: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReplyCommentParams {
    pub document_id: String,
    pub comment_id: String,
    pub reply: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteReplyParams {
    pub document_id: String,
    pub comment_id: String,
    pub reply_id: String,
}

/// Structured failure handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self }).to_string()
    }
}

impl From<DocsError> for ToolFailure {
    fn from(err: DocsError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type ToolResult = Result<String, ToolFailure>;

#[derive(Serialize)]
struct EditResult<'a> {
    document_id: &'a str,
    revision: Revision,
}

pub struct DocsTools<A: DocsApi> {
    documents: DocumentService<A>,
    comments: CommentManager<A>,
}

impl<A: DocsApi> DocsTools<A> {
    pub fn new(documents: DocumentService<A>, comments: CommentManager<A>) -> Self {
        Self {
            documents,
            comments,
        }
    }

    pub async fn create_doc(&self, params: CreateDocParams) -> ToolResult {
        let result = self.documents.create(params.title.as_deref()).await;
        render("create-doc", result)
    }

    pub async fn read_doc(&self, params: DocumentParams) -> ToolResult {
        match self.documents.read(&params.document_id).await {
            Ok(text) => Ok(text),
            Err(err) => Err(failed("read-doc", err)),
        }
    }

    pub async fn rewrite_doc(&self, params: RewriteDocParams) -> ToolResult {
        let result = self
            .documents
            .rewrite(&params.document_id, &params.content)
            .await;
        render("rewrite-doc", result)
    }

    pub async fn insert_text(&self, params: InsertTextParams) -> ToolResult {
        let result = self
            .documents
            .insert_text(&params.document_id, params.index, &params.text)
            .await;
        render(
            "insert-text",
            result.map(|outcome| EditResult {
                document_id: &params.document_id,
                revision: outcome.revision,
            }),
        )
    }

    pub async fn delete_content(&self, params: DeleteContentParams) -> ToolResult {
        let result = self
            .documents
            .delete_range(&params.document_id, params.start_index, params.end_index)
            .await;
        render(
            "delete-content",
            result.map(|outcome| EditResult {
                document_id: &params.document_id,
                revision: outcome.revision,
            }),
        )
    }

    pub async fn replace_text(&self, params: ReplaceTextParams) -> ToolResult {
        let result = self
            .documents
            .replace_text(
                &params.document_id,
                &params.search_text,
                &params.replace_text,
                params.match_case,
            )
            .await;
        render(
            "replace-text",
            result.map(|occurrences| {
                serde_json::json!({
                    "document_id": params.document_id,
                    "occurrences_changed": occurrences,
                })
            }),
        )
    }

    pub async fn read_comments(&self, params: DocumentParams) -> ToolResult {
        let result = self.comments.list(&params.document_id).await;
        render("read-comments", result)
    }

    pub async fn create_comment(&self, params: CreateCommentParams) -> ToolResult {
        let anchor = match (params.start_offset, params.length) {
            (Some(offset), Some(length)) => Some(AnchorRequest {
                offset,
                length,
                total_length: params.total_length,
            }),
            (None, None) => None,
            _ => {
                return Err(failed(
                    "create-comment",
                    DocsError::Validation(
                        "start_offset and length must be given together".into(),
                    ),
                ))
            }
        };
        let result = self
            .comments
            .create(&params.document_id, &params.content, anchor)
            .await;
        render("create-comment", result)
    }

    pub async fn reply_comment(&self, params: ReplyCommentParams) -> ToolResult {
        let result = self
            .comments
            .reply(&params.document_id, &params.comment_id, &params.reply)
            .await;
        render("reply-comment", result)
    }

    pub async fn delete_reply(&self, params: DeleteReplyParams) -> ToolResult {
        let result = self
            .comments
            .delete_reply(&params.document_id, &params.comment_id, &params.reply_id)
            .await;
        render(
            "delete-reply",
            result.map(|()| serde_json::json!({ "deleted": true })),
        )
    }
}

fn failed(tool: &str, err: DocsError) -> ToolFailure {
    warn!(tool, kind = ?err.kind(), "Tool call failed: {}", err);
    ToolFailure::from(err)
}

fn render<T: Serialize>(tool: &str, result: Result<T, DocsError>) -> ToolResult {
    let value = result.map_err(|err| failed(tool, err))?;
    info!(tool, "Tool call succeeded");
    serde_json::to_string_pretty(&value).map_err(|e| {
        failed(
            tool,
            DocsError::Transient(format!("could not encode result: {}", e)),
        )
    })
}
