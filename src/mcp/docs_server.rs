use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};

use super::docs_tools::{
    CreateCommentParams, CreateDocParams, DeleteContentParams, DeleteReplyParams, DocsTools,
    DocumentParams, InsertTextParams, ReplaceTextParams, ReplyCommentParams, RewriteDocParams,
    ToolResult,
};
use crate::core::remote::DocsApi;

pub type SharedDocsApi = Arc<dyn DocsApi>;

/// MCP server exposing the Google Docs tools over stdio.
#[derive(Clone)]
pub struct DocsServer {
    tools: Arc<DocsTools<SharedDocsApi>>,
    tool_router: ToolRouter<Self>,
}

fn into_call_result(result: ToolResult) -> CallToolResult {
    match result {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(failure) => CallToolResult::error(vec![Content::text(failure.to_json())]),
    }
}

#[tool_router]
impl DocsServer {
    pub fn new(tools: DocsTools<SharedDocsApi>) -> Self {
        Self {
            tools: Arc::new(tools),
            tool_router: Self::tool_router(),
        }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve(stdio()).await?;
        service.waiting().await?;
        Ok(())
    }

    #[tool(name = "create-doc", description = "Creates a new Google Doc and returns its ID and URL.")]
    async fn create_doc(
        &self,
        Parameters(params): Parameters<CreateDocParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.create_doc(params).await))
    }

    #[tool(name = "read-doc", description = "Reads the plain text content of a Google Doc.")]
    async fn read_doc(
        &self,
        Parameters(params): Parameters<DocumentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.read_doc(params).await))
    }

    #[tool(
        name = "rewrite-doc",
        description = "Replaces the entire content of a Google Doc with the given text. Does nothing if the content already matches."
    )]
    async fn rewrite_doc(
        &self,
        Parameters(params): Parameters<RewriteDocParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.rewrite_doc(params).await))
    }

    #[tool(
        name = "insert-text",
        description = "Inserts text at a character index of a Google Doc (0 is the start of the body)."
    )]
    async fn insert_text(
        &self,
        Parameters(params): Parameters<InsertTextParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.insert_text(params).await))
    }

    #[tool(
        name = "delete-content",
        description = "Deletes the character range [start_index, end_index) from a Google Doc."
    )]
    async fn delete_content(
        &self,
        Parameters(params): Parameters<DeleteContentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.delete_content(params).await))
    }

    #[tool(
        name = "replace-text",
        description = "Replaces every occurrence of a string in a Google Doc and reports how many were changed."
    )]
    async fn replace_text(
        &self,
        Parameters(params): Parameters<ReplaceTextParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.replace_text(params).await))
    }

    #[tool(
        name = "read-comments",
        description = "Lists the comments on a Google Doc with their replies."
    )]
    async fn read_comments(
        &self,
        Parameters(params): Parameters<DocumentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.read_comments(params).await))
    }

    #[tool(
        name = "create-comment",
        description = "Creates a comment on a Google Doc, optionally anchored to a character range."
    )]
    async fn create_comment(
        &self,
        Parameters(params): Parameters<CreateCommentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.create_comment(params).await))
    }

    #[tool(name = "reply-comment", description = "Replies to an existing comment.")]
    async fn reply_comment(
        &self,
        Parameters(params): Parameters<ReplyCommentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.reply_comment(params).await))
    }

    #[tool(
        name = "delete-reply",
        description = "Deletes a reply. The reply must belong to the given comment."
    )]
    async fn delete_reply(
        &self,
        Parameters(params): Parameters<DeleteReplyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.tools.delete_reply(params).await))
    }
}

#[tool_handler]
impl ServerHandler for DocsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Google Docs server (tools: create-doc, read-doc, rewrite-doc, insert-text, delete-content, replace-text, read-comments, create-comment, reply-comment, delete-reply). Character indices count from 0 at the start of the document body."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
