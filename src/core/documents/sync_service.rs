// Document Content Synchronizer.
//
// Every write starts from a snapshot fetched right before planning. Whole-document
// rewrites are planned against that snapshot, submitted with its revision, and
// re-planned from scratch when the remote reports the document moved on.

use tracing::{debug, info};

use super::document_models::{
    normalize_document_id, utf16_len, BatchOutcome, CreatedDocument, DocumentSnapshot, EditOp,
    RewriteOutcome, DEFAULT_DOCUMENT_TITLE,
};
use super::edit_planner::{EditPlanner, ReplaceAllPlanner};
use super::retry::RetryPolicy;
use crate::core::errors::DocsError;
use crate::core::remote::DocsApi;

pub struct DocumentService<A: DocsApi> {
    api: A,
    planner: Box<dyn EditPlanner>,
    rewrite_policy: RetryPolicy,
    read_policy: RetryPolicy,
}

impl<A: DocsApi> DocumentService<A> {
    pub fn new(api: A, rewrite_policy: RetryPolicy) -> Self {
        Self {
            api,
            planner: Box::new(ReplaceAllPlanner),
            rewrite_policy,
            read_policy: RetryPolicy::default(),
        }
    }

    #[cfg(test)]
    pub fn with_planner(mut self, planner: Box<dyn EditPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_read_policy(mut self, read_policy: RetryPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    /// Make the document's content exactly `desired_text`.
    ///
    /// Returns the committed revision. When the content already matches nothing is
    /// submitted and the current revision is returned with `changed == false`.
    pub async fn rewrite(
        &self,
        document_id: &str,
        desired_text: &str,
    ) -> Result<RewriteOutcome, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        let id = document_id.as_str();
        self.rewrite_policy
            .run("rewrite", move || self.try_rewrite(id, desired_text))
            .await
    }

    async fn try_rewrite(
        &self,
        document_id: &str,
        desired_text: &str,
    ) -> Result<RewriteOutcome, DocsError> {
        let snapshot = self.fresh_snapshot(document_id).await?;
        let operations = self.planner.plan(&snapshot, desired_text);
        if operations.is_empty() {
            debug!(document_id, revision = %snapshot.revision, "Content already matches");
            return Ok(RewriteOutcome {
                document_id: document_id.to_string(),
                revision: snapshot.revision,
                changed: false,
            });
        }

        let outcome = self
            .api
            .apply_batch(document_id, Some(&snapshot.revision), &operations)
            .await?;
        info!(
            document_id,
            from = %snapshot.revision,
            to = %outcome.revision,
            old_length = snapshot.length(),
            new_length = utf16_len(desired_text),
            "Rewrote document"
        );
        Ok(RewriteOutcome {
            document_id: document_id.to_string(),
            revision: outcome.revision,
            changed: true,
        })
    }

    /// Reconstructed plain text of the document.
    pub async fn read(&self, document_id: &str) -> Result<String, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        let id = document_id.as_str();
        let snapshot = self
            .read_policy
            .run("read", move || self.fresh_snapshot(id))
            .await?;
        Ok(snapshot.text())
    }

    /// Not retried: a timed-out create may still have produced a document.
    pub async fn create(&self, title: Option<&str>) -> Result<CreatedDocument, DocsError> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_TITLE);
        let created = self.api.create_document(title).await?;
        info!(document_id = %created.document_id, title, "Created document");
        Ok(created)
    }

    /// Insert `text` at editable index `index` of the current content.
    ///
    /// The index refers to the state the caller last saw, so a revision change
    /// between validation and submission is reported rather than retried.
    pub async fn insert_text(
        &self,
        document_id: &str,
        index: usize,
        text: &str,
    ) -> Result<BatchOutcome, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        if text.is_empty() {
            return Err(DocsError::Validation("text to insert must not be empty".into()));
        }
        let snapshot = self.read_snapshot(&document_id).await?;
        if index > snapshot.length() {
            return Err(DocsError::Validation(format!(
                "index {} is past the end of the document (length {})",
                index,
                snapshot.length()
            )));
        }

        let operations = [EditOp::Insert {
            at: index,
            text: text.to_string(),
        }];
        let outcome = self
            .api
            .apply_batch(&document_id, Some(&snapshot.revision), &operations)
            .await?;
        info!(document_id = %document_id, index, revision = %outcome.revision, "Inserted text");
        Ok(outcome)
    }

    /// Delete the editable range `[start, end)`.
    pub async fn delete_range(
        &self,
        document_id: &str,
        start: usize,
        end: usize,
    ) -> Result<BatchOutcome, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        if start >= end {
            return Err(DocsError::Validation(format!(
                "start index {} must be less than end index {}",
                start, end
            )));
        }
        let snapshot = self.read_snapshot(&document_id).await?;
        if end > snapshot.length() {
            return Err(DocsError::Validation(format!(
                "end index {} is past the end of the document (length {})",
                end,
                snapshot.length()
            )));
        }

        let operations = [EditOp::DeleteRange { start, end }];
        let outcome = self
            .api
            .apply_batch(&document_id, Some(&snapshot.revision), &operations)
            .await?;
        info!(document_id = %document_id, start, end, revision = %outcome.revision, "Deleted range");
        Ok(outcome)
    }

    /// Replace every occurrence of `find`. Content-addressed, so no revision is required.
    pub async fn replace_text(
        &self,
        document_id: &str,
        find: &str,
        replace: &str,
        match_case: bool,
    ) -> Result<u32, DocsError> {
        let document_id = normalize_document_id(document_id)?;
        if find.is_empty() {
            return Err(DocsError::Validation("search text must not be empty".into()));
        }
        let operations = [EditOp::ReplaceAll {
            find: find.to_string(),
            replace: replace.to_string(),
            match_case,
        }];
        let outcome = self.api.apply_batch(&document_id, None, &operations).await?;
        info!(
            document_id = %document_id,
            occurrences = outcome.occurrences_changed,
            "Replaced text"
        );
        Ok(outcome.occurrences_changed)
    }

    async fn read_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError> {
        self.read_policy
            .run("fetch_snapshot", move || self.fresh_snapshot(document_id))
            .await
    }

    async fn fresh_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError> {
        let snapshot = self.api.fetch_snapshot(document_id).await?;
        if !snapshot.is_well_formed() {
            return Err(DocsError::Transient(format!(
                "document '{}' came back with overlapping or missing ranges",
                document_id
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::documents::document_models::Revision;
    use crate::infra::in_memory::{InMemoryDocs, RemoteCall};
    use std::sync::Arc;

    fn service(docs: &Arc<InMemoryDocs>) -> DocumentService<Arc<InMemoryDocs>> {
        DocumentService::new(docs.clone(), RetryPolicy::immediate(3))
            .with_read_policy(RetryPolicy::immediate(3))
    }

    fn docs_with(id: &str, text: &str) -> Arc<InMemoryDocs> {
        let docs = Arc::new(InMemoryDocs::new());
        docs.insert_document(id, text);
        docs
    }

    #[tokio::test]
    async fn rewrite_replaces_content_with_delete_then_insert() {
        let docs = docs_with("doc", "Hello World");
        let outcome = service(&docs).rewrite("doc", "Goodbye").await.unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.revision, docs.revision_of("doc"));
        assert_eq!(docs.text_of("doc"), "Goodbye");

        let batches = docs.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].revision, Some(Revision("rev-1".into())));
        assert_eq!(
            batches[0].operations,
            vec![
                EditOp::DeleteRange { start: 0, end: 11 },
                EditOp::Insert {
                    at: 0,
                    text: "Goodbye".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn second_identical_rewrite_submits_nothing() {
        let docs = docs_with("doc", "old");
        let svc = service(&docs);

        let first = svc.rewrite("doc", "new text\nline two").await.unwrap();
        let second = svc.rewrite("doc", "new text\nline two").await.unwrap();

        assert!(!second.changed);
        assert_eq!(first.revision, second.revision);
        assert_eq!(docs.calls(RemoteCall::ApplyBatch), 1);
    }

    #[tokio::test]
    async fn rewrite_then_read_round_trips() {
        let docs = docs_with("doc", "x");
        let svc = service(&docs);
        let text = "Línea uno\n\tdos 🌍\n\nfin";

        svc.rewrite("doc", text).await.unwrap();
        assert_eq!(svc.read("doc").await.unwrap(), text);
    }

    #[tokio::test]
    async fn rewrite_to_empty_only_deletes() {
        let docs = docs_with("doc", "Hello World");
        let svc = service(&docs);

        svc.rewrite("doc", "").await.unwrap();

        let batches = docs.batches();
        assert_eq!(
            batches[0].operations,
            vec![EditOp::DeleteRange { start: 0, end: 11 }]
        );
        assert_eq!(svc.read("doc").await.unwrap(), "");
    }

    #[tokio::test]
    async fn stale_revision_is_replanned_against_new_length() {
        let docs = docs_with("doc", "Hello");
        docs.edit_after_next_fetch("doc", "Hello there, world");

        let outcome = service(&docs).rewrite("doc", "A").await.unwrap();

        assert!(outcome.changed);
        assert_eq!(docs.text_of("doc"), "A");
        let batches = docs.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(
            batches[0].operations[0],
            EditOp::DeleteRange { start: 0, end: 5 }
        );
        assert_eq!(
            batches[1].operations[0],
            EditOp::DeleteRange { start: 0, end: 18 }
        );
        assert_eq!(batches[1].revision, Some(Revision("rev-2".into())));
    }

    #[tokio::test]
    async fn rewrite_after_outside_edit_plans_from_fresh_snapshot() {
        let docs = docs_with("doc", "Hello");
        let svc = service(&docs);

        svc.rewrite("doc", "first").await.unwrap();
        docs.edit_remotely("doc", "someone else wrote this");
        let edited_revision = docs.revision_of("doc");
        svc.rewrite("doc", "second").await.unwrap();

        assert_eq!(docs.text_of("doc"), "second");
        let batches = docs.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(
            batches[1].operations[0],
            EditOp::DeleteRange { start: 0, end: 23 }
        );
        assert_eq!(batches[1].revision, Some(edited_revision));
    }

    #[tokio::test]
    async fn stale_revision_surfaces_after_attempts_run_out() {
        let docs = docs_with("doc", "v1");
        docs.edit_after_next_fetch("doc", "v2");
        docs.edit_after_next_fetch("doc", "v3");
        docs.edit_after_next_fetch("doc", "v4");

        let err = service(&docs).rewrite("doc", "mine").await.unwrap_err();

        assert!(matches!(err, DocsError::StaleState(_)));
        assert_eq!(docs.calls(RemoteCall::FetchSnapshot), 3);
        assert_eq!(docs.text_of("doc"), "v4");
    }

    #[tokio::test]
    async fn transient_fetch_is_retried() {
        let docs = docs_with("doc", "before");
        docs.fail_next(
            RemoteCall::FetchSnapshot,
            DocsError::Transient("timed out".into()),
        );

        service(&docs).rewrite("doc", "after").await.unwrap();

        assert_eq!(docs.calls(RemoteCall::FetchSnapshot), 2);
        assert_eq!(docs.text_of("doc"), "after");
    }

    #[tokio::test]
    async fn missing_document_is_not_retried() {
        let docs = Arc::new(InMemoryDocs::new());
        let err = service(&docs).rewrite("nope", "text").await.unwrap_err();

        assert!(matches!(err, DocsError::NotFound(_)));
        assert_eq!(docs.calls(RemoteCall::FetchSnapshot), 1);
    }

    #[tokio::test]
    async fn permission_denied_is_distinct_and_not_retried() {
        let docs = docs_with("doc", "x");
        docs.fail_next(
            RemoteCall::ApplyBatch,
            DocsError::Permission("read-only".into()),
        );

        let err = service(&docs).rewrite("doc", "y").await.unwrap_err();

        assert!(matches!(err, DocsError::Permission(_)));
        assert_eq!(docs.calls(RemoteCall::ApplyBatch), 1);
    }

    #[tokio::test]
    async fn empty_document_id_is_rejected_before_any_call() {
        let docs = Arc::new(InMemoryDocs::new());
        let err = service(&docs).rewrite("  ", "text").await.unwrap_err();

        assert!(matches!(err, DocsError::Validation(_)));
        assert_eq!(docs.calls(RemoteCall::FetchSnapshot), 0);
    }

    #[tokio::test]
    async fn accepts_document_urls() {
        let docs = docs_with("1abcXYZ", "hi");
        let text = service(&docs)
            .read("https://docs.google.com/document/d/1abcXYZ/edit")
            .await
            .unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn create_uses_default_title_when_blank() {
        let docs = Arc::new(InMemoryDocs::new());
        let created = service(&docs).create(Some("  ")).await.unwrap();

        assert_eq!(created.title, DEFAULT_DOCUMENT_TITLE);
        assert!(created.url.ends_with(&format!("/d/{}/edit", created.document_id)));
    }

    #[tokio::test]
    async fn insert_and_delete_are_checked_against_current_length() {
        let docs = docs_with("doc", "Hello");
        let svc = service(&docs);

        svc.insert_text("doc", 5, " World").await.unwrap();
        assert_eq!(docs.text_of("doc"), "Hello World");

        let err = svc.insert_text("doc", 99, "x").await.unwrap_err();
        assert!(matches!(err, DocsError::Validation(_)));

        svc.delete_range("doc", 0, 6).await.unwrap();
        assert_eq!(docs.text_of("doc"), "World");

        let err = svc.delete_range("doc", 3, 3).await.unwrap_err();
        assert!(matches!(err, DocsError::Validation(_)));
        let err = svc.delete_range("doc", 0, 6).await.unwrap_err();
        assert!(matches!(err, DocsError::Validation(_)));
    }

    #[tokio::test]
    async fn index_edit_on_moved_document_is_not_retried() {
        let docs = docs_with("doc", "Hello");
        docs.edit_after_next_fetch("doc", "Someone else");

        let err = service(&docs).insert_text("doc", 0, ">").await.unwrap_err();

        assert!(matches!(err, DocsError::StaleState(_)));
        assert_eq!(docs.calls(RemoteCall::ApplyBatch), 1);
        assert_eq!(docs.text_of("doc"), "Someone else");
    }

    struct AppendOnlyPlanner;

    impl EditPlanner for AppendOnlyPlanner {
        fn plan(&self, snapshot: &DocumentSnapshot, desired_text: &str) -> Vec<EditOp> {
            match desired_text.strip_prefix(snapshot.text().as_str()) {
                Some(tail) if !tail.is_empty() => vec![EditOp::Insert {
                    at: snapshot.length(),
                    text: tail.to_string(),
                }],
                _ => ReplaceAllPlanner.plan(snapshot, desired_text),
            }
        }
    }

    #[tokio::test]
    async fn planner_can_be_swapped() {
        let docs = docs_with("doc", "Hello");
        let svc = service(&docs).with_planner(Box::new(AppendOnlyPlanner));

        svc.rewrite("doc", "Hello, world").await.unwrap();

        assert_eq!(docs.text_of("doc"), "Hello, world");
        assert_eq!(
            docs.batches()[0].operations,
            vec![EditOp::Insert {
                at: 5,
                text: ", world".into()
            }]
        );
    }

    #[tokio::test]
    async fn replace_text_counts_occurrences() {
        let docs = docs_with("doc", "cat Cat cAt dog");
        let svc = service(&docs);

        assert_eq!(svc.replace_text("doc", "cat", "fox", true).await.unwrap(), 1);
        assert_eq!(docs.text_of("doc"), "fox Cat cAt dog");

        assert_eq!(svc.replace_text("doc", "cat", "fox", false).await.unwrap(), 2);
        assert_eq!(docs.text_of("doc"), "fox fox fox dog");

        let batches = docs.batches();
        assert_eq!(batches[0].revision, None);
    }
}
