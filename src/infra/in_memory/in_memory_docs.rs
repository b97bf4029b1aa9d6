// In-memory implementation of DocsApi, used by the service and tool tests.
//
// A document is plain text indexed in UTF-16 code units, with a revision counter
// that advances on every committed change. Batches are applied in order against
// the pre-batch state and rejected as a whole on the first invalid operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::comments::comment_models::{Anchor, Author, Comment, CommentPage, Reply};
use crate::core::documents::document_models::{
    utf16_len, BatchOutcome, CreatedDocument, DocumentSnapshot, EditOp, ElementKind, Revision,
    StructuralElement,
};
use crate::core::errors::DocsError;
use crate::core::remote::DocsApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    CreateDocument,
    FetchSnapshot,
    ApplyBatch,
    FetchComments,
    FetchComment,
    CreateComment,
    CreateReply,
    DeleteReply,
}

/// A batch exactly as it was submitted, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBatch {
    pub document_id: String,
    pub revision: Option<Revision>,
    pub operations: Vec<EditOp>,
}

struct StoredDocument {
    title: String,
    text: Vec<u16>,
    revision: u64,
}

impl StoredDocument {
    fn revision(&self) -> Revision {
        Revision(format!("rev-{}", self.revision))
    }

    fn text(&self) -> String {
        String::from_utf16_lossy(&self.text)
    }
}

struct State {
    documents: HashMap<String, StoredDocument>,
    comments: HashMap<String, Vec<Comment>>,
    next_id: u64,
    edits_after_fetch: VecDeque<(String, String)>,
    failures: VecDeque<(RemoteCall, DocsError)>,
    calls: HashMap<RemoteCall, usize>,
    batches: Vec<RecordedBatch>,
    comment_page_size: usize,
}

pub struct InMemoryDocs {
    state: Mutex<State>,
}

impl InMemoryDocs {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                documents: HashMap::new(),
                comments: HashMap::new(),
                next_id: 1,
                edits_after_fetch: VecDeque::new(),
                failures: VecDeque::new(),
                calls: HashMap::new(),
                batches: Vec::new(),
                comment_page_size: 100,
            }),
        }
    }

    pub fn insert_document(&self, document_id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(
            document_id.to_string(),
            StoredDocument {
                title: "Untitled".to_string(),
                text: text.encode_utf16().collect(),
                revision: 1,
            },
        );
    }

    pub fn text_of(&self, document_id: &str) -> String {
        let state = self.state.lock().unwrap();
        state.documents[document_id].text()
    }

    pub fn revision_of(&self, document_id: &str) -> Revision {
        let state = self.state.lock().unwrap();
        state.documents[document_id].revision()
    }

    /// Another writer commits `text` right now.
    pub fn edit_remotely(&self, document_id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        let doc = state.documents.get_mut(document_id).unwrap();
        doc.text = text.encode_utf16().collect();
        doc.revision += 1;
    }

    /// Another writer commits `text` right after the next snapshot of the document is taken.
    pub fn edit_after_next_fetch(&self, document_id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .edits_after_fetch
            .push_back((document_id.to_string(), text.to_string()));
    }

    /// The next call of kind `call` fails with `error`.
    pub fn fail_next(&self, call: RemoteCall, error: DocsError) {
        let mut state = self.state.lock().unwrap();
        state.failures.push_back((call, error));
    }

    pub fn calls(&self, call: RemoteCall) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(&call).copied().unwrap_or(0)
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn set_comment_page_size(&self, size: usize) {
        self.state.lock().unwrap().comment_page_size = size.max(1);
    }

    pub fn insert_comment(&self, document_id: &str, comment_id: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .comments
            .entry(document_id.to_string())
            .or_default()
            .push(Comment {
                id: comment_id.to_string(),
                anchor: None,
                author: Some(test_author()),
                created_at: None,
                content: content.to_string(),
                quoted_text: None,
                resolved: false,
                replies: Vec::new(),
                deleted: false,
            });
    }

    pub fn insert_reply(&self, document_id: &str, comment_id: &str, reply_id: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        let comment = find_comment_mut(&mut state, document_id, comment_id).unwrap();
        comment.replies.push(Reply {
            id: reply_id.to_string(),
            comment_id: comment_id.to_string(),
            author: Some(test_author()),
            created_at: None,
            content: content.to_string(),
            deleted: false,
        });
    }

    pub fn delete_comment_remotely(&self, document_id: &str, comment_id: &str) {
        let mut state = self.state.lock().unwrap();
        find_comment_mut(&mut state, document_id, comment_id)
            .unwrap()
            .deleted = true;
    }

    /// Raw comment thread, deleted replies included.
    pub fn stored_comment(&self, document_id: &str, comment_id: &str) -> Option<Comment> {
        let mut state = self.state.lock().unwrap();
        find_comment_mut(&mut state, document_id, comment_id).map(|c| c.clone())
    }

    fn enter(&self, state: &mut State, call: RemoteCall) -> Result<(), DocsError> {
        *state.calls.entry(call).or_insert(0) += 1;
        if let Some(pos) = state.failures.iter().position(|(c, _)| *c == call) {
            if let Some((_, error)) = state.failures.remove(pos) {
                return Err(error);
            }
        }
        Ok(())
    }
}

fn test_author() -> Author {
    Author {
        display_name: "Test User".to_string(),
        email: Some("test@example.com".to_string()),
    }
}

fn find_comment_mut<'a>(
    state: &'a mut State,
    document_id: &str,
    comment_id: &str,
) -> Option<&'a mut Comment> {
    state
        .comments
        .get_mut(document_id)?
        .iter_mut()
        .find(|c| c.id == comment_id)
}

fn without_deleted_replies(comment: &Comment) -> Comment {
    let mut visible = comment.clone();
    visible.replies.retain(|r| !r.deleted);
    visible
}

fn missing_document(document_id: &str) -> DocsError {
    DocsError::NotFound(format!("document '{}'", document_id))
}

/// One paragraph element per line, each carrying its trailing newline.
fn snapshot_of(document_id: &str, doc: &StoredDocument) -> DocumentSnapshot {
    let text = doc.text();
    let mut elements = Vec::new();
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        let end = start + utf16_len(line);
        elements.push(StructuralElement {
            start,
            end,
            kind: ElementKind::Paragraph,
            text: line.to_string(),
        });
        start = end;
    }
    DocumentSnapshot {
        document_id: document_id.to_string(),
        title: doc.title.clone(),
        revision: doc.revision(),
        elements,
    }
}

fn replace_all(text: &str, find: &str, replace: &str, match_case: bool) -> (String, u32) {
    if find.is_empty() {
        return (text.to_string(), 0);
    }
    let (haystack, needle) = if match_case {
        (text.to_string(), find.to_string())
    } else {
        (text.to_ascii_lowercase(), find.to_ascii_lowercase())
    };

    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut cursor = 0;
    while let Some(pos) = haystack[cursor..].find(&needle) {
        let start = cursor + pos;
        out.push_str(&text[cursor..start]);
        out.push_str(replace);
        cursor = start + needle.len();
        count += 1;
    }
    out.push_str(&text[cursor..]);
    (out, count)
}

fn apply_ops(text: &[u16], operations: &[EditOp]) -> Result<(Vec<u16>, u32), DocsError> {
    let mut text = text.to_vec();
    let mut occurrences = 0;
    for op in operations {
        match op {
            EditOp::Insert { at, text: inserted } => {
                if *at > text.len() {
                    return Err(DocsError::Validation(format!(
                        "insert index {} is past the end ({})",
                        at,
                        text.len()
                    )));
                }
                if inserted.is_empty() {
                    return Err(DocsError::Validation("insert text is empty".to_string()));
                }
                let units: Vec<u16> = inserted.encode_utf16().collect();
                text.splice(*at..*at, units);
            }
            EditOp::DeleteRange { start, end } => {
                if start >= end || *end > text.len() {
                    return Err(DocsError::Validation(format!(
                        "invalid range [{}, {}) for length {}",
                        start,
                        end,
                        text.len()
                    )));
                }
                text.drain(*start..*end);
            }
            EditOp::ReplaceAll {
                find,
                replace,
                match_case,
            } => {
                let (replaced, hits) =
                    replace_all(&String::from_utf16_lossy(&text), find, replace, *match_case);
                text = replaced.encode_utf16().collect();
                occurrences += hits;
            }
        }
    }
    Ok((text, occurrences))
}

#[async_trait]
impl DocsApi for InMemoryDocs {
    async fn create_document(&self, title: &str) -> Result<CreatedDocument, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::CreateDocument)?;
        let id = format!("doc-{}", state.next_id);
        state.next_id += 1;
        state.documents.insert(
            id.clone(),
            StoredDocument {
                title: title.to_string(),
                text: Vec::new(),
                revision: 1,
            },
        );
        Ok(CreatedDocument::new(id, title.to_string()))
    }

    async fn fetch_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::FetchSnapshot)?;
        let snapshot = match state.documents.get(document_id) {
            Some(doc) => snapshot_of(document_id, doc),
            None => return Err(missing_document(document_id)),
        };

        let interferes = state
            .edits_after_fetch
            .front()
            .map(|(id, _)| id == document_id)
            .unwrap_or(false);
        if interferes {
            if let Some((_, text)) = state.edits_after_fetch.pop_front() {
                if let Some(doc) = state.documents.get_mut(document_id) {
                    doc.text = text.encode_utf16().collect();
                    doc.revision += 1;
                }
            }
        }
        Ok(snapshot)
    }

    async fn apply_batch(
        &self,
        document_id: &str,
        revision: Option<&Revision>,
        operations: &[EditOp],
    ) -> Result<BatchOutcome, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::ApplyBatch)?;
        state.batches.push(RecordedBatch {
            document_id: document_id.to_string(),
            revision: revision.cloned(),
            operations: operations.to_vec(),
        });

        let doc = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| missing_document(document_id))?;
        if let Some(required) = revision {
            if *required != doc.revision() {
                return Err(DocsError::StaleState(format!(
                    "required revision {} but document is at {}",
                    required,
                    doc.revision()
                )));
            }
        }

        let (text, occurrences_changed) = apply_ops(&doc.text, operations)?;
        if text != doc.text {
            doc.text = text;
            doc.revision += 1;
        }
        Ok(BatchOutcome {
            revision: doc.revision(),
            occurrences_changed,
        })
    }

    async fn fetch_comments(
        &self,
        document_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::FetchComments)?;
        if !state.documents.contains_key(document_id) {
            return Err(missing_document(document_id));
        }
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| DocsError::Validation(format!("bad page token '{}'", token)))?,
            None => 0,
        };

        let live: Vec<Comment> = state
            .comments
            .get(document_id)
            .map(|all| {
                all.iter()
                    .filter(|c| !c.deleted)
                    .map(without_deleted_replies)
                    .collect()
            })
            .unwrap_or_default();
        let end = (offset + state.comment_page_size).min(live.len());
        let comments = live.get(offset..end).map(<[Comment]>::to_vec).unwrap_or_default();
        let next_page_token = (end < live.len()).then(|| end.to_string());
        Ok(CommentPage {
            comments,
            next_page_token,
        })
    }

    async fn fetch_comment(
        &self,
        document_id: &str,
        comment_id: &str,
    ) -> Result<Option<Comment>, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::FetchComment)?;
        if !state.documents.contains_key(document_id) {
            return Err(missing_document(document_id));
        }
        Ok(find_comment_mut(&mut state, document_id, comment_id).map(|c| without_deleted_replies(c)))
    }

    async fn create_comment(
        &self,
        document_id: &str,
        content: &str,
        anchor: Option<&Anchor>,
    ) -> Result<Comment, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::CreateComment)?;
        let quoted_text = match (state.documents.get(document_id), anchor) {
            (None, _) => return Err(missing_document(document_id)),
            (Some(doc), Some(a)) => doc
                .text
                .get(a.offset..a.offset + a.length)
                .map(String::from_utf16_lossy),
            (Some(_), None) => None,
        };
        let id = format!("comment-{}", state.next_id);
        state.next_id += 1;
        let comment = Comment {
            id,
            anchor: anchor.map(|a| format!("{}:{}+{}", a.revision, a.offset, a.length)),
            author: Some(test_author()),
            created_at: None,
            content: content.to_string(),
            quoted_text,
            resolved: false,
            replies: Vec::new(),
            deleted: false,
        };
        state
            .comments
            .entry(document_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn create_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Reply, DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::CreateReply)?;
        let id = format!("reply-{}", state.next_id);
        state.next_id += 1;
        let comment = find_comment_mut(&mut state, document_id, comment_id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| DocsError::NotFound(format!("comment '{}'", comment_id)))?;
        let reply = Reply {
            id,
            comment_id: comment_id.to_string(),
            author: Some(test_author()),
            created_at: None,
            content: content.to_string(),
            deleted: false,
        };
        comment.replies.push(reply.clone());
        Ok(reply)
    }

    async fn delete_reply(
        &self,
        document_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<(), DocsError> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, RemoteCall::DeleteReply)?;
        let reply = find_comment_mut(&mut state, document_id, comment_id)
            .and_then(|c| c.replies.iter_mut().find(|r| r.id == reply_id && !r.deleted))
            .ok_or_else(|| DocsError::NotFound(format!("reply '{}'", reply_id)))?;
        reply.deleted = true;
        Ok(())
    }
}
