// =============================================================================
// GOOGLE DOCS / DRIVE WIRE FORMAT
// =============================================================================
//
// Serde shapes for the parts of the Docs v1 and Drive v3 APIs we touch, plus the
// pure translations between them and the core models.
//
// **Index spaces:**
// The Docs body starts with a section break at [0, 1) and always ends with a
// newline that cannot be deleted. The core only sees the editable space in
// between, so remote index `i` is editable index `i - 1` and the final newline
// is trimmed from the last element.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::comments::{Anchor, Author, Comment, Reply};
use crate::core::documents::document_models::{
    utf16_len, DocumentSnapshot, EditOp, ElementKind, Revision, StructuralElement,
};
use crate::core::errors::DocsError;

/// Drive `fields` selector for a single comment with its replies.
pub const COMMENT_FIELDS: &str = "id,content,anchor,author(displayName,emailAddress),createdTime,resolved,deleted,quotedFileContent(value),replies(id,content,author(displayName,emailAddress),createdTime,deleted)";

pub const REPLY_FIELDS: &str = "id,content,author(displayName,emailAddress),createdTime,deleted";

// =============================================================================
// DOCS API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    pub revision_id: Option<String>,
    pub body: Option<Body>,
}

#[derive(Debug, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub content: Vec<BodyElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyElement {
    pub start_index: Option<usize>,
    pub end_index: usize,
    pub paragraph: Option<Paragraph>,
    pub table: Option<Table>,
    pub section_break: Option<Value>,
    pub table_of_contents: Option<TableOfContents>,
}

#[derive(Debug, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
pub struct TextRun {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub content: Vec<BodyElement>,
}

#[derive(Debug, Deserialize)]
pub struct TableOfContents {
    #[serde(default)]
    pub content: Vec<BodyElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub replies: Vec<BatchReply>,
    pub write_control: Option<WriteControl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReply {
    pub replace_all_text: Option<ReplaceAllTextReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAllTextReply {
    #[serde(default)]
    pub occurrences_changed: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteControl {
    pub required_revision_id: Option<String>,
}

impl BatchUpdateResponse {
    pub fn occurrences_changed(&self) -> u32 {
        self.replies
            .iter()
            .filter_map(|r| r.replace_all_text.as_ref())
            .map(|r| r.occurrences_changed)
            .sum()
    }

    pub fn revision(&self) -> Option<Revision> {
        self.write_control
            .as_ref()
            .and_then(|w| w.required_revision_id.clone())
            .map(Revision)
    }
}

// =============================================================================
// DRIVE API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: String,
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuotedFileContent {
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveReply {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub author: Option<DriveUser>,
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveComment {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub anchor: Option<String>,
    pub author: Option<DriveUser>,
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub deleted: bool,
    pub quoted_file_content: Option<QuotedFileContent>,
    #[serde(default)]
    pub replies: Vec<DriveReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentList {
    #[serde(default)]
    pub comments: Vec<DriveComment>,
    pub next_page_token: Option<String>,
}

/// Google's error envelope: `{"error": {"code", "message", "status", "errors": [...]}}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

// =============================================================================
// TRANSLATIONS
// =============================================================================

/// Translate a fetched document into a snapshot of the editable index space.
pub fn to_snapshot(document: Document) -> Result<DocumentSnapshot, DocsError> {
    let revision = document.revision_id.map(Revision).ok_or_else(|| {
        DocsError::Transient(format!(
            "document '{}' came back without a revision",
            document.document_id
        ))
    })?;

    let content = document.body.map(|b| b.content).unwrap_or_default();
    let mut elements = Vec::with_capacity(content.len());
    for element in &content {
        let start = element.start_index.unwrap_or(0);
        // The leading section break sits before the first editable index.
        if start == 0 {
            continue;
        }
        let (kind, text) = describe(element);
        elements.push(StructuralElement {
            start: start - 1,
            end: element.end_index.saturating_sub(1),
            kind,
            text,
        });
    }

    if let Some(last) = elements.last_mut() {
        if last.text.ends_with('\n') {
            last.text.pop();
        }
        last.end = last.end.saturating_sub(1).max(last.start);
        if last.start == last.end {
            elements.pop();
        }
    }

    Ok(DocumentSnapshot {
        document_id: document.document_id,
        title: document.title,
        revision,
        elements,
    })
}

fn describe(element: &BodyElement) -> (ElementKind, String) {
    if let Some(paragraph) = &element.paragraph {
        return (ElementKind::Paragraph, paragraph_text(paragraph));
    }
    if let Some(table) = &element.table {
        let mut text = String::new();
        for cell in table.table_rows.iter().flat_map(|r| &r.table_cells) {
            for inner in &cell.content {
                text.push_str(&describe(inner).1);
            }
        }
        return (ElementKind::Table, text);
    }
    if let Some(toc) = &element.table_of_contents {
        let text = toc.content.iter().map(|inner| describe(inner).1).collect();
        return (ElementKind::TableOfContents, text);
    }
    if element.section_break.is_some() {
        return (ElementKind::SectionBreak, String::new());
    }
    (ElementKind::Other, String::new())
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    paragraph
        .elements
        .iter()
        .filter_map(|e| e.text_run.as_ref())
        .filter_map(|run| run.content.as_deref())
        .collect()
}

/// `documents.batchUpdate` body for `operations`, shifted into the remote index space.
pub fn batch_update_body(revision: Option<&Revision>, operations: &[EditOp]) -> Value {
    let requests: Vec<Value> = operations
        .iter()
        .map(|op| match op {
            EditOp::Insert { at, text } => json!({
                "insertText": {
                    "location": { "index": at + 1 },
                    "text": text,
                }
            }),
            EditOp::DeleteRange { start, end } => json!({
                "deleteContentRange": {
                    "range": { "startIndex": start + 1, "endIndex": end + 1 }
                }
            }),
            EditOp::ReplaceAll {
                find,
                replace,
                match_case,
            } => json!({
                "replaceAllText": {
                    "containsText": { "text": find, "matchCase": match_case },
                    "replaceText": replace,
                }
            }),
        })
        .collect();

    let mut body = json!({ "requests": requests });
    if let Some(revision) = revision {
        body["writeControl"] = json!({ "requiredRevisionId": revision.0 });
    }
    body
}

/// Drive anchor JSON for a text range bound to a revision.
pub fn encode_anchor(anchor: &Anchor) -> String {
    json!({
        "r": anchor.revision,
        "a": [{ "txt": { "o": anchor.offset, "l": anchor.length, "ml": anchor.total_length } }]
    })
    .to_string()
}

fn to_author(user: Option<DriveUser>) -> Option<Author> {
    user.map(|u| Author {
        display_name: u.display_name,
        email: u.email_address,
    })
}

pub fn to_reply(comment_id: &str, reply: DriveReply) -> Reply {
    Reply {
        id: reply.id,
        comment_id: comment_id.to_string(),
        author: to_author(reply.author),
        created_at: reply.created_time,
        content: reply.content,
        deleted: reply.deleted,
    }
}

/// Deleted replies are dropped; a deleted comment keeps its flag so callers can reject it.
pub fn to_comment(comment: DriveComment) -> Comment {
    let id = comment.id;
    let replies = comment
        .replies
        .into_iter()
        .filter(|r| !r.deleted)
        .map(|r| to_reply(&id, r))
        .collect();
    Comment {
        anchor: comment.anchor,
        author: to_author(comment.author),
        created_at: comment.created_time,
        content: comment.content,
        quoted_text: comment.quoted_file_content.and_then(|q| q.value),
        resolved: comment.resolved,
        replies,
        deleted: comment.deleted,
        id,
    }
}

/// Classify a non-success HTTP response into the error taxonomy.
pub fn classify_failure(status: u16, body: &str) -> DocsError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let error = envelope.error;
    let message = if error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, error.message)
    };
    let rate_limited = error.status == "RESOURCE_EXHAUSTED"
        || error
            .errors
            .iter()
            .any(|e| e.reason.to_ascii_lowercase().contains("ratelimit"));
    let stale = error.status == "FAILED_PRECONDITION"
        || error.message.to_ascii_lowercase().contains("revision");

    match status {
        401 => DocsError::Authentication(message),
        403 if rate_limited => DocsError::Transient(message),
        403 => DocsError::Permission(message),
        404 => DocsError::NotFound(message),
        409 | 412 => DocsError::StaleState(message),
        400 if stale => DocsError::StaleState(message),
        400 => DocsError::Validation(message),
        408 | 429 => DocsError::Transient(message),
        s if s >= 500 => DocsError::Transient(message),
        _ => DocsError::Validation(message),
    }
}

/// UTF-16 length of a text run, for logging request sizes.
pub fn request_chars(operations: &[EditOp]) -> usize {
    operations
        .iter()
        .map(|op| match op {
            EditOp::Insert { text, .. } => utf16_len(text),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_json(content: Value) -> Document {
        serde_json::from_value(json!({
            "documentId": "doc",
            "title": "Notes",
            "revisionId": "ALm37BV",
            "body": { "content": content }
        }))
        .unwrap()
    }

    #[test]
    fn empty_document_has_zero_length() {
        let doc = document_json(json!([
            { "endIndex": 1, "sectionBreak": {} },
            { "startIndex": 1, "endIndex": 2,
              "paragraph": { "elements": [ { "startIndex": 1, "endIndex": 2, "textRun": { "content": "\n" } } ] } }
        ]));

        let snapshot = to_snapshot(doc).unwrap();
        assert_eq!(snapshot.length(), 0);
        assert_eq!(snapshot.text(), "");
        assert_eq!(snapshot.revision, Revision("ALm37BV".into()));
    }

    #[test]
    fn paragraphs_shift_into_editable_space() {
        let doc = document_json(json!([
            { "endIndex": 1, "sectionBreak": {} },
            { "startIndex": 1, "endIndex": 7,
              "paragraph": { "elements": [ { "textRun": { "content": "Hello\n" } } ] } },
            { "startIndex": 7, "endIndex": 13,
              "paragraph": { "elements": [
                  { "textRun": { "content": "Wor" } },
                  { "textRun": { "content": "ld\n" } }
              ] } }
        ]));

        let snapshot = to_snapshot(doc).unwrap();
        assert_eq!(snapshot.text(), "Hello\nWorld");
        assert_eq!(snapshot.length(), 11);
        assert_eq!(snapshot.elements[0].start, 0);
        assert_eq!(snapshot.elements[1].end, 11);
        assert!(snapshot.is_well_formed());
    }

    #[test]
    fn table_text_is_collected_from_cells() {
        let doc = document_json(json!([
            { "endIndex": 1, "sectionBreak": {} },
            { "startIndex": 1, "endIndex": 10, "table": { "tableRows": [ { "tableCells": [
                { "content": [ { "startIndex": 3, "endIndex": 5,
                    "paragraph": { "elements": [ { "textRun": { "content": "a\n" } } ] } } ] },
                { "content": [ { "startIndex": 6, "endIndex": 8,
                    "paragraph": { "elements": [ { "textRun": { "content": "b\n" } } ] } } ] }
            ] } ] } },
            { "startIndex": 10, "endIndex": 11,
              "paragraph": { "elements": [ { "textRun": { "content": "\n" } } ] } }
        ]));

        let snapshot = to_snapshot(doc).unwrap();
        assert_eq!(snapshot.elements.len(), 1);
        assert_eq!(snapshot.elements[0].kind, ElementKind::Table);
        assert_eq!(snapshot.elements[0].text, "a\nb\n");
        assert_eq!(snapshot.length(), 9);
    }

    #[test]
    fn missing_revision_is_transient() {
        let doc: Document =
            serde_json::from_value(json!({ "documentId": "doc", "title": "t" })).unwrap();
        assert!(matches!(to_snapshot(doc), Err(DocsError::Transient(_))));
    }

    #[test]
    fn batch_body_shifts_indices_and_pins_revision() {
        let ops = vec![
            EditOp::DeleteRange { start: 0, end: 11 },
            EditOp::Insert {
                at: 0,
                text: "Hi".into(),
            },
        ];
        let body = batch_update_body(Some(&Revision("rev9".into())), &ops);

        assert_eq!(
            body["requests"][0]["deleteContentRange"]["range"],
            json!({ "startIndex": 1, "endIndex": 12 })
        );
        assert_eq!(body["requests"][1]["insertText"]["location"]["index"], 1);
        assert_eq!(body["requests"][1]["insertText"]["text"], "Hi");
        assert_eq!(body["writeControl"]["requiredRevisionId"], "rev9");
    }

    #[test]
    fn replace_all_has_no_write_control() {
        let ops = vec![EditOp::ReplaceAll {
            find: "a".into(),
            replace: "b".into(),
            match_case: false,
        }];
        let body = batch_update_body(None, &ops);

        assert_eq!(
            body["requests"][0]["replaceAllText"]["containsText"],
            json!({ "text": "a", "matchCase": false })
        );
        assert!(body.get("writeControl").is_none());
    }

    #[test]
    fn batch_response_reports_revision_and_occurrences() {
        let response: BatchUpdateResponse = serde_json::from_value(json!({
            "documentId": "doc",
            "replies": [ { "replaceAllText": { "occurrencesChanged": 3 } }, {} ],
            "writeControl": { "requiredRevisionId": "rev10" }
        }))
        .unwrap();

        assert_eq!(response.occurrences_changed(), 3);
        assert_eq!(response.revision(), Some(Revision("rev10".into())));
    }

    #[test]
    fn anchor_is_valid_json() {
        let anchor = Anchor {
            revision: "rev1".into(),
            offset: 6,
            length: 5,
            total_length: 5,
        };
        let parsed: Value = serde_json::from_str(&encode_anchor(&anchor)).unwrap();
        assert_eq!(parsed["r"], "rev1");
        assert_eq!(parsed["a"][0]["txt"], json!({ "o": 6, "l": 5, "ml": 5 }));
    }

    #[test]
    fn comment_mapping_drops_deleted_replies() {
        let comment: DriveComment = serde_json::from_value(json!({
            "id": "C1",
            "content": "note",
            "author": { "displayName": "Ada", "emailAddress": "ada@example.com" },
            "createdTime": "2024-05-01T10:00:00.000Z",
            "quotedFileContent": { "value": "World" },
            "replies": [
                { "id": "R1", "content": "gone", "deleted": true },
                { "id": "R2", "content": "kept" }
            ]
        }))
        .unwrap();

        let comment = to_comment(comment);
        assert_eq!(comment.replies.len(), 1);
        assert_eq!(comment.replies[0].id, "R2");
        assert_eq!(comment.replies[0].comment_id, "C1");
        assert_eq!(comment.quoted_text.as_deref(), Some("World"));
        assert_eq!(comment.author.unwrap().email.as_deref(), Some("ada@example.com"));
        assert!(comment.created_at.is_some());
    }

    #[test]
    fn classifies_statuses() {
        let rate = r#"{"error":{"code":403,"message":"Quota","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        assert!(matches!(classify_failure(403, rate), DocsError::Transient(_)));
        assert!(matches!(classify_failure(403, "{}"), DocsError::Permission(_)));
        assert!(matches!(classify_failure(401, ""), DocsError::Authentication(_)));
        assert!(matches!(classify_failure(404, ""), DocsError::NotFound(_)));
        assert!(matches!(classify_failure(429, ""), DocsError::Transient(_)));
        assert!(matches!(classify_failure(503, "oops"), DocsError::Transient(_)));

        let stale = r#"{"error":{"code":400,"message":"The required revision ID 'x' does not match the latest revision.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify_failure(400, stale), DocsError::StaleState(_)));
        let bad = r#"{"error":{"code":400,"message":"Invalid requests[0].insertText: Index 99 must be less than the end index","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify_failure(400, bad), DocsError::Validation(_)));
    }

    #[test]
    fn counts_inserted_characters() {
        let ops = vec![
            EditOp::DeleteRange { start: 0, end: 4 },
            EditOp::Insert {
                at: 0,
                text: "hé🌍".into(),
            },
        ];
        assert_eq!(request_chars(&ops), 4);
    }
}
