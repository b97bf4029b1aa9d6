use super::document_models::{utf16_len, DocumentSnapshot, EditOp};

/// Turns a snapshot and the caller's desired full text into an ordered batch.
///
/// Every operation is expressed against the snapshot's index space as it was
/// before the batch. An empty plan means the document already matches.
pub trait EditPlanner: Send + Sync {
    fn plan(&self, snapshot: &DocumentSnapshot, desired_text: &str) -> Vec<EditOp>;
}

/// Delete everything, then insert the new text at 0.
///
/// The delete must come first: the remote applies the batch in order, so the
/// insert at index 0 lands in the emptied body.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceAllPlanner;

impl EditPlanner for ReplaceAllPlanner {
    fn plan(&self, snapshot: &DocumentSnapshot, desired_text: &str) -> Vec<EditOp> {
        if snapshot.text() == desired_text {
            return Vec::new();
        }

        let mut ops = Vec::with_capacity(2);
        let length = snapshot.length();
        // The remote rejects empty ranges.
        if length > 0 {
            ops.push(EditOp::DeleteRange {
                start: 0,
                end: length,
            });
        }
        if utf16_len(desired_text) > 0 {
            ops.push(EditOp::Insert {
                at: 0,
                text: desired_text.to_string(),
            });
        }
        ops
    }
}
