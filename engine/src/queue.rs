//! Offline operation types and their durable wire format.
//!
//! Mutations that cannot reach the remote store are recorded as queued
//! operations and replayed later. The whole queue is persisted as one
//! JSON string (whole-queue overwrite, not an append-only log).

use crate::{Error, OperationId, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// What a queued operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
}

/// Which remote collection a queued operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCollection {
    Books,
    Categories,
}

impl TargetCollection {
    /// Collection name as used by the remote store.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetCollection::Books => "books",
            TargetCollection::Categories => "categories",
        }
    }
}

impl std::fmt::Display for TargetCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation recorded while the remote store was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Unique operation id
    pub id: OperationId,
    /// What the operation does
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Targeted collection
    pub target_collection: TargetCollection,
    /// Targeted record id; adds carry the temporary local id
    #[serde(default)]
    pub target_id: Option<String>,
    /// Full record for adds, partial patch for updates, null for deletes
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the operation was recorded (milliseconds since epoch)
    pub enqueued_at: Timestamp,
}

impl QueuedOperation {
    /// Record an add. The target id is the temporary local id the record
    /// was inserted under, so later queued updates line up behind it.
    pub fn add(
        id: impl Into<OperationId>,
        collection: TargetCollection,
        temp_id: impl Into<String>,
        payload: serde_json::Value,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Add,
            target_collection: collection,
            target_id: Some(temp_id.into()),
            payload,
            enqueued_at,
        }
    }

    /// Record an update carrying a partial patch.
    pub fn update(
        id: impl Into<OperationId>,
        collection: TargetCollection,
        target_id: impl Into<String>,
        payload: serde_json::Value,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Update,
            target_collection: collection,
            target_id: Some(target_id.into()),
            payload,
            enqueued_at,
        }
    }

    /// Record a delete.
    pub fn delete(
        id: impl Into<OperationId>,
        collection: TargetCollection,
        target_id: impl Into<String>,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Delete,
            target_collection: collection,
            target_id: Some(target_id.into()),
            payload: serde_json::Value::Null,
            enqueued_at,
        }
    }

    /// Check whether this operation targets the given record.
    pub fn targets(&self, collection: TargetCollection, record_id: &str) -> bool {
        self.target_collection == collection && self.target_id.as_deref() == Some(record_id)
    }

    /// Rewrite references to a temporary id after the remote store has
    /// assigned the permanent one. Covers the target id and the payload
    /// `category` and `parentId` fields pointing at a temporary record.
    pub fn retarget(&mut self, old_id: &str, new_id: &str) -> bool {
        let mut changed = false;
        if self.target_id.as_deref() == Some(old_id) {
            self.target_id = Some(new_id.to_string());
            changed = true;
        }
        for field in ["category", "parentId"] {
            if let Some(reference) = self.payload.get_mut(field) {
                if reference.as_str() == Some(old_id) {
                    *reference = serde_json::Value::String(new_id.to_string());
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Serialize the full queue for the atomic whole-queue overwrite.
pub fn encode_queue(ops: &[QueuedOperation]) -> Result<String> {
    serde_json::to_string(ops).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a stored queue. A blank string is an empty queue.
pub fn decode_queue(raw: &str) -> Result<Vec<QueuedOperation>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_op_carries_temp_target() {
        let op = QueuedOperation::add(
            "op-1",
            TargetCollection::Books,
            "local-1",
            json!({"title": "Dune"}),
            1000,
        );

        assert_eq!(op.kind, OperationKind::Add);
        assert_eq!(op.target_id.as_deref(), Some("local-1"));
        assert!(op.targets(TargetCollection::Books, "local-1"));
        assert!(!op.targets(TargetCollection::Categories, "local-1"));
    }

    #[test]
    fn delete_op_has_null_payload() {
        let op = QueuedOperation::delete("op-1", TargetCollection::Categories, "cat-1", 1000);
        assert!(op.payload.is_null());
    }

    #[test]
    fn serialization_format() {
        let op = QueuedOperation::add(
            "op-1",
            TargetCollection::Books,
            "local-1",
            json!({"title": "Dune"}),
            1000,
        );

        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"type\":\"add\""));
        assert!(json.contains("\"targetCollection\":\"books\""));
        assert!(json.contains("\"enqueuedAt\":1000"));

        let parsed: QueuedOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }

    #[test]
    fn queue_roundtrip_preserves_order() {
        let ops = vec![
            QueuedOperation::add(
                "op-1",
                TargetCollection::Books,
                "local-1",
                json!({"title": "A"}),
                1000,
            ),
            QueuedOperation::update(
                "op-2",
                TargetCollection::Books,
                "local-1",
                json!({"title": "B"}),
                2000,
            ),
        ];

        let encoded = encode_queue(&ops).unwrap();
        let decoded = decode_queue(&encoded).unwrap();

        assert_eq!(decoded, ops);
    }

    #[test]
    fn decode_blank_is_empty() {
        assert!(decode_queue("").unwrap().is_empty());
        assert!(decode_queue("  ").unwrap().is_empty());
        assert!(decode_queue("[]").unwrap().is_empty());
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            decode_queue("{broken"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn retarget_rewrites_target_and_category_ref() {
        let mut update = QueuedOperation::update(
            "op-2",
            TargetCollection::Books,
            "local-1",
            json!({"title": "B"}),
            2000,
        );
        assert!(update.retarget("local-1", "remote-9"));
        assert_eq!(update.target_id.as_deref(), Some("remote-9"));

        let mut add = QueuedOperation::add(
            "op-3",
            TargetCollection::Books,
            "local-2",
            json!({"title": "C", "category": "local-cat"}),
            3000,
        );
        assert!(add.retarget("local-cat", "cat-9"));
        assert_eq!(add.payload["category"], "cat-9");
        assert_eq!(add.target_id.as_deref(), Some("local-2"));

        assert!(!add.retarget("unrelated", "x"));
    }

    #[test]
    fn retarget_rewrites_parent_ref() {
        let mut child = QueuedOperation::add(
            "op-4",
            TargetCollection::Categories,
            "local-child",
            json!({"name": "Haiku", "parentId": "local-parent", "path": "/Poetry/Haiku"}),
            4000,
        );

        assert!(child.retarget("local-parent", "cat-7"));
        assert_eq!(child.payload["parentId"], "cat-7");
        // The child's own temporary target is untouched.
        assert_eq!(child.target_id.as_deref(), Some("local-child"));
    }
}
