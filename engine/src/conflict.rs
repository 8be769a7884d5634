//! Conflict resolution between queued local writes and remote records.
//!
//! Invoked during queue drain when the remote copy of a record changed
//! after the local operation was enqueued. Resolution is last-writer-wins
//! on the modification timestamp; an exact tie falls back to a field
//! merge that keeps the longer of the two values for identifying and
//! free-text fields and takes everything else from the server.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields merged by length on a timestamp tie. All other fields take the
/// server's value.
const MERGE_BY_LENGTH: [&str; 3] = ["name", "title", "description"];

/// Which side a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Remote record was newer; the local write is discarded
    Server,
    /// Local record was newer; the local write proceeds
    Local,
    /// Exact timestamp tie; the records were merged field by field
    Merge,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictOutcome {
    /// How the conflict was resolved
    pub resolution: Resolution,
    /// The record to re-apply and re-persist
    pub record: Value,
}

/// Modification timestamp of a record payload; falls back to the creation
/// time for records that were never updated, and to zero when neither
/// field parses.
pub fn modified_at(record: &Value) -> Timestamp {
    record
        .get("updatedAt")
        .and_then(Value::as_u64)
        .or_else(|| record.get("createdAt").and_then(Value::as_u64))
        .unwrap_or(0)
}

/// Resolve a conflict between a local and a server copy of one record.
///
/// The strictly newer side wins outright. On an exact timestamp tie the
/// records are merged and the result's `updatedAt` is stamped with
/// `resolved_at`.
pub fn resolve(local: &Value, server: &Value, resolved_at: Timestamp) -> ConflictOutcome {
    let local_ts = modified_at(local);
    let server_ts = modified_at(server);

    if server_ts > local_ts {
        ConflictOutcome {
            resolution: Resolution::Server,
            record: server.clone(),
        }
    } else if local_ts > server_ts {
        ConflictOutcome {
            resolution: Resolution::Local,
            record: local.clone(),
        }
    } else {
        ConflictOutcome {
            resolution: Resolution::Merge,
            record: merge_records(local, server, resolved_at),
        }
    }
}

/// Merge two copies of a record that carry the same timestamp.
///
/// Starts from the server copy. For `name`, `title` and `description`
/// the longer string survives (a missing server value counts as empty).
/// The merged record's `updatedAt` is stamped with `resolved_at`.
pub fn merge_records(local: &Value, server: &Value, resolved_at: Timestamp) -> Value {
    let mut merged = server.clone();

    if let (Some(merged_map), Some(local_map)) = (merged.as_object_mut(), local.as_object()) {
        for field in MERGE_BY_LENGTH {
            let Some(local_str) = local_map.get(field).and_then(Value::as_str) else {
                continue;
            };
            let server_len = merged_map
                .get(field)
                .and_then(Value::as_str)
                .map_or(0, str::len);
            if local_str.len() > server_len {
                merged_map.insert(field.to_string(), Value::String(local_str.to_string()));
            }
        }
        merged_map.insert("updatedAt".to_string(), Value::from(resolved_at));
    }

    merged
}
