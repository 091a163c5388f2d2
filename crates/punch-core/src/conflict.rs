//! Conflict detection and resolution.
//!
//! Both functions are pure: they look only at their arguments.

use serde_json::Value;

use crate::models::{ConflictPolicy, ConflictRecord, RemoteRecord};

/// Fields whose divergence counts as a conflict, with the camel-case
/// spelling UI payloads use for the same field.
const COMPARED_FIELDS: [(&str, &str); 7] = [
    ("start_time", "startTime"),
    ("end_time", "endTime"),
    ("duration", "duration"),
    ("project_id", "projectId"),
    ("task_id", "taskId"),
    ("billable", "billable"),
    ("description", "description"),
];

/// Outcome of applying a policy to a conflict
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Local payload wins and must overwrite the remote
    KeepLocal(Value),
    /// Remote payload wins; nothing is pushed
    KeepRemote(Value),
    /// A human must pick; the item is parked
    NeedsManual,
}

impl Resolution {
    /// Winning payload, if the policy picked one
    pub const fn winner(&self) -> Option<&Value> {
        match self {
            Self::KeepLocal(value) | Self::KeepRemote(value) => Some(value),
            Self::NeedsManual => None,
        }
    }
}

fn field<'a>(payload: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    payload.get(snake).or_else(|| payload.get(camel))
}

/// Numbers compare by value so `2` and `2.0` are the same duration
fn same_value(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => a == b,
        },
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (left, right) => left == right,
    }
}

/// Names of compared fields whose values differ between the two payloads.
///
/// Anything outside the compared set (audit timestamps, device tags, ...) is
/// ignored.
pub fn detect_conflicted_fields(local: &Value, remote: &Value) -> Vec<&'static str> {
    COMPARED_FIELDS
        .iter()
        .filter(|(snake, camel)| {
            !same_value(field(local, snake, camel), field(remote, snake, camel))
        })
        .map(|(snake, _)| *snake)
        .collect()
}

/// Build the conflict record for a local mutation against its remote version
pub fn build_conflict(local: &Value, local_timestamp: i64, remote: RemoteRecord) -> ConflictRecord {
    let fields = detect_conflicted_fields(local, &remote.data);
    ConflictRecord {
        local: local.clone(),
        local_timestamp,
        remote,
        fields,
    }
}

/// Apply `policy` to a conflict.
///
/// `NewestWins` keeps whichever side has the strictly later timestamp; on an
/// exact tie the server is authoritative.
pub fn resolve(conflict: &ConflictRecord, policy: ConflictPolicy) -> Resolution {
    match policy {
        ConflictPolicy::LocalWins => Resolution::KeepLocal(conflict.local.clone()),
        ConflictPolicy::ServerWins => Resolution::KeepRemote(conflict.remote.data.clone()),
        ConflictPolicy::NewestWins => {
            if conflict.local_timestamp > conflict.remote.updated_at {
                Resolution::KeepLocal(conflict.local.clone())
            } else {
                Resolution::KeepRemote(conflict.remote.data.clone())
            }
        }
        ConflictPolicy::Manual => Resolution::NeedsManual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(duration: f64) -> Value {
        json!({
            "start_time": "2024-05-01T09:00:00Z",
            "end_time": "2024-05-01T11:00:00Z",
            "duration": duration,
            "project_id": "p1",
            "task_id": null,
            "billable": true,
            "description": "Client work",
            "updated_at": 1
        })
    }

    fn conflict(local: Value, local_ts: i64, remote: Value, remote_ts: i64) -> ConflictRecord {
        build_conflict(
            &local,
            local_ts,
            RemoteRecord {
                data: remote,
                updated_at: remote_ts,
            },
        )
    }

    #[test]
    fn identical_payloads_have_no_conflict() {
        assert!(detect_conflicted_fields(&entry(2.0), &entry(2.0)).is_empty());
    }

    #[test]
    fn metadata_differences_are_ignored() {
        let mut remote = entry(2.0);
        remote["updated_at"] = json!(999);
        remote["device_id"] = json!("phone");
        assert!(detect_conflicted_fields(&entry(2.0), &remote).is_empty());
    }

    #[test]
    fn differing_fields_are_listed() {
        let mut remote = entry(2.5);
        remote["billable"] = json!(false);
        assert_eq!(
            detect_conflicted_fields(&entry(2.0), &remote),
            vec!["duration", "billable"]
        );
    }

    #[test]
    fn camel_case_payloads_compare_against_snake_case() {
        let local = json!({ "startTime": "09:00", "projectId": "p1", "duration": 2 });
        let remote = json!({ "start_time": "09:00", "project_id": "p2", "duration": 2.0 });
        assert_eq!(detect_conflicted_fields(&local, &remote), vec!["project_id"]);
    }

    #[test]
    fn missing_and_null_fields_are_equal() {
        let local = json!({ "task_id": null });
        let remote = json!({});
        assert!(detect_conflicted_fields(&local, &remote).is_empty());
    }

    #[test]
    fn server_wins_takes_remote_duration() {
        let record = conflict(entry(2.0), 10, entry(2.5), 5);
        let resolution = resolve(&record, ConflictPolicy::ServerWins);
        assert_eq!(resolution.winner().unwrap()["duration"], json!(2.5));
    }

    #[test]
    fn local_wins_takes_local_payload() {
        let record = conflict(entry(2.0), 1, entry(2.5), 5);
        assert_eq!(
            resolve(&record, ConflictPolicy::LocalWins),
            Resolution::KeepLocal(entry(2.0))
        );
    }

    #[test]
    fn newest_wins_picks_strictly_later_side() {
        let local_newer = conflict(entry(2.0), 20, entry(2.5), 10);
        assert_eq!(
            resolve(&local_newer, ConflictPolicy::NewestWins),
            Resolution::KeepLocal(entry(2.0))
        );

        let remote_newer = conflict(entry(2.0), 10, entry(2.5), 20);
        assert_eq!(
            resolve(&remote_newer, ConflictPolicy::NewestWins),
            Resolution::KeepRemote(entry(2.5))
        );
    }

    #[test]
    fn newest_wins_tie_goes_to_server() {
        let tie = conflict(entry(2.0), 10, entry(2.5), 10);
        assert_eq!(
            resolve(&tie, ConflictPolicy::NewestWins),
            Resolution::KeepRemote(entry(2.5))
        );
    }

    #[test]
    fn manual_needs_resolution() {
        let record = conflict(entry(2.0), 10, entry(2.5), 10);
        let resolution = resolve(&record, ConflictPolicy::Manual);
        assert_eq!(resolution, Resolution::NeedsManual);
        assert!(resolution.winner().is_none());
        assert!(record.is_conflict());
    }
}
