//! Job payloads and queue reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A job is any JSON value. The queue never looks inside it.
pub type Job = Value;

/// Field holding the failure message on a failed entry.
pub const ERROR_FIELD: &str = "error";

/// Field holding the failure time (RFC 3339, UTC) on a failed entry.
pub const FAILED_AT_FIELD: &str = "failed_at";

/// Field wrapping payloads that are not JSON objects.
pub const JOB_FIELD: &str = "job";

/// Canonical text of a job.
///
/// Object keys are always written in sorted order and floats are parsed
/// exactly (serde_json `float_roundtrip`), so a job read back from the queue
/// encodes to the same text it was stored as. Removal from the processing
/// list relies on that.
#[must_use]
pub fn encode(job: &Job) -> String {
    job.to_string()
}

/// Builds the entry written to the failed list.
///
/// Object payloads get `error` and `failed_at` fields added (overwriting any
/// fields of the same name). Other payloads are wrapped as
/// `{"job": <payload>, "error": .., "failed_at": ..}`.
#[must_use]
pub fn failed_entry(job: &Job, error: &str, failed_at: DateTime<Utc>) -> Value {
    let mut fields = match job {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = Map::new();
            fields.insert(JOB_FIELD.to_string(), other.clone());
            fields
        }
    };
    fields.insert(ERROR_FIELD.to_string(), Value::String(error.to_string()));
    fields.insert(FAILED_AT_FIELD.to_string(), Value::String(failed_at.to_rfc3339()));
    Value::Object(fields)
}

/// An entry of the failed list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    /// The payload as it was pushed.
    pub job: Job,
    /// Failure message given to `fail`.
    pub error: String,
    /// When the job failed, if the entry records it.
    pub failed_at: Option<DateTime<Utc>>,
}

impl FailedJob {
    /// Splits a failed-list entry back into payload and failure details.
    #[must_use]
    pub fn from_entry(entry: Value) -> Self {
        let mut fields = match entry {
            Value::Object(fields) => fields,
            other => {
                return Self {
                    job: other,
                    error: String::new(),
                    failed_at: None,
                }
            }
        };

        let error = match fields.remove(ERROR_FIELD) {
            Some(Value::String(error)) => error,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let failed_at = fields
            .remove(FAILED_AT_FIELD)
            .and_then(|value| value.as_str().map(str::to_string))
            .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
            .map(|at| at.with_timezone(&Utc));

        let job = if fields.len() == 1 && fields.get(JOB_FIELD).is_some_and(|job| !job.is_object()) {
            fields.remove(JOB_FIELD).unwrap_or_default()
        } else {
            Value::Object(fields)
        };

        Self {
            job,
            error,
            failed_at,
        }
    }
}

/// Queue depths.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,
    /// Jobs waiting to be claimed.
    pub pending: u64,
    /// Jobs claimed and not yet acknowledged.
    pub processing: u64,
    /// Jobs acknowledged as failed.
    pub failed: u64,
}
