//! Task records as stored in the job store.
//!
//! A record is a flat string map (a Redis hash). Decoding is strict: a
//! record without a known status or with unparseable timestamps is reported,
//! never patched up with defaults.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use swath_models::{JobError, JobId, JobSummary, ProcessInputs, TaskState, UnmappedStatus};
use thiserror::Error;

/// A record as read from the store, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub job_id: JobId,
    pub fields: HashMap<String, String>,
}

/// Reasons a stored record cannot be decoded.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no status")]
    MissingStatus,

    #[error(transparent)]
    UnmappedStatus(#[from] UnmappedStatus),

    #[error("field '{field}' is not an RFC 3339 timestamp: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("stored inputs are not valid JSON: {0}")]
    InvalidInputs(#[from] serde_json::Error),
}

/// Decoded task record.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub job_id: JobId,
    pub task_name: Option<String>,
    pub inputs: Option<ProcessInputs>,
    pub state: TaskState,
    /// Encoded result envelope, present once successful
    pub result: Option<String>,
    pub error: Option<JobError>,
    pub date_submitted: Option<DateTime<Utc>>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_done: Option<DateTime<Utc>>,
}

fn timestamp(
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    match fields.get(field).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| RecordError::InvalidTimestamp {
                field,
                value: value.clone(),
            }),
    }
}

impl TaskRecord {
    /// Decode a raw store entry.
    pub fn from_raw(raw: &RawRecord) -> Result<Self, RecordError> {
        let fields = &raw.fields;
        let state: TaskState = fields
            .get("status")
            .ok_or(RecordError::MissingStatus)?
            .parse()?;

        let inputs = match fields.get("inputs") {
            Some(json) => Some(serde_json::from_str(json)?),
            None => None,
        };

        let error = fields.get("error_code").map(|code| {
            JobError::new(
                code.clone(),
                fields.get("error_description").cloned().unwrap_or_default(),
            )
        });

        Ok(Self {
            job_id: raw.job_id.clone(),
            task_name: fields.get("task_name").cloned(),
            inputs,
            state,
            result: fields.get("result").cloned(),
            error,
            date_submitted: timestamp(fields, "date_submitted")?,
            date_started: timestamp(fields, "date_started")?,
            date_done: timestamp(fields, "date_done")?,
        })
    }

    /// Content type of the stored envelope, without decoding the payload.
    fn result_content_type(&self) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct Head {
            content_type: String,
        }
        let stored = self.result.as_deref()?;
        serde_json::from_str::<Head>(stored).ok().map(|h| h.content_type)
    }

    /// Client-facing summary of this record.
    pub fn summary(&self) -> JobSummary {
        let status = self.state.job_status();
        let message = match (&self.state, &self.error) {
            (TaskState::Pending, _) => "Job accepted".to_string(),
            (TaskState::Started, _) => "Job running".to_string(),
            (TaskState::Success, _) => "Job complete".to_string(),
            (TaskState::Failure, Some(error)) => error.to_string(),
            (TaskState::Failure, None) => "Job failed".to_string(),
            (TaskState::Revoked, _) => "Job dismissed".to_string(),
        };

        JobSummary {
            identifier: self.job_id.clone(),
            process_id: self.task_name.clone(),
            status,
            job_submitted_datetime: self.date_submitted,
            job_start_datetime: self.date_started,
            job_end_datetime: self.date_done,
            mimetype: if self.state == TaskState::Success {
                self.result_content_type()
            } else {
                None
            },
            error: self.error.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swath_models::{JobStatus, ResultEnvelope};

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            job_id: JobId::from("job-1"),
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_decode_pending_record() {
        let record = TaskRecord::from_raw(&raw(&[
            ("task_name", "process-netcdf"),
            ("status", "PENDING"),
            ("inputs", r#"{"netcdf_file":"a.nc"}"#),
            ("date_submitted", "2023-01-13T07:22:21+00:00"),
        ]))
        .unwrap();

        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.inputs, Some(ProcessInputs::new("a.nc")));
        let summary = record.summary();
        assert_eq!(summary.status, JobStatus::Accepted);
        assert_eq!(summary.process_id.as_deref(), Some("process-netcdf"));
        assert!(summary.job_submitted_datetime.is_some());
        assert!(summary.mimetype.is_none());
    }

    #[test]
    fn test_decode_failed_record() {
        let record = TaskRecord::from_raw(&raw(&[
            ("status", "FAILURE"),
            ("error_code", "InvalidParameterValue"),
            ("error_description", "bad filename"),
        ]))
        .unwrap();

        let summary = record.summary();
        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(
            summary.error,
            Some(JobError::new("InvalidParameterValue", "bad filename"))
        );
        assert_eq!(summary.message, "InvalidParameterValue: bad filename");
    }

    #[test]
    fn test_summary_reports_result_content_type() {
        let stored = ResultEnvelope::new("image/png", vec![1, 2, 3]).encode();
        let record = TaskRecord::from_raw(&raw(&[("status", "SUCCESS"), ("result", stored.as_str())])).unwrap();
        assert_eq!(record.summary().mimetype.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_missing_status() {
        let err = TaskRecord::from_raw(&raw(&[("task_name", "x")])).unwrap_err();
        assert!(matches!(err, RecordError::MissingStatus));
    }

    #[test]
    fn test_unmapped_status() {
        let err = TaskRecord::from_raw(&raw(&[("status", "RETRY")])).unwrap_err();
        assert!(matches!(err, RecordError::UnmappedStatus(_)));
    }

    #[test]
    fn test_bad_timestamp() {
        let err = TaskRecord::from_raw(&raw(&[("status", "STARTED"), ("date_started", "yesterday")]))
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::InvalidTimestamp { field: "date_started", .. }
        ));
    }
}
