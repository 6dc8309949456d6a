//! Origin metadata required on every memory write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors produced by input validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Where a write came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub task_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    pub fn new(task_id: &str, step_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            step_id: step_id.to_string(),
            source_event_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_source_event(mut self, event_id: &str) -> Self {
        self.source_event_id = Some(event_id.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `task_id` and `step_id` must be non-blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("task_id", &self.task_id)?;
        require("step_id", &self.step_id)
    }
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { field })
    } else {
        Ok(())
    }
}
