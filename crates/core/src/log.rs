// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entry shape. The append-only log itself (with its offset/dedup
//! semantics) lives in `orra-storage`; this crate only defines the entry
//! that travels through it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    TaskOutput,
    TaskStatus,
    TaskFailure,
    CompensationStored,
    CompensationAttempted,
    CompensationComplete,
    CompensationPartial,
    CompensationFailure,
    CompensationExpired,
}

crate::simple_display! {
    LogEntryType {
        TaskOutput => "task_output",
        TaskStatus => "task_status",
        TaskFailure => "task_failure",
        CompensationStored => "compensation_stored",
        CompensationAttempted => "compensation_attempted",
        CompensationComplete => "compensation_complete",
        CompensationPartial => "compensation_partial",
        CompensationFailure => "compensation_failure",
        CompensationExpired => "compensation_expired",
    }
}

/// A single entry in an orchestration's append-only log.
///
/// `id` is the dedup key: appending an entry whose `id` has already been
/// seen is a no-op (§4.1). `offset` is assigned by the log on append, not by
/// the producer — entries constructed here carry a placeholder offset of 0
/// until appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub offset: u64,
    #[serde(rename = "type")]
    pub entry_type: LogEntryType,
    pub id: String,
    pub value: Value,
    pub producer_id: String,
    pub attempt_num: u32,
    pub timestamp_ms: u64,
}

impl LogEntry {
    pub fn new(
        entry_type: LogEntryType,
        id: impl Into<String>,
        value: Value,
        producer_id: impl Into<String>,
        attempt_num: u32,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            offset: 0,
            entry_type,
            id: id.into(),
            value,
            producer_id: producer_id.into(),
            attempt_num,
            timestamp_ms,
        }
    }
}
