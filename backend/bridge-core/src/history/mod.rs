//! Bounded record of past pipeline runs, used for diagnostics and as
//! context for code generation.

use common::truncate_chars;

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::{Duration, SystemTime};

use humantime::format_rfc3339_seconds;
use log::{debug, info};
use serde_json::{Value, json};

pub const DEFAULT_MAX_RECORDS: usize = 100;

/// Characters of code kept per success in [`ExecutionHistory::context_for_prompt`].
const CONTEXT_CODE_CHARS: usize = 200;

/// Outcomes listed in the `history` entry of the prompt context.
const CONTEXT_RECENT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// Failed at first, succeeded after a fix.
    Fixed,
    Timeout,
    /// Never executed; generation or validation failed.
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Fixed => "fixed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    /// `success` and `fixed` both count as a working result.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Fixed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Timeout)
    }
}

impl Display for ExecutionStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub timestamp: SystemTime,
    pub request: String,
    pub code: String,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
    pub execution_time: Duration,
    pub attempts: u32,
    pub fixes_applied: Vec<String>,
}

impl ExecutionRecord {
    /// Timestamp as RFC 3339, second precision.
    pub fn timestamp_rfc3339(&self) -> String {
        format_rfc3339_seconds(self.timestamp).to_string()
    }
}

/// Fields supplied by the caller when recording a run; the history assigns
/// the id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub request: String,
    pub code: String,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
    pub execution_time: Duration,
    pub attempts: u32,
    pub fixes_applied: Vec<String>,
}

impl NewRecord {
    pub fn new(
        request: impl Into<String>,
        code: impl Into<String>,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            request: request.into(),
            code: code.into(),
            status,
            stdout: String::new(),
            stderr: String::new(),
            error_message: None,
            execution_time: Duration::ZERO,
            attempts: 1,
            fixes_applied: Vec::new(),
        }
    }
}

/// Ring buffer of [`ExecutionRecord`]s; the oldest is evicted once
/// `max_records` is exceeded.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    max_records: usize,
    counter: u64,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl ExecutionHistory {
    /// `max_records` below one is raised to one.
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        debug!("ExecutionHistory initialized: max_records={max_records}");
        Self {
            records: VecDeque::with_capacity(max_records.min(DEFAULT_MAX_RECORDS)),
            max_records,
            counter: 0,
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Appends a record, evicting the oldest if the buffer is full.
    pub fn add_record(&mut self, record: NewRecord) -> &ExecutionRecord {
        self.counter += 1;
        let record = ExecutionRecord {
            id: format!("exec-{:04}", self.counter),
            timestamp: SystemTime::now(),
            request: record.request,
            code: record.code,
            status: record.status,
            stdout: record.stdout,
            stderr: record.stderr,
            error_message: record.error_message,
            execution_time: record.execution_time,
            attempts: record.attempts,
            fixes_applied: record.fixes_applied,
        };

        debug!(
            "Execution record added: id={}, status={}, attempts={}",
            record.id, record.status, record.attempts
        );
        self.records.push_back(record);

        while self.records.len() > self.max_records {
            if let Some(removed) = self.records.pop_front() {
                debug!("Removed old record {} to maintain limit", removed.id);
            }
        }

        &self.records[self.records.len() - 1]
    }

    /// Newest first.
    pub fn recent(&self, count: usize) -> Vec<&ExecutionRecord> {
        self.records.iter().rev().take(count).collect()
    }

    /// `failed` and `timeout` records, newest first.
    pub fn failures(&self, count: usize) -> Vec<&ExecutionRecord> {
        self.records
            .iter()
            .rev()
            .filter(|record| record.status.is_failure())
            .take(count)
            .collect()
    }

    /// `success` and `fixed` records, newest first.
    pub fn successes(&self, count: usize) -> Vec<&ExecutionRecord> {
        self.records
            .iter()
            .rev()
            .filter(|record| record.status.is_success())
            .take(count)
            .collect()
    }

    /// Summary sized for a generation prompt.
    ///
    /// ```text
    /// {
    ///   "history": ["add a cube → ✓", ...],
    ///   "recent_successes": [{"request": ..., "code_snippet": ...}],
    ///   "recent_failures": [{"request": ..., "error": ...}]
    /// }
    /// ```
    pub fn context_for_prompt(&self, max_examples: usize) -> Value {
        let history: Vec<String> = self
            .recent(CONTEXT_RECENT)
            .into_iter()
            .map(|record| {
                let mark = if record.status.is_success() { '✓' } else { '✗' };
                format!("{} → {mark}", record.request)
            })
            .collect();

        let recent_successes: Vec<Value> = self
            .successes(max_examples)
            .into_iter()
            .map(|record| {
                json!({
                    "request": record.request,
                    "code_snippet": truncate_chars(&record.code, CONTEXT_CODE_CHARS),
                })
            })
            .collect();

        let recent_failures: Vec<Value> = self
            .failures(max_examples)
            .into_iter()
            .map(|record| {
                json!({
                    "request": record.request,
                    "error": record.error_message,
                })
            })
            .collect();

        json!({
            "history": history,
            "recent_successes": recent_successes,
            "recent_failures": recent_failures,
        })
    }

    pub fn clear(&mut self) {
        let removed = self.records.len();
        self.records.clear();
        info!("Execution history cleared: records_removed={removed}");
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Share of `success`/`fixed` records; `0.0` when empty.
    pub fn success_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let successes = self
            .records
            .iter()
            .filter(|record| record.status.is_success())
            .count();
        successes as f64 / self.records.len() as f64
    }
}
