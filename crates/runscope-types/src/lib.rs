//! Shared types for runscope
//!
//! This crate contains data structures used across multiple runscope crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Log Line Types
// ============================================================================

/// Backend-native position of a log line.
///
/// For Loki this is the entry timestamp in nanoseconds since the epoch.
/// Ids are totally ordered but not dense: consecutive lines may have gaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub u64);

impl LineId {
    pub const MIN: LineId = LineId(0);

    /// The first id strictly after this one
    pub fn next(self) -> LineId {
        LineId(self.0.saturating_add(1))
    }

    pub fn from_instant(instant: DateTime<Utc>) -> LineId {
        LineId(instant_to_epoch_nanos(instant))
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LineId {
    fn from(value: u64) -> Self {
        LineId(value)
    }
}

/// A single log line as stored in the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub id: LineId,
    pub text: String,
}

impl LogLine {
    pub fn new(id: impl Into<LineId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// One response worth of log lines, in the order the backend returned them
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub lines: Vec<LogLine>,
    /// HTTP status of the request that produced this page (0 for synthetic pages)
    pub status: u16,
}

impl Page {
    pub fn new(lines: Vec<LogLine>, status: u16) -> Self {
        Self { lines, status }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Highest id in the page, regardless of position
    pub fn max_id(&self) -> Option<LineId> {
        self.lines.iter().map(|l| l.id).max()
    }
}

// ============================================================================
// Query Scope
// ============================================================================

/// Identifies one logical log stream: a whole pipeline run, or one step of it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryScope {
    pub pipeline_id: String,
    pub run_number: u64,
    pub trace_id: String,
    pub step_id: Option<String>,
    pub start_time: DateTime<Utc>,
    /// `None` while the run is still going
    pub end_time: Option<DateTime<Utc>>,
}

impl QueryScope {
    pub fn new(
        pipeline_id: impl Into<String>,
        run_number: u64,
        trace_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            run_number,
            trace_id: trace_id.into(),
            step_id: None,
            start_time,
            end_time: None,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// True once the run has finished and the window is closed
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn end_nanos(&self) -> Option<u64> {
        self.end_time.map(instant_to_epoch_nanos)
    }

    pub fn key(&self) -> RunStepKey {
        RunStepKey {
            pipeline_id: self.pipeline_id.clone(),
            run_number: self.run_number,
            step_id: self.step_id.clone(),
        }
    }
}

/// Key of a log stream inside a cursor cache
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunStepKey {
    pub pipeline_id: String,
    pub run_number: u64,
    pub step_id: Option<String>,
}

impl RunStepKey {
    pub fn new(pipeline_id: impl Into<String>, run_number: u64, step_id: Option<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            run_number,
            step_id,
        }
    }
}

impl fmt::Display for RunStepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step) => write!(f, "{}#{}/{}", self.pipeline_id, self.run_number, step),
            None => write!(f, "{}#{}", self.pipeline_id, self.run_number),
        }
    }
}

// ============================================================================
// Visualization
// ============================================================================

/// Header rendered above a log, linking to the backend's own viewer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogsViewHeader {
    pub backend_name: String,
    pub url: String,
    pub icon_url: Option<String>,
}

impl LogsViewHeader {
    pub fn new(backend_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.into(),
            url: url.into(),
            icon_url: None,
        }
    }

    pub fn with_icon(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn message(&self) -> String {
        format!("View logs in {}", self.backend_name)
    }
}

// ============================================================================
// Time Conversion
// ============================================================================

/// Convert an instant to nanoseconds since the epoch (`seconds * 1e9 + nanos`).
///
/// Instants before the epoch clamp to 0.
pub fn instant_to_epoch_nanos(instant: DateTime<Utc>) -> u64 {
    let seconds = instant.timestamp();
    if seconds < 0 {
        return 0;
    }
    (seconds as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(u64::from(instant.timestamp_subsec_nanos()))
}

/// Inverse of [`instant_to_epoch_nanos`]
pub fn epoch_nanos_to_instant(nanos: u64) -> DateTime<Utc> {
    let seconds = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(seconds, subsec).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_nanos_keep_subsecond_precision() {
        let instant = Utc.timestamp_opt(1_718_111_754, 515_426_123).unwrap();
        assert_eq!(instant_to_epoch_nanos(instant), 1_718_111_754_515_426_123);
        assert_eq!(epoch_nanos_to_instant(1_718_111_754_515_426_123), instant);
    }

    #[test]
    fn test_nanos_before_epoch_clamp() {
        let instant = Utc.timestamp_opt(-10, 0).unwrap();
        assert_eq!(instant_to_epoch_nanos(instant), 0);
        assert_eq!(LineId::from_instant(instant), LineId::MIN);
    }

    #[test]
    fn test_page_max_id_ignores_position() {
        let page = Page::new(
            vec![LogLine::new(5, "a"), LogLine::new(9, "b"), LogLine::new(7, "c")],
            200,
        );
        assert_eq!(page.max_id(), Some(LineId(9)));
        assert_eq!(Page::default().max_id(), None);
    }

    #[test]
    fn test_scope_key_includes_step() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let scope = QueryScope::new("my-war/master", 384, "abc", start).with_step("12");
        assert_eq!(scope.key().to_string(), "my-war/master#384/12");
        assert!(!scope.is_complete());
    }

    #[test]
    fn test_header_message() {
        let header = LogsViewHeader::new("Grafana", "http://grafana/explore");
        assert_eq!(header.message(), "View logs in Grafana");
    }
}
