use chrono::{DateTime, Utc};
use runscope_types::{LogsViewHeader, QueryScope};
use tracing::debug;

use crate::buffer::{DEFAULT_TAIL_SIZE_KB, StreamingLog};
use crate::cursor_cache::{ByteOffsetMapper, CursorCache};
use crate::error::Result;
use crate::iterator::LogLineIterator;
use crate::reader::LogLineReader;
use crate::source::PageSource;

/// Stream type returned by every [`LogStorageRetriever`]
pub type LogStream = StreamingLog<Box<dyn PageSource>>;

/// What a log viewer gets back: the bytes plus a link to the backend's UI
pub struct LogsQueryResult {
    pub stream: LogStream,
    pub header: LogsViewHeader,
    /// True when the run has finished and the log will not grow
    pub complete: bool,
}

/// Capability interface, one implementation per log backend
pub trait LogStorageRetriever: Send + Sync {
    /// Display name of the backend
    fn backend_name(&self) -> &str;

    /// Open a resumable stream over `scope`.
    ///
    /// The first page is fetched before returning, so an unreachable backend
    /// or a failing query is reported here rather than on the first read.
    fn retrieve(&self, scope: &QueryScope, cursors: &CursorCache) -> Result<LogsQueryResult>;

    /// Log of a whole pipeline run
    fn overall_log(
        &self,
        pipeline_id: &str,
        run_number: u64,
        trace_id: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        cursors: &CursorCache,
    ) -> Result<LogsQueryResult> {
        let mut scope = QueryScope::new(pipeline_id, run_number, trace_id, start_time);
        scope.end_time = end_time;
        self.retrieve(&scope, cursors)
    }

    /// Log of a single step of a pipeline run
    #[allow(clippy::too_many_arguments)]
    fn step_log(
        &self,
        pipeline_id: &str,
        run_number: u64,
        step_id: &str,
        trace_id: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        cursors: &CursorCache,
    ) -> Result<LogsQueryResult> {
        let mut scope =
            QueryScope::new(pipeline_id, run_number, trace_id, start_time).with_step(step_id);
        scope.end_time = end_time;
        self.retrieve(&scope, cursors)
    }
}

/// Knobs shared by every backend when wiring a stream
#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    pub truncation_marker: bool,
    pub tail_size_kb: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            truncation_marker: true,
            tail_size_kb: DEFAULT_TAIL_SIZE_KB,
        }
    }
}

/// Wire source -> iterator -> reader -> buffer and fetch the first page
pub fn open_log_stream(
    source: Box<dyn PageSource>,
    cursors: impl ByteOffsetMapper + 'static,
    options: StreamOptions,
) -> Result<LogStream> {
    let mut lines = LogLineIterator::new(source).with_truncation_marker(options.truncation_marker);
    let has_lines = lines.has_next()?;
    debug!(has_lines, "log stream opened");

    let reader = LogLineReader::new(lines, cursors);
    Ok(StreamingLog::new(reader).with_tail_size_kb(options.tail_size_kb))
}
