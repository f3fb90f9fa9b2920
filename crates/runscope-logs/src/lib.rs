//! Log retrieval engine for runscope
//!
//! This crate turns a paginated, cursor-addressed log backend into a
//! resumable byte stream: page sources with circuit breakers, a lazy line
//! iterator, a byte-stream reader, and the cursor cache that maps byte
//! offsets back to line ids.

mod buffer;
mod cursor_cache;
mod error;
mod iterator;
mod reader;
mod retriever;
mod source;

pub use buffer::{DEFAULT_TAIL_SIZE_KB, StreamingLog};
pub use cursor_cache::{
    ByteOffsetMapper, CursorCache, CursorSnapshot, NoCursors, ResumePoint, ScopedCursors,
    SessionCursors, StreamOffsets,
};
pub use error::{Result, RetrievalError};
pub use iterator::{LogLineIterator, TRUNCATION_MARKER};
pub use reader::LogLineReader;
pub use retriever::{LogStorageRetriever, LogStream, LogsQueryResult, StreamOptions, open_log_stream};
pub use source::{
    Breaker, DEFAULT_MAX_LINES, DEFAULT_MAX_QUERIES, DEFAULT_PAGE_SIZE, PageFetcher, PageOutcome,
    PageSource, PaginatedSource, RetrievalCursor, SourceLimits,
};

// Re-export types used in our public API
pub use runscope_types::{LineId, LogLine, LogsViewHeader, Page, QueryScope, RunStepKey};
