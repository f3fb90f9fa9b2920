//! Paginated line sources
//!
//! A [`PageSource`] hands out pages of log lines in cursor order. The
//! [`PaginatedSource`] implements the backend-agnostic part of that contract
//! (cursor advance, circuit breakers, clock-skew tolerance) on top of a
//! [`PageFetcher`] that only knows how to run one range query.

use runscope_types::{LineId, LogLine, Page};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Default number of lines requested per page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default cap on range queries per retrieval
pub const DEFAULT_MAX_QUERIES: u32 = 100;

/// Default cap on lines per retrieval (effectively unbounded)
pub const DEFAULT_MAX_LINES: u64 = u64::MAX;

/// Which circuit breaker ended a retrieval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Breaker {
    MaxLines,
    MaxQueries,
}

/// Result of asking a source for its next page
#[derive(Debug)]
pub enum PageOutcome {
    /// Lines to emit. May be empty without ending the stream.
    Page(Page),
    /// No more data is available in the window
    Exhausted,
    /// A circuit breaker stopped the retrieval; the stream ends cleanly
    CircuitBroken(Breaker),
}

/// Pull-based supplier of pages, consumed by [`crate::LogLineIterator`]
pub trait PageSource: Send {
    fn fetch_next_page(&mut self) -> Result<PageOutcome>;

    /// Move the cursor so the next fetch starts strictly after `id`.
    /// Never moves the cursor backwards.
    fn seek_past(&mut self, id: LineId);

    /// Release backend resources. Called at most once.
    fn close(&mut self) {}
}

impl PageSource for Box<dyn PageSource> {
    fn fetch_next_page(&mut self) -> Result<PageOutcome> {
        (**self).fetch_next_page()
    }

    fn seek_past(&mut self, id: LineId) {
        (**self).seek_past(id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Runs a single range query against a backend
pub trait PageFetcher: Send {
    /// Fetch up to `limit` lines with ids `>= window_start`, oldest first
    fn fetch(&mut self, window_start: LineId, limit: usize) -> Result<Page>;

    fn close(&mut self) {}
}

/// Volume bounds for one retrieval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceLimits {
    pub page_size: usize,
    pub max_queries: u32,
    pub max_lines: u64,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_queries: DEFAULT_MAX_QUERIES,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl SourceLimits {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_queries(mut self, max_queries: u32) -> Self {
        self.max_queries = max_queries;
        self
    }

    pub fn with_max_lines(mut self, max_lines: u64) -> Self {
        self.max_lines = max_lines;
        self
    }
}

/// Mutable pagination state owned by one [`PaginatedSource`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalCursor {
    pub next_window_start: LineId,
    pub lines_emitted: u64,
    pub queries_issued: u32,
    pub exhausted: bool,
    pub tripped: Option<Breaker>,
}

impl RetrievalCursor {
    pub fn new(window_start: LineId) -> Self {
        Self {
            next_window_start: window_start,
            lines_emitted: 0,
            queries_issued: 0,
            exhausted: false,
            tripped: None,
        }
    }
}

/// Cursor-driven pagination over a [`PageFetcher`]
pub struct PaginatedSource<F> {
    fetcher: F,
    limits: SourceLimits,
    cursor: RetrievalCursor,
    /// Human-readable stream name for log events
    label: String,
}

impl<F: PageFetcher> PaginatedSource<F> {
    pub fn new(fetcher: F, window_start: LineId, limits: SourceLimits) -> Self {
        Self {
            fetcher,
            limits,
            cursor: RetrievalCursor::new(window_start),
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn cursor(&self) -> &RetrievalCursor {
        &self.cursor
    }

    pub fn limits(&self) -> SourceLimits {
        self.limits
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn tripped_breaker(&self) -> Option<Breaker> {
        if self.cursor.lines_emitted >= self.limits.max_lines {
            Some(Breaker::MaxLines)
        } else if self.cursor.queries_issued >= self.limits.max_queries {
            Some(Breaker::MaxQueries)
        } else {
            None
        }
    }

    /// Sort by id (stable, so equal ids keep backend order) and move the cursor
    fn absorb(&mut self, window_start: LineId, mut lines: Vec<LogLine>) -> Vec<LogLine> {
        lines.sort_by_key(|line| line.id);

        for line in lines.iter().filter(|line| line.id < window_start) {
            warn!(
                stream = %self.label,
                line_id = %line.id,
                window_start = %window_start,
                "out-of-order log line older than the query window, emitting anyway"
            );
        }

        if let Some(max_id) = lines.last().map(|line| line.id) {
            let next = max_id.next();
            if next > self.cursor.next_window_start {
                self.cursor.next_window_start = next;
            }
        }

        let remaining = self.limits.max_lines - self.cursor.lines_emitted;
        if lines.len() as u64 > remaining {
            lines.truncate(remaining as usize);
        }
        self.cursor.lines_emitted += lines.len() as u64;
        lines
    }
}

impl<F: PageFetcher> PageSource for PaginatedSource<F> {
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(stream = %self.label, window_start = %self.cursor.next_window_start)
    )]
    fn fetch_next_page(&mut self) -> Result<PageOutcome> {
        if self.cursor.exhausted {
            return Ok(PageOutcome::Exhausted);
        }

        if let Some(breaker) = self.tripped_breaker() {
            info!(
                stream = %self.label,
                ?breaker,
                lines_emitted = self.cursor.lines_emitted,
                queries_issued = self.cursor.queries_issued,
                "circuit breaker tripped, ending retrieval"
            );
            self.cursor.exhausted = true;
            self.cursor.tripped = Some(breaker);
            return Ok(PageOutcome::CircuitBroken(breaker));
        }

        let window_start = self.cursor.next_window_start;
        self.cursor.queries_issued += 1;
        let page = self.fetcher.fetch(window_start, self.limits.page_size)?;
        let status = page.status;
        let fetched = page.len();

        let lines = self.absorb(window_start, page.lines);
        debug!(
            fetched,
            emitted = lines.len(),
            next_window_start = %self.cursor.next_window_start,
            "page loaded"
        );

        // a page cut by the line budget must still report the breaker
        let truncated = lines.len() < fetched;
        if fetched < self.limits.page_size && !truncated {
            self.cursor.exhausted = true;
        }

        if lines.is_empty() && self.cursor.exhausted {
            return Ok(PageOutcome::Exhausted);
        }
        Ok(PageOutcome::Page(Page::new(lines, status)))
    }

    fn seek_past(&mut self, id: LineId) {
        let next = id.next();
        if next > self.cursor.next_window_start {
            debug!(stream = %self.label, from = %self.cursor.next_window_start, to = %next, "cursor moved forward");
            self.cursor.next_window_start = next;
        }
    }

    fn close(&mut self) {
        self.cursor.exhausted = true;
        self.fetcher.close();
    }
}
