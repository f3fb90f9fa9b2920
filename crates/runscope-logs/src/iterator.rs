use std::collections::VecDeque;

use runscope_types::{LineId, LogLine};
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::source::{PageOutcome, PageSource};

/// Text of the synthetic line appended when a circuit breaker cuts a log short
pub const TRUNCATION_MARKER: &str = "…";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Open,
    Exhausted,
    Failed,
    Closed,
}

/// Lazy, finite, non-restartable sequence of log lines.
///
/// Pages are fetched on demand from `hasNext`-style calls; that fetch is the
/// only place a caller can block on the backend.
pub struct LogLineIterator<S> {
    source: S,
    buffer: VecDeque<LogLine>,
    state: State,
    truncation_marker: bool,
    /// Highest id handed over by the source so far
    high_water: Option<LineId>,
}

impl<S: PageSource> LogLineIterator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            state: State::Open,
            truncation_marker: false,
            high_water: None,
        }
    }

    /// Append a trailing [`TRUNCATION_MARKER`] line when a circuit breaker trips
    pub fn with_truncation_marker(mut self, enabled: bool) -> Self {
        self.truncation_marker = enabled;
        self
    }

    /// True if a line is buffered or another page may still be fetched.
    ///
    /// May block on a page fetch.
    pub fn has_next(&mut self) -> Result<bool> {
        loop {
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            match self.state {
                State::Open => {}
                State::Closed => return Err(RetrievalError::Closed),
                State::Exhausted | State::Failed => return Ok(false),
            }

            match self.source.fetch_next_page() {
                Ok(PageOutcome::Page(page)) => {
                    if let Some(max_id) = page.max_id() {
                        self.high_water = Some(self.high_water.map_or(max_id, |h| h.max(max_id)));
                    }
                    self.buffer.extend(page.lines);
                }
                Ok(PageOutcome::Exhausted) => self.state = State::Exhausted,
                Ok(PageOutcome::CircuitBroken(breaker)) => {
                    self.state = State::Exhausted;
                    if self.truncation_marker {
                        debug!(?breaker, "appending truncation marker");
                        let id = self.high_water.unwrap_or(LineId::MIN);
                        self.buffer.push_back(LogLine::new(id, TRUNCATION_MARKER));
                    }
                }
                Err(err) => {
                    self.state = State::Failed;
                    return Err(err);
                }
            }
        }
    }

    /// Next line, or `None` once the sequence is exhausted
    pub fn next_line(&mut self) -> Result<Option<LogLine>> {
        if self.has_next()? {
            Ok(self.buffer.pop_front())
        } else {
            Ok(None)
        }
    }

    /// Skip every line up to and including `id`.
    ///
    /// Drops buffered lines with smaller or equal ids and moves the source
    /// cursor past `id`, so the next page starts after it.
    pub fn skip_to(&mut self, id: LineId) {
        let before = self.buffer.len();
        while self.buffer.front().is_some_and(|line| line.id <= id) {
            self.buffer.pop_front();
        }
        self.source.seek_past(id);
        debug!(
            to = %id,
            skipped_buffered = before - self.buffer.len(),
            "skipped log lines"
        );
    }

    /// Stop fetching and release the source. Idempotent.
    pub fn close(&mut self) {
        if self.state != State::Closed {
            self.state = State::Closed;
            self.buffer.clear();
            self.source.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PageSource> Iterator for LogLineIterator<S> {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Closed {
            return None;
        }
        self.next_line().transpose()
    }
}
