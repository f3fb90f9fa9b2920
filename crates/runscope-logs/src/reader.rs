use std::io::{self, Read};

use runscope_types::LineId;
use tracing::{debug, instrument};

use crate::cursor_cache::{ByteOffsetMapper, ResumePoint};
use crate::error::RetrievalError;
use crate::iterator::LogLineIterator;
use crate::source::PageSource;

/// Byte stream over a [`LogLineIterator`].
///
/// Each line is served as `text + "\n"` in UTF-8. Only the line currently
/// being read is held in memory.
pub struct LogLineReader<S: PageSource> {
    lines: LogLineIterator<S>,
    cursors: Box<dyn ByteOffsetMapper>,
    current: Vec<u8>,
    position: usize,
    bytes_read: u64,
    /// Id of the line `current` was built from
    current_id: Option<LineId>,
    /// Id of the last line whose final byte was delivered
    last_complete_id: Option<LineId>,
    /// Leading bytes of the next line already delivered before a resume
    discard: usize,
}

impl<S: PageSource> LogLineReader<S> {
    pub fn new(lines: LogLineIterator<S>, cursors: impl ByteOffsetMapper + 'static) -> Self {
        Self {
            lines,
            cursors: Box::new(cursors),
            current: Vec::new(),
            position: 0,
            bytes_read: 0,
            current_id: None,
            last_complete_id: None,
            discard: 0,
        }
    }

    /// Bytes delivered so far, including skipped ones
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn last_line_id(&self) -> Option<LineId> {
        self.last_complete_id
    }

    fn line_pending(&self) -> bool {
        self.position < self.current.len()
    }

    /// Load the next line into `current`. Returns false at end of stream.
    fn fill_line(&mut self) -> io::Result<bool> {
        match self.lines.next_line().map_err(io::Error::from)? {
            Some(line) => {
                self.current.clear();
                self.current.extend_from_slice(line.text.as_bytes());
                self.current.push(b'\n');
                self.position = self.discard.min(self.current.len());
                self.discard = 0;
                self.current_id = Some(line.id);
                Ok(true)
            }
            None => {
                self.current.clear();
                self.position = 0;
                self.discard = 0;
                Ok(false)
            }
        }
    }

    /// Resume from a byte offset seen by an earlier read of the same log.
    ///
    /// `n` is counted from the current position. When the cursor cache knows
    /// the offset, the stream jumps to the line after the recorded id and
    /// drops the part of that line an earlier read already delivered. When it
    /// doesn't, nothing is skipped. Either way `n` is returned.
    #[instrument(level = "debug", skip(self), fields(bytes_read = self.bytes_read))]
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        if self.lines.is_closed() {
            return Err(RetrievalError::Closed.into());
        }
        let target = self.bytes_read.saturating_add(n);
        match self.cursors.resume_point_at(target) {
            Some(point) => {
                debug!(
                    target,
                    line_id = ?point.after,
                    partial = point.partial,
                    previous = ?self.last_complete_id,
                    "cursor cache hit"
                );
                if let Some(id) = point.after {
                    self.lines.skip_to(id);
                }
                self.current.clear();
                self.position = 0;
                self.discard = usize::try_from(point.partial).unwrap_or(usize::MAX);
                self.bytes_read = target;
                self.current_id = point.after;
                self.last_complete_id = point.after;
            }
            None => {
                debug!(target, "cursor cache miss, reading from window start");
            }
        }
        Ok(n)
    }

    /// Liveness hint: 1 if more data can be read right now, else 0.
    ///
    /// May block on a page fetch.
    pub fn available(&mut self) -> io::Result<usize> {
        if self.lines.is_closed() {
            return Ok(0);
        }
        if self.line_pending() {
            return Ok(1);
        }
        let more = self.lines.has_next().map_err(io::Error::from)?;
        Ok(usize::from(more))
    }

    /// Record where this read stopped and release the backend. Idempotent.
    #[instrument(level = "debug", skip(self), fields(bytes_read = self.bytes_read, last_line_id = ?self.last_complete_id))]
    pub fn close(&mut self) {
        if self.lines.is_closed() {
            return;
        }
        let partial = if self.line_pending() {
            self.position
        } else {
            self.discard
        };
        if self.last_complete_id.is_some() || partial > 0 {
            let point = ResumePoint {
                after: self.last_complete_id,
                partial: partial as u64,
            };
            self.cursors.record(self.bytes_read, point);
        }
        self.lines.close();
        self.current.clear();
        self.position = 0;
        self.discard = 0;
    }
}

impl<S: PageSource> Read for LogLineReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.lines.is_closed() {
            return Err(RetrievalError::Closed.into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.line_pending() && !self.fill_line()? {
            return Ok(0);
        }

        let remaining = &self.current[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        self.bytes_read += n as u64;
        if !self.line_pending() {
            self.last_complete_id = self.current_id;
        }
        Ok(n)
    }
}

impl<S: PageSource> Drop for LogLineReader<S> {
    fn drop(&mut self) {
        self.close();
    }
}
