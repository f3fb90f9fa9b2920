use std::io::{self, Read};

use tracing::trace;

use crate::reader::LogLineReader;
use crate::source::PageSource;

/// Default advisory length, in KiB, reported for a streaming log
pub const DEFAULT_TAIL_SIZE_KB: u64 = 150;

/// Read-only byte buffer handed to a log viewer.
///
/// The true size of a streamed log is unknown until it has been read, so
/// [`StreamingLog::length`] reports a configurable tail size instead.
pub struct StreamingLog<S: PageSource> {
    reader: LogLineReader<S>,
    advisory_len: u64,
}

impl<S: PageSource> StreamingLog<S> {
    pub fn new(reader: LogLineReader<S>) -> Self {
        Self {
            reader,
            advisory_len: DEFAULT_TAIL_SIZE_KB * 1024,
        }
    }

    pub fn with_tail_size_kb(mut self, tail_size_kb: u64) -> Self {
        self.advisory_len = tail_size_kb.saturating_mul(1024);
        self
    }

    /// Advisory length in bytes
    pub fn length(&self) -> u64 {
        trace!(length = self.advisory_len, "streaming log length");
        self.advisory_len
    }

    pub fn reader(&mut self) -> &mut LogLineReader<S> {
        &mut self.reader
    }

    pub fn into_reader(self) -> LogLineReader<S> {
        self.reader
    }

    /// Copy everything after `offset` into `out`, returning the new offset.
    ///
    /// The usual consumer pattern: the viewer remembers how many bytes it
    /// has rendered and asks for the rest.
    pub fn write_log_to(&mut self, offset: u64, out: &mut impl io::Write) -> io::Result<u64> {
        if offset > 0 {
            self.reader.skip(offset)?;
        }
        io::copy(&mut self.reader, out)?;
        out.flush()?;
        Ok(self.reader.bytes_read())
    }

    pub fn close(&mut self) {
        self.reader.close();
    }
}

impl<S: PageSource> Read for StreamingLog<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_cache::{CursorCache, NoCursors};
    use crate::iterator::LogLineIterator;
    use crate::source::tests::FakeBackend;
    use crate::source::{PaginatedSource, SourceLimits};
    use runscope_types::{LineId, RunStepKey};

    fn log_over(
        lines: u64,
        cursors: impl crate::ByteOffsetMapper + 'static,
    ) -> StreamingLog<PaginatedSource<FakeBackend>> {
        let source = PaginatedSource::new(
            FakeBackend::with_lines(lines),
            LineId(0),
            SourceLimits::default(),
        );
        StreamingLog::new(LogLineReader::new(LogLineIterator::new(source), cursors))
    }

    #[test]
    fn test_length_is_advisory() {
        let log = log_over(1, NoCursors);
        assert_eq!(log.length(), 150 * 1024);
        assert_eq!(log.with_tail_size_kb(4).length(), 4096);
    }

    #[test]
    fn test_write_log_to_continues_from_offset() {
        let cache = CursorCache::new();
        let key = RunStepKey::new("app", 7, None);

        let mut first = log_over(3, cache.scoped(key.clone()));
        let mut out = Vec::new();
        let offset = first.write_log_to(0, &mut out).unwrap();
        first.close();
        assert_eq!(offset, 24);

        let mut second = log_over(3, cache.scoped(key));
        let mut more = Vec::new();
        assert_eq!(second.write_log_to(offset, &mut more).unwrap(), 24);
        assert!(more.is_empty());
    }
}
