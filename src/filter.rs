use std::io::{self, Write};

use regex::Regex;

/// Compiled `--grep` pattern
#[derive(Clone, Debug)]
pub struct LineFilter {
    regex: Regex,
    invert: bool,
}

impl LineFilter {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = if case_insensitive {
            Regex::new(&format!("(?i){}", pattern))?
        } else {
            Regex::new(pattern)?
        };
        Ok(Self {
            regex,
            invert: false,
        })
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line) != self.invert
    }
}

/// Writer that forwards only matching lines to `inner`.
///
/// Bytes are counted as written whether or not the line is kept, so the
/// stream's byte offsets stay those of the unfiltered log.
pub struct FilteredWriter<W: Write> {
    inner: W,
    filter: Option<LineFilter>,
    partial: Vec<u8>,
}

impl<W: Write> FilteredWriter<W> {
    pub fn new(inner: W, filter: Option<LineFilter>) -> Self {
        Self {
            inner,
            filter,
            partial: Vec::new(),
        }
    }

    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        let keep = match &self.filter {
            Some(filter) => filter.matches(String::from_utf8_lossy(line).trim_end_matches('\n')),
            None => true,
        };
        if keep {
            self.inner.write_all(line)?;
        }
        Ok(())
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for FilteredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.filter.is_none() {
            return self.inner.write(buf);
        }
        let mut rest = buf;
        while let Some(end) = rest.iter().position(|b| *b == b'\n') {
            let (line, tail) = rest.split_at(end + 1);
            if self.partial.is_empty() {
                self.emit(line)?;
            } else {
                let mut joined = std::mem::take(&mut self.partial);
                joined.extend_from_slice(line);
                self.emit(&joined)?;
            }
            rest = tail;
        }
        self.partial.extend_from_slice(rest);
        Ok(buf.len())
    }

    /// A trailing line without `\n` is only filtered on flush
    fn flush(&mut self) -> io::Result<()> {
        if !self.partial.is_empty() {
            let last = std::mem::take(&mut self.partial);
            self.emit(&last)?;
        }
        self.inner.flush()
    }
}
