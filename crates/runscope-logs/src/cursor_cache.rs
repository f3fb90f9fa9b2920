//! Byte offset to line id translation
//!
//! Consumers resume a log by byte offset while the backend only understands
//! line ids. A [`CursorCache`] remembers, per log stream, where in the line
//! sequence a previously read byte offset falls. It lives as long as the
//! caller's session and is shared by every retrieval of that session.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use runscope_types::{LineId, RunStepKey};
use serde::{Deserialize, Serialize};

/// Position of a byte offset in the line sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Last line delivered in full, `None` if the read stopped inside the first line
    pub after: Option<LineId>,
    /// Bytes of the line following `after` that were already delivered
    #[serde(default)]
    pub partial: u64,
}

impl ResumePoint {
    /// Offset that falls exactly on the end of line `id`
    pub fn after(id: LineId) -> Self {
        Self {
            after: Some(id),
            partial: 0,
        }
    }

    pub fn with_partial(mut self, partial: u64) -> Self {
        self.partial = partial;
        self
    }
}

impl From<LineId> for ResumePoint {
    fn from(id: LineId) -> Self {
        Self::after(id)
    }
}

/// Translation between consumed bytes and line positions for one log stream
pub trait ByteOffsetMapper: Send + Sync {
    /// `None` if the offset was never recorded
    fn resume_point_at(&self, bytes: u64) -> Option<ResumePoint>;

    fn record(&self, bytes: u64, point: ResumePoint);
}

type OffsetMap = Arc<Mutex<BTreeMap<u64, ResumePoint>>>;

/// Session-scoped cache of `(stream, byte offset) -> resume point`.
///
/// Each stream has its own lock so concurrent viewers of unrelated logs never
/// contend; the outer lock is only held to find or create a stream's map.
#[derive(Debug, Default)]
pub struct CursorCache {
    streams: RwLock<HashMap<RunStepKey, OffsetMap>>,
}

impl CursorCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn offsets(&self, key: &RunStepKey) -> OffsetMap {
        if let Some(map) = self.streams.read().get(key) {
            return Arc::clone(map);
        }
        let mut streams = self.streams.write();
        Arc::clone(streams.entry(key.clone()).or_default())
    }

    pub fn get(&self, key: &RunStepKey, bytes: u64) -> Option<ResumePoint> {
        let map = self.streams.read().get(key).map(Arc::clone)?;
        let offsets = map.lock();
        offsets.get(&bytes).copied()
    }

    pub fn put(&self, key: &RunStepKey, bytes: u64, point: impl Into<ResumePoint>) {
        self.offsets(key).lock().insert(bytes, point.into());
    }

    /// Mapper bound to one stream, handed to a [`crate::LogLineReader`]
    pub fn scoped(&self, key: RunStepKey) -> ScopedCursors {
        ScopedCursors {
            offsets: self.offsets(&key),
            key,
        }
    }

    /// Drop everything recorded for a stream
    pub fn forget(&self, key: &RunStepKey) -> bool {
        self.streams.write().remove(key).is_some()
    }

    /// Number of streams with at least one recorded offset
    pub fn len(&self) -> usize {
        self.streams
            .read()
            .values()
            .filter(|map| !map.lock().is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        let streams = self.streams.read();
        let mut entries: Vec<StreamOffsets> = streams
            .iter()
            .map(|(key, map)| StreamOffsets {
                key: key.clone(),
                offsets: map.lock().clone(),
            })
            .filter(|entry| !entry.offsets.is_empty())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CursorSnapshot { streams: entries }
    }

    pub fn from_snapshot(snapshot: CursorSnapshot) -> Self {
        let streams = snapshot
            .streams
            .into_iter()
            .map(|entry| (entry.key, Arc::new(Mutex::new(entry.offsets))))
            .collect();
        Self {
            streams: RwLock::new(streams),
        }
    }
}

/// [`ByteOffsetMapper`] for a single stream of a [`CursorCache`]
#[derive(Clone)]
pub struct ScopedCursors {
    key: RunStepKey,
    offsets: OffsetMap,
}

impl ScopedCursors {
    pub fn key(&self) -> &RunStepKey {
        &self.key
    }
}

impl ByteOffsetMapper for ScopedCursors {
    fn resume_point_at(&self, bytes: u64) -> Option<ResumePoint> {
        self.offsets.lock().get(&bytes).copied()
    }

    fn record(&self, bytes: u64, point: ResumePoint) {
        self.offsets.lock().insert(bytes, point);
    }
}

/// Mapper that remembers nothing, for one-shot reads
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCursors;

impl ByteOffsetMapper for NoCursors {
    fn resume_point_at(&self, _bytes: u64) -> Option<ResumePoint> {
        None
    }

    fn record(&self, _bytes: u64, _point: ResumePoint) {}
}

/// Serializable form of a [`CursorCache`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub streams: Vec<StreamOffsets>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOffsets {
    pub key: RunStepKey,
    pub offsets: BTreeMap<u64, ResumePoint>,
}

/// Cursor caches keyed by an opaque, caller-supplied session token
#[derive(Default)]
pub struct SessionCursors {
    sessions: RwLock<HashMap<String, Arc<CursorCache>>>,
}

impl SessionCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache for a session, created on first use
    pub fn session(&self, token: &str) -> Arc<CursorCache> {
        if let Some(cache) = self.sessions.read().get(token) {
            return Arc::clone(cache);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(token.to_string()).or_default())
    }

    /// Release a session's cache when the session ends
    pub fn end_session(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }
}
