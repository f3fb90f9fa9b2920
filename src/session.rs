//! Cursor cache persistence for CLI sessions
//!
//! A viewer process keeps its cursor cache in memory. The CLI exits after
//! every `cat`, so the cache for a named session is saved as JSON under
//! `$XDG_CACHE_HOME/runscope/sessions/` and loaded again by the next call.

use std::fs;
use std::io;
use std::path::PathBuf;

use runscope_logs::{CursorCache, CursorSnapshot};
use tracing::{debug, warn};

/// Directory holding one file per named session
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user's cache directory
    pub fn default_location() -> Option<Self> {
        dirs::cache_dir().map(|dir| Self::new(dir.join("runscope").join("sessions")))
    }

    fn path(&self, name: &str) -> io::Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid session name '{}'", name),
            ));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    /// Load a session's cursors. Missing or unreadable files start a fresh session.
    pub fn load(&self, name: &str) -> io::Result<CursorCache> {
        let path = self.path(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(session = name, "new session");
                return Ok(CursorCache::new());
            }
            Err(e) => return Err(e),
        };
        match serde_json::from_str::<CursorSnapshot>(&content) {
            Ok(snapshot) => {
                debug!(session = name, streams = snapshot.streams.len(), "session loaded");
                Ok(CursorCache::from_snapshot(snapshot))
            }
            Err(e) => {
                warn!(session = name, error = %e, "discarding corrupt session file");
                Ok(CursorCache::new())
            }
        }
    }

    pub fn save(&self, name: &str, cursors: &CursorCache) -> io::Result<()> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(&cursors.snapshot())?;
        fs::write(&path, content)?;
        debug!(session = name, path = %path.display(), "session saved");
        Ok(())
    }

    /// Forget a session entirely
    pub fn clear(&self, name: &str) -> io::Result<bool> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runscope_logs::{LineId, ResumePoint, RunStepKey};
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path().join("sessions"));
        let key = RunStepKey::new("my-war/master", 384, Some("12".to_string()));

        let cursors = CursorCache::new();
        let point = ResumePoint::after(LineId(1_700_000_000_000_002_000)).with_partial(4);
        cursors.put(&key, 30, point);
        store.save("viewer-1", &cursors).unwrap();

        let loaded = store.load("viewer-1").unwrap();
        assert_eq!(loaded.get(&key, 30), Some(point));
        assert_eq!(loaded.get(&key, 31), None);
    }

    #[test]
    fn test_missing_and_corrupt_sessions_start_empty() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        assert!(store.load("fresh").unwrap().is_empty());

        fs::write(temp.path().join("broken.json"), "{not json").unwrap();
        assert!(store.load("broken").unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        store.save("s", &CursorCache::new()).unwrap();
        assert!(store.clear("s").unwrap());
        assert!(!store.clear("s").unwrap());
    }

    #[test]
    fn test_session_names_cannot_escape_the_directory() {
        let store = SessionStore::new("/tmp/runscope-sessions");
        for name in ["", "../x", "a/b", ".hidden"] {
            assert_eq!(
                store.load(name).unwrap_err().kind(),
                io::ErrorKind::InvalidInput,
                "{}",
                name
            );
        }
    }
}
