//! Content sources: where planning and delivery read file text from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::debug;

/// Reads file text given an absolute path.
///
/// Text that is not valid UTF-8 fails with [`std::io::ErrorKind::InvalidData`];
/// split ranges are byte offsets and must address the file as stored.
#[cfg_attr(test, mockall::automock)]
pub trait ContentSource: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Filesystem reader with a read-through cache.
///
/// Entries are revalidated against modification time and length, so a file
/// edited between planning and delivery is re-read.
#[derive(Default)]
pub struct FsContentSource {
    cache: RwLock<HashMap<PathBuf, (Option<SystemTime>, u64, Arc<str>)>>,
}

impl FsContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached files.
    pub fn cache_size(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl ContentSource for FsContentSource {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified().ok();
        let len = metadata.len();

        if let Ok(cache) = self.cache.read() {
            if let Some((m, l, content)) = cache.get(path) {
                if *m == modified && *l == len {
                    debug!(path = %path.display(), "Content cache hit");
                    return Ok(content.to_string());
                }
            }
        }

        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8: {}", path.display(), e.utf8_error()),
            )
        })?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path.to_path_buf(), (modified, len, Arc::from(content.as_str())));
        }
        Ok(content)
    }
}

/// In-memory source, for tests and for callers that already hold the text.
#[derive(Debug, Default, Clone)]
pub struct MemoryContentSource {
    files: HashMap<PathBuf, String>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }
}

impl ContentSource for MemoryContentSource {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no in-memory content for {}", path.display()),
            )
        })
    }
}
