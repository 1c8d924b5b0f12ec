//! Script Loader
//!
//! Resolves a script identity (as passed to `new Worker(..)`) to source.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use url::Url;

use crate::JsError;

/// Source provider for worker scripts
pub trait ScriptLoader: Send + Sync {
    fn load(&self, identity: &str) -> Result<String, JsError>;
}

/// Loads `file:` URLs relative to a base
#[derive(Debug, Clone)]
pub struct FileLoader {
    base: Url,
}

impl FileLoader {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Resolve identities against a directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, JsError> {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| load_error(&dir.display().to_string(), e))?
                .join(dir)
        };
        let base = Url::from_directory_path(&absolute).map_err(|()| JsError::Load {
            identity: absolute.display().to_string(),
            reason: "not a usable directory path".into(),
        })?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, identity: &str) -> Result<Url, JsError> {
        let url = self.base.join(identity).map_err(|e| load_error(identity, e))?;
        if url.scheme() != "file" {
            return Err(load_error(identity, format!("unsupported scheme {}", url.scheme())));
        }
        Ok(url)
    }
}

impl ScriptLoader for FileLoader {
    fn load(&self, identity: &str) -> Result<String, JsError> {
        let url = self.resolve(identity)?;
        let path = url
            .to_file_path()
            .map_err(|()| load_error(identity, "not a local path"))?;
        tracing::debug!(identity, path = %path.display(), "loading script");
        std::fs::read_to_string(&path).map_err(|e| load_error(identity, e))
    }
}

/// In-memory scripts keyed by identity
#[derive(Debug, Default)]
pub struct MemoryLoader {
    scripts: RwLock<HashMap<String, String>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, identity: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(identity, source);
        self
    }

    pub fn insert(&self, identity: impl Into<String>, source: impl Into<String>) {
        self.scripts.write().insert(identity.into(), source.into());
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.scripts.read().contains_key(identity)
    }
}

impl ScriptLoader for MemoryLoader {
    fn load(&self, identity: &str) -> Result<String, JsError> {
        self.scripts
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| load_error(identity, "no such script"))
    }
}

fn load_error(identity: &str, reason: impl ToString) -> JsError {
    JsError::Load {
        identity: identity.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_script("echo.js", "onmessage = () => {}");
        assert!(loader.contains("echo.js"));
        assert_eq!(loader.load("echo.js").unwrap(), "onmessage = () => {}");
        assert!(matches!(loader.load("missing.js"), Err(JsError::Load { .. })));
    }

    #[test]
    fn test_file_loader_resolves_relative() {
        let loader = FileLoader::new(Url::parse("file:///srv/scripts/").unwrap());
        let url = loader.resolve("workers/paint.js").unwrap();
        assert_eq!(url.as_str(), "file:///srv/scripts/workers/paint.js");
        assert!(loader.resolve("https://example.com/a.js").is_err());
    }

    #[test]
    fn test_file_loader_reads_from_dir() {
        let dir = std::env::temp_dir().join(format!("fos-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hello.js"), "1 + 1").unwrap();

        let loader = FileLoader::from_dir(&dir).unwrap();
        assert_eq!(loader.load("hello.js").unwrap(), "1 + 1");
        assert!(matches!(loader.load("nope.js"), Err(JsError::Load { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
