//! Runtime Configuration

use std::time::Duration;

use url::Url;

/// Runtime configuration options
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Heap limit per engine instance (bytes)
    pub memory_limit: usize,

    /// Size of a canvas created without explicit dimensions
    pub canvas_width: u32,
    pub canvas_height: u32,

    /// Base that relative script identities resolve against
    pub script_base: Option<Url>,

    /// Prefix for context thread names
    pub thread_name_prefix: String,

    /// Upper bound for a single `settle` wait
    pub settle_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024, // 32MB
            canvas_width: fos_canvas::DEFAULT_WIDTH,
            canvas_height: fos_canvas::DEFAULT_HEIGHT,
            script_base: None,
            thread_name_prefix: "fos".into(),
            settle_timeout: Duration::from_secs(10),
        }
    }
}

impl RuntimeConfig {
    /// Thread name for a context labelled `label`
    pub fn thread_name(&self, label: &str) -> String {
        format!("{}-{}", self.thread_name_prefix, label)
    }
}
