//! Runtime Environment
//!
//! Process-level collaborators shared by every context: configuration,
//! engine factory, script loader, graphics backend and the SharedWorker
//! registry. An embedding normally builds one environment.

use std::sync::Arc;

use fos_canvas::{GraphicsBackend, RasterBackend};

use crate::config::RuntimeConfig;
use crate::context::{ContextKind, ExecutionContext, Port};
use crate::engine_trait::EngineFactory;
use crate::loader::{FileLoader, ScriptLoader};
use crate::worker::SharedWorkerRegistry;
use crate::JsError;

/// Shared runtime environment
pub struct RuntimeEnv {
    pub(crate) config: RuntimeConfig,
    pub(crate) engines: Arc<dyn EngineFactory>,
    pub(crate) loader: Arc<dyn ScriptLoader>,
    pub(crate) graphics: Arc<dyn GraphicsBackend>,
    pub(crate) shared_workers: SharedWorkerRegistry,
}

impl RuntimeEnv {
    pub fn builder() -> RuntimeEnvBuilder {
        RuntimeEnvBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engines.name()
    }

    pub fn graphics(&self) -> &Arc<dyn GraphicsBackend> {
        &self.graphics
    }

    pub fn shared_workers(&self) -> &SharedWorkerRegistry {
        &self.shared_workers
    }

    /// Root context for a driving application
    pub fn main_context(self: &Arc<Self>) -> Result<ExecutionContext, JsError> {
        ExecutionContext::new(self, ContextKind::Main)
    }

    /// Connect to the shared worker for `identity`, creating it on first use
    pub fn connect_shared_worker(self: &Arc<Self>, identity: &str) -> Result<Port, JsError> {
        self.shared_workers.connect(self, identity)
    }

    /// Terminate every shared worker
    pub fn shutdown(&self) {
        self.shared_workers.terminate_all();
    }
}

impl std::fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("config", &self.config)
            .field("engine", &self.engines.name())
            .field("graphics", &self.graphics.name())
            .field("shared_workers", &self.shared_workers.len())
            .finish()
    }
}

/// Builder for [`RuntimeEnv`]
#[derive(Default)]
pub struct RuntimeEnvBuilder {
    config: RuntimeConfig,
    engines: Option<Arc<dyn EngineFactory>>,
    loader: Option<Arc<dyn ScriptLoader>>,
    graphics: Option<Arc<dyn GraphicsBackend>>,
}

impl RuntimeEnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine_factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.engines = Some(Arc::new(factory));
        self
    }

    pub fn loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn graphics(mut self, backend: impl GraphicsBackend + 'static) -> Self {
        self.graphics = Some(Arc::new(backend));
        self
    }

    /// Missing pieces default to QuickJS, a file loader over
    /// `config.script_base` (or the working directory) and tiny-skia
    pub fn build(self) -> Result<Arc<RuntimeEnv>, JsError> {
        let engines = match self.engines {
            Some(engines) => engines,
            None => default_engine()?,
        };
        let loader = match self.loader {
            Some(loader) => loader,
            None => match &self.config.script_base {
                Some(base) => Arc::new(FileLoader::new(base.clone())),
                None => Arc::new(FileLoader::from_dir(".")?),
            },
        };
        let graphics = self.graphics.unwrap_or_else(|| Arc::new(RasterBackend));

        tracing::debug!(engine = engines.name(), graphics = graphics.name(), "runtime environment ready");
        Ok(Arc::new(RuntimeEnv {
            config: self.config,
            engines,
            loader,
            graphics,
            shared_workers: SharedWorkerRegistry::new(),
        }))
    }
}

#[cfg(feature = "quickjs")]
fn default_engine() -> Result<Arc<dyn EngineFactory>, JsError> {
    Ok(Arc::new(crate::quickjs::QuickJsFactory))
}

#[cfg(not(feature = "quickjs"))]
fn default_engine() -> Result<Arc<dyn EngineFactory>, JsError> {
    Err(JsError::EngineUnavailable(
        "no engine factory configured and the quickjs feature is disabled".into(),
    ))
}

#[cfg(all(test, feature = "quickjs"))]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    #[test]
    fn test_builder_defaults() {
        let env = RuntimeEnv::builder()
            .engine_factory(crate::quickjs::QuickJsFactory)
            .loader(MemoryLoader::new())
            .build()
            .unwrap();
        assert_eq!(env.engine_name(), "quickjs");
        assert_eq!(env.graphics().name(), "tiny-skia");
        assert_eq!(env.config().memory_limit, 32 * 1024 * 1024);
        assert_eq!(env.shared_workers().len(), 0);
    }

    #[test]
    fn test_custom_config() {
        let config = RuntimeConfig {
            canvas_width: 64,
            canvas_height: 32,
            ..RuntimeConfig::default()
        };
        let env = RuntimeEnv::builder()
            .config(config)
            .loader(MemoryLoader::new())
            .build()
            .unwrap();
        assert_eq!(env.config().canvas_width, 64);
    }
}
