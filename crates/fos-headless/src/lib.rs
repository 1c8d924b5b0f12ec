//! fOS Headless
//!
//! Render-to-image sessions: a main context with a pre-created canvas
//! element, settled after every run and exported on demand.
//!
//! Scripts see the target as the globals `canvas` and `ctx` (its 2D
//! context). Workers spawned by the script may paint their own surfaces;
//! anything reachable from the session can be exported once it settles.

use std::sync::Arc;
use std::time::Duration;

use fos_canvas::{EncodedImage, SharedSurface};
use fos_js::{ExecutionContext, JsError, RuntimeConfig, RuntimeEnv};

/// Render target and wait policy
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Export MIME type; unsupported types produce PNG
    pub format: String,
    /// id attribute of the pre-created canvas element
    pub canvas_id: String,
    /// Longest wait for timers, messages and workers to go quiet
    pub settle_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl RenderOptions {
    /// Defaults that wait as long as the runtime's own settle bound
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            width: 800,
            height: 600,
            format: "image/png".into(),
            canvas_id: "canvas".into(),
            settle_timeout: config.settle_timeout,
        }
    }
}

/// A reusable main context with a render target. State persists across
/// runs.
pub struct RenderSession {
    context: ExecutionContext,
    surface: SharedSurface,
    options: RenderOptions,
}

impl RenderSession {
    pub fn new(env: &Arc<RuntimeEnv>, options: RenderOptions) -> Result<Self, JsError> {
        let context = env.main_context()?;

        let id = options.canvas_id.clone();
        context
            .run(move |scope| -> Result<(), JsError> {
                let document = scope.document();
                let mut doc = document.lock();
                let body = doc
                    .body()
                    .ok_or_else(|| JsError::Runtime("document has no body".into()))?;
                let canvas = doc.create_element("canvas");
                doc.set_element_id(canvas, &id)?;
                doc.append_child(body, canvas)?;
                Ok(())
            })
            .wait_timeout(options.settle_timeout)??;

        let surface = context
            .canvas_by_element_id(&options.canvas_id)
            .ok_or_else(|| JsError::Runtime("render target has no surface".into()))?;
        surface.lock().resize(options.width, options.height)?;

        let globals = format!(
            "globalThis.canvas = document.getElementById({});\nglobalThis.ctx = canvas.getContext('2d');",
            serde_json::Value::from(options.canvas_id.as_str())
        );
        context.eval(&globals).wait_timeout(options.settle_timeout)??;

        tracing::debug!(
            context = %context.name(),
            width = options.width,
            height = options.height,
            "render session ready"
        );
        Ok(Self {
            context,
            surface,
            options,
        })
    }

    /// Evaluate `source`, then wait for the session to settle
    pub fn run(&self, source: &str) -> Result<(), JsError> {
        self.context
            .eval(source)
            .wait_timeout(self.options.settle_timeout)??;
        self.settle()
    }

    /// Load a script through the environment's loader, then settle
    pub fn run_file(&self, identity: &str) -> Result<(), JsError> {
        self.context
            .load_script(identity)
            .wait_timeout(self.options.settle_timeout)??;
        self.settle()
    }

    fn settle(&self) -> Result<(), JsError> {
        if self.context.settle(self.options.settle_timeout) {
            Ok(())
        } else {
            tracing::warn!(context = %self.context.name(), "session did not settle");
            Err(JsError::Timeout(self.options.settle_timeout))
        }
    }

    /// Encode the render target in the session's format
    pub fn export(&self) -> Result<EncodedImage, JsError> {
        self.export_as(&self.options.format)
    }

    pub fn export_as(&self, mime: &str) -> Result<EncodedImage, JsError> {
        Ok(self.surface.lock().to_encoded_image(mime)?)
    }

    /// The render target
    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("context", &self.context)
            .field("options", &self.options)
            .finish()
    }
}

/// One-shot render: fresh session, run `script`, export
pub fn render(env: &Arc<RuntimeEnv>, script: &str, options: RenderOptions) -> Result<EncodedImage, JsError> {
    let session = RenderSession::new(env, options)?;
    session.run(script)?;
    let image = session.export()?;
    session.context().terminate();
    Ok(image)
}
