//! QuickJS engine
//!
//! [`ScriptEngine`] on rquickjs. One runtime and one full context per
//! execution context, with a heap limit and an interrupt handler wired to
//! the context's terminate flag.

use std::sync::atomic::Ordering;

use rquickjs::context::EvalOptions;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Exception, FromJs, Function, IntoJs, Object, Runtime, Value};

use crate::engine_trait::{EngineFactory, EngineOptions, NativeFunction, ScriptEngine};
use crate::{JsError, JsValue};

/// Nesting limit for value conversion, guards against cyclic objects
const MAX_DEPTH: usize = 64;

/// 2^53: integral floats below this convert to exact JSON integers
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Creates [`QuickJsEngine`] instances
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickJsFactory;

impl EngineFactory for QuickJsFactory {
    fn name(&self) -> &str {
        "quickjs"
    }

    fn create(&self, options: &EngineOptions) -> Result<Box<dyn ScriptEngine>, JsError> {
        Ok(Box::new(QuickJsEngine::new(options)?))
    }
}

/// QuickJS interpreter for one context
pub struct QuickJsEngine {
    name: String,
    // Dropped before the runtime
    context: Option<Context>,
    runtime: Runtime,
}

impl QuickJsEngine {
    pub fn new(options: &EngineOptions) -> Result<Self, JsError> {
        let runtime = Runtime::new().map_err(|e| JsError::EngineUnavailable(e.to_string()))?;
        runtime.set_memory_limit(options.memory_limit);

        let interrupt = options.interrupt.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.load(Ordering::Relaxed))));

        let context = Context::full(&runtime).map_err(|e| JsError::EngineUnavailable(e.to_string()))?;
        tracing::debug!(context = %options.context_name, limit = options.memory_limit, "QuickJS context created");

        Ok(Self {
            name: options.context_name.clone(),
            context: Some(context),
            runtime,
        })
    }

    fn context(&self) -> Result<&Context, JsError> {
        self.context
            .as_ref()
            .ok_or_else(|| JsError::EngineUnavailable(format!("{}: engine closed", self.name)))
    }
}

impl ScriptEngine for QuickJsEngine {
    fn name(&self) -> &str {
        "quickjs"
    }

    fn install_value(&mut self, name: &str, value: JsValue) -> Result<(), JsError> {
        self.context()?.with(|ctx| {
            let value = to_js(&ctx, &value).map_err(|e| script_error(&ctx, e, name))?;
            ctx.globals()
                .set(name, value)
                .map_err(|e| script_error(&ctx, e, name))
        })
    }

    fn install_function(&mut self, name: &str, func: NativeFunction) -> Result<(), JsError> {
        self.context()?.with(|ctx| install_native(&ctx, name, func).map_err(|e| script_error(&ctx, e, name)))
    }

    fn eval(&mut self, source: &str, origin: &str) -> Result<JsValue, JsError> {
        self.context()?.with(|ctx| {
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = false;
            let result: Value = ctx
                .eval_with_options(source, options)
                .map_err(|e| script_error(&ctx, e, origin))?;
            from_js(&result).map_err(|e| script_error(&ctx, e, origin))
        })
    }

    fn invoke(&mut self, name: &str, arg: JsValue) -> Result<JsValue, JsError> {
        self.context()?.with(|ctx| {
            let target: Value = ctx.globals().get(name).map_err(|e| script_error(&ctx, e, name))?;
            let Some(func) = target.as_function() else {
                return Err(JsError::TypeError(format!("{name} is not a function")));
            };
            let arg = to_js(&ctx, &arg).map_err(|e| script_error(&ctx, e, name))?;
            let result: Value = func.call((arg,)).map_err(|e| script_error(&ctx, e, name))?;
            from_js(&result).map_err(|e| script_error(&ctx, e, name))
        })
    }

    fn run_pending_jobs(&mut self) -> Result<(), JsError> {
        if self.context.is_none() {
            return Ok(());
        }
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(job) => {
                    let message = job.0.with(|ctx| format_exception(&ctx, ctx.catch()));
                    return Err(JsError::Runtime(format!("{}: pending job: {message}", self.name)));
                }
            }
        }
    }

    fn close(&mut self) {
        if self.context.take().is_some() {
            tracing::debug!(context = %self.name, "QuickJS context closed");
        }
    }
}

fn install_native<'js>(ctx: &Ctx<'js>, name: &str, func: NativeFunction) -> rquickjs::Result<()> {
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let values = args
                .0
                .iter()
                .map(from_js)
                .collect::<rquickjs::Result<Vec<_>>>()?;
            match func(&values) {
                Ok(result) => to_js(&ctx, &result),
                Err(JsError::TypeError(message)) => Err(Exception::throw_type(&ctx, &message)),
                Err(err) => Err(Exception::throw_message(&ctx, &err.to_string())),
            }
        },
    )?;
    ctx.globals().set(name, function)
}

/// Map an rquickjs error, pulling the pending exception when there is one
fn script_error<'js>(ctx: &Ctx<'js>, err: rquickjs::Error, origin: &str) -> JsError {
    if err.is_exception() {
        JsError::Runtime(format!("{origin}: {}", format_exception(ctx, ctx.catch())))
    } else {
        JsError::Runtime(format!("{origin}: {err}"))
    }
}

fn format_exception<'js>(ctx: &Ctx<'js>, caught: Value<'js>) -> String {
    if let Some(exception) = caught.clone().into_object().and_then(Exception::from_object) {
        match (exception.message(), exception.stack()) {
            (Some(message), Some(stack)) if !stack.is_empty() => return format!("{message}\n{stack}"),
            (Some(message), _) => return message,
            (None, Some(stack)) => return stack,
            (None, None) => {}
        }
    }
    match Coerced::<String>::from_js(ctx, caught) {
        Ok(value) => value.0,
        Err(err) => format!("(unprintable exception: {err})"),
    }
}

fn to_js<'js>(ctx: &Ctx<'js>, value: &JsValue) -> rquickjs::Result<Value<'js>> {
    match value {
        JsValue::Undefined => Ok(Value::new_undefined(ctx.clone())),
        JsValue::Null => Ok(Value::new_null(ctx.clone())),
        JsValue::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        JsValue::Number(n) => Ok(number_to_js(ctx, *n)),
        JsValue::String(s) => s.as_str().into_js(ctx),
        JsValue::Json(json) => json_to_js(ctx, json),
    }
}

fn number_to_js<'js>(ctx: &Ctx<'js>, n: f64) -> Value<'js> {
    let int = n as i32;
    if f64::from(int) == n && !(n == 0.0 && n.is_sign_negative()) {
        Value::new_int(ctx.clone(), int)
    } else {
        Value::new_float(ctx.clone(), n)
    }
}

fn from_js(value: &Value<'_>) -> rquickjs::Result<JsValue> {
    if value.is_undefined() || value.is_function() {
        return Ok(JsValue::Undefined);
    }
    if value.is_null() {
        return Ok(JsValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(JsValue::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(JsValue::Number(i as f64));
    }
    if let Some(f) = value.as_float() {
        return Ok(JsValue::Number(f));
    }
    if let Some(s) = value.as_string() {
        return Ok(JsValue::String(s.to_string()?));
    }
    Ok(JsValue::Json(js_to_json(value, 0)?))
}

fn json_to_js<'js>(ctx: &Ctx<'js>, json: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    match json {
        serde_json::Value::Null => Ok(Value::new_null(ctx.clone())),
        serde_json::Value::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        serde_json::Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Ok(Value::new_int(ctx.clone(), i)),
            None => Ok(Value::new_float(ctx.clone(), n.as_f64().unwrap_or(f64::NAN))),
        },
        serde_json::Value::String(s) => s.as_str().into_js(ctx),
        serde_json::Value::Array(items) => {
            let array = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            Ok(array.into_value())
        }
        serde_json::Value::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            Ok(object.into_value())
        }
    }
}

fn js_to_json(value: &Value<'_>, depth: usize) -> rquickjs::Result<serde_json::Value> {
    if depth > MAX_DEPTH || value.is_null() || value.is_undefined() || value.is_function() {
        return Ok(serde_json::Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(serde_json::Value::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(serde_json::json!(i));
    }
    if let Some(f) = value.as_float() {
        // Integral floats stay integers so JSON consumers see `3`, not `3.0`
        if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
            return Ok(serde_json::json!(f as i64));
        }
        return Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null));
    }
    if let Some(s) = value.as_string() {
        return Ok(serde_json::Value::String(s.to_string()?));
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for i in 0..array.len() {
            let item: Value = array.get(i)?;
            items.push(js_to_json(&item, depth + 1)?);
        }
        return Ok(serde_json::Value::Array(items));
    }
    if let Some(object) = value.as_object() {
        let mut map = serde_json::Map::new();
        for entry in object.props::<String, Value>() {
            let (key, item) = entry?;
            if item.is_function() {
                continue;
            }
            map.insert(key, js_to_json(&item, depth + 1)?);
        }
        return Ok(serde_json::Value::Object(map));
    }
    Ok(serde_json::Value::Null)
}
