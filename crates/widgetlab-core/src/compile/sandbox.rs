//! Controlled evaluation of transformed widget code inside `boa_engine`.
//!
//! Each compile gets a fresh [`Context`]. The React runtime is built inside an IIFE and
//! passed to the module as a parameter; nothing is installed on the global object.

use boa_engine::native_function::NativeFunction;
use boa_engine::object::JsObject;
use boa_engine::{js_string, Context, JsError, JsNativeError, JsResult, JsString, JsValue, Source};
use tracing::debug;

use super::error::{
    CompileErrorKind, WidgetCompileError, INVALID_DEFAULT_EXPORT_MESSAGE,
    MISSING_DEFAULT_EXPORT_MESSAGE,
};
use super::modules::ModuleMap;
use crate::digest::SourceDigest;
use crate::markup::{self, HostNode};
use crate::policy::{self, DATA_SPECIFIER};
use crate::render::RenderFault;

const RUNTIME_JS: &str = include_str!("runtime.js");

const LOOP_ITERATION_LIMIT: u64 = 5_000_000;
const RECURSION_LIMIT: usize = 512;

const SERIALIZE_JS: &str =
    "(function (value) { return JSON.stringify(value === undefined ? null : value); })";
const PARSE_JS: &str = "(function (text) { return JSON.parse(text); })";

fn new_context() -> Context {
    let mut ctx = Context::default();
    let limits = ctx.runtime_limits_mut();
    limits.set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    limits.set_recursion_limit(RECURSION_LIMIT);
    ctx
}

/// Best-effort human text for a thrown value.
fn error_message(err: JsError, ctx: &mut Context) -> String {
    match err.try_native(ctx) {
        Ok(native) => native.message().to_string(),
        Err(_) => err.to_string(),
    }
}

fn eval_function(ctx: &mut Context, code: &str) -> JsResult<JsObject> {
    let value = ctx.eval(Source::from_bytes(code))?;
    value
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("expected a function").into())
}

fn js_text(text: &str) -> JsValue {
    JsValue::from(JsString::from(text))
}

fn build_runtime(ctx: &mut Context) -> JsResult<JsObject> {
    let value = ctx.eval(Source::from_bytes(RUNTIME_JS))?;
    value
        .as_object()
        .cloned()
        .ok_or_else(|| {
            JsNativeError::typ()
                .with_message("runtime did not produce an object")
                .into()
        })
}

/// The sandboxed `require`. `host` carries the data value, the module registry and the
/// last rejected specifier.
fn require(
    _this: &JsValue,
    args: &[JsValue],
    host: &JsObject,
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let specifier = args
        .first()
        .cloned()
        .unwrap_or_default()
        .to_string(ctx)?
        .to_std_string_escaped();

    if let Some(reason) = policy::validate_import_specifier(&specifier) {
        host.set(js_string!("rejected"), js_text(&reason), false, ctx)?;
        return Err(JsNativeError::error().with_message(reason.as_str()).into());
    }

    if specifier == DATA_SPECIFIER {
        return host.get(js_string!("data"), ctx);
    }

    let modules = host.get(js_string!("modules"), ctx)?;
    let module = match modules.as_object() {
        Some(modules) => modules.get(JsString::from(specifier.as_str()), ctx)?,
        None => JsValue::undefined(),
    };
    if module.is_undefined() {
        let message = format!("Module \"{specifier}\" is not available in the widget sandbox.");
        return Err(JsNativeError::error().with_message(message.as_str()).into());
    }
    Ok(module)
}

fn load_modules(ctx: &mut Context, runtime: &JsObject, modules: &ModuleMap) -> JsResult<JsObject> {
    let registry = JsObject::with_object_proto(ctx.intrinsics());
    for (specifier, expression) in modules.iter() {
        let factory = eval_function(
            ctx,
            &format!("(function (runtime) {{ return {expression}; }})"),
        )?;
        let module = factory.call(&JsValue::undefined(), &[runtime.clone().into()], ctx)?;
        registry.set(JsString::from(specifier), module, false, ctx)?;
    }
    Ok(registry)
}

fn wrap_module(code: &str) -> String {
    format!("(function (module, exports, require, React) {{\n{code}\nreturn module.exports;\n}})")
}

/// Evaluate CommonJS `code` with `data` available as `./data.json`.
///
/// `data` is the raw JSON text; the caller has already validated it.
pub(crate) fn evaluate_module(
    code: &str,
    data_json: &str,
    modules: &ModuleMap,
    digest: SourceDigest,
) -> Result<CompiledWidget, WidgetCompileError> {
    let mut ctx = new_context();
    let setup = |ctx: &mut Context| -> JsResult<(JsObject, JsObject, JsObject)> {
        let runtime = build_runtime(ctx)?;
        let parse = eval_function(ctx, PARSE_JS)?;
        let data = parse.call(&JsValue::undefined(), &[js_text(data_json)], ctx)?;
        let registry = load_modules(ctx, &runtime, modules)?;
        let host = JsObject::with_object_proto(ctx.intrinsics());
        host.set(js_string!("data"), data, false, ctx)?;
        host.set(js_string!("modules"), registry, false, ctx)?;
        let serialize = eval_function(ctx, SERIALIZE_JS)?;
        Ok((runtime, host, serialize))
    };
    let (runtime, host, serialize) = setup(&mut ctx).map_err(|err| {
        let message = error_message(err, &mut ctx);
        WidgetCompileError::new(
            CompileErrorKind::Evaluation,
            format!("Widget runtime failed to initialise: {message}"),
        )
    })?;

    let outcome = run_module(&mut ctx, code, &runtime, &host);
    let rejected = host
        .get(js_string!("rejected"), &mut ctx)
        .ok()
        .and_then(|value| value.as_string().map(JsString::to_std_string_escaped));
    if let Some(reason) = rejected {
        return Err(WidgetCompileError::new(CompileErrorKind::Policy, reason));
    }

    let exports = outcome.map_err(|err| {
        let message = error_message(err, &mut ctx);
        WidgetCompileError::new(CompileErrorKind::Evaluation, message)
    })?;

    let component = match exports.as_object() {
        Some(exports) => exports.get(js_string!("default"), &mut ctx).map_err(|err| {
            let message = error_message(err, &mut ctx);
            WidgetCompileError::new(CompileErrorKind::Evaluation, message)
        })?,
        None => JsValue::undefined(),
    };

    if !component.to_boolean() {
        return Err(WidgetCompileError::new(
            CompileErrorKind::Export,
            MISSING_DEFAULT_EXPORT_MESSAGE,
        ));
    }
    if !component.is_object() {
        return Err(WidgetCompileError::new(
            CompileErrorKind::Export,
            INVALID_DEFAULT_EXPORT_MESSAGE,
        ));
    }

    debug!(digest = %digest.short(), "widget module evaluated");
    Ok(CompiledWidget {
        component,
        runtime,
        serialize,
        digest,
        context: ctx,
    })
}

fn run_module(
    ctx: &mut Context,
    code: &str,
    runtime: &JsObject,
    host: &JsObject,
) -> JsResult<JsValue> {
    let require_fn = NativeFunction::from_copy_closure_with_captures(require, host.clone())
        .to_js_function(ctx.realm());
    let module = JsObject::with_object_proto(ctx.intrinsics());
    let exports = JsObject::with_object_proto(ctx.intrinsics());
    module.set(js_string!("exports"), exports.clone(), false, ctx)?;
    let react = runtime.get(js_string!("React"), ctx)?;

    let evaluator = eval_function(ctx, &wrap_module(code))?;
    evaluator.call(
        &JsValue::undefined(),
        &[module.into(), exports.into(), require_fn.into(), react],
        ctx,
    )
}

/// Library export names known to the runtime, for the catalog.
pub(crate) fn library_export_names(library: &str) -> Result<Vec<String>, WidgetCompileError> {
    let mut ctx = new_context();
    let names = (|| -> JsResult<String> {
        let runtime = build_runtime(&mut ctx)?;
        let list = runtime.get(js_string!("libraryNames"), &mut ctx)?;
        let list = list
            .as_callable()
            .cloned()
            .ok_or_else(|| JsNativeError::typ().with_message("libraryNames is not callable"))?;
        let names = list.call(&runtime.clone().into(), &[js_text(library)], &mut ctx)?;
        let serialize = eval_function(&mut ctx, SERIALIZE_JS)?;
        let text = serialize.call(&JsValue::undefined(), &[names], &mut ctx)?;
        Ok(text.to_string(&mut ctx)?.to_std_string_escaped())
    })()
    .map_err(|err| {
        WidgetCompileError::new(CompileErrorKind::Evaluation, error_message(err, &mut ctx))
    })?;
    serde_json::from_str(&names)
        .map_err(|err| WidgetCompileError::new(CompileErrorKind::Evaluation, err.to_string()))
}

/// An evaluated widget module.
///
/// Owns its JavaScript engine context, so it is neither `Send` nor `Sync`; build it on
/// the thread that renders it.
pub struct CompiledWidget {
    component: JsValue,
    runtime: JsObject,
    serialize: JsObject,
    digest: SourceDigest,
    // Dropped last; the values above belong to this context.
    context: Context,
}

impl std::fmt::Debug for CompiledWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledWidget")
            .field("digest", &self.digest)
            .field("callable", &self.is_callable())
            .finish_non_exhaustive()
    }
}

impl CompiledWidget {
    /// Digest of the source this widget was compiled from.
    pub fn digest(&self) -> SourceDigest {
        self.digest
    }

    /// Whether the default export is a function component.
    pub fn is_callable(&self) -> bool {
        self.component.is_callable()
    }

    fn serialize(&mut self, value: JsValue) -> JsResult<String> {
        let text = self
            .serialize
            .call(&JsValue::undefined(), &[value], &mut self.context)?;
        Ok(text.to_string(&mut self.context)?.to_std_string_escaped())
    }

    fn fault(&mut self, err: JsError) -> RenderFault {
        RenderFault::new(error_message(err, &mut self.context))
    }

    /// Call the component with empty props and return its result as JSON.
    ///
    /// React elements come back as plain objects; functions inside them are dropped.
    pub fn invoke(&mut self) -> Result<serde_json::Value, RenderFault> {
        let component = match self.component.as_callable() {
            Some(component) => component.clone(),
            None => return Err(RenderFault::new("Default export is not callable.")),
        };
        let props = JsObject::with_object_proto(self.context.intrinsics());
        let result = component
            .call(&JsValue::undefined(), &[props.into()], &mut self.context)
            .map_err(|err| self.fault(err))?;
        let text = self.serialize(result).map_err(|err| self.fault(err))?;
        serde_json::from_str(&text).map_err(|err| RenderFault::new(err.to_string()))
    }

    /// Expand the component into host nodes.
    pub fn render_nodes(&mut self) -> Result<Vec<HostNode>, RenderFault> {
        let render = self
            .runtime
            .get(js_string!("render"), &mut self.context)
            .map_err(|err| self.fault(err))?;
        let render = render
            .as_callable()
            .cloned()
            .ok_or_else(|| RenderFault::new("runtime render is not callable"))?;
        let tree = render
            .call(
                &self.runtime.clone().into(),
                &[self.component.clone()],
                &mut self.context,
            )
            .map_err(|err| self.fault(err))?;
        let text = self.serialize(tree).map_err(|err| self.fault(err))?;
        serde_json::from_str(&text).map_err(|err| RenderFault::new(err.to_string()))
    }

    /// Render the widget to static HTML.
    pub fn render_markup(&mut self) -> Result<String, RenderFault> {
        let nodes = self.render_nodes()?;
        Ok(markup::render_html(&nodes))
    }
}
