//! Functions hook scripts can call

use super::ScriptContext;
use crate::types::HookPhase;
use starlark::environment::GlobalsBuilder;
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::values::Value;
use starlark::values::none::NoneType;

fn context<'a>(eval: &Evaluator<'_, 'a, '_>) -> anyhow::Result<&'a ScriptContext> {
    eval.extra
        .and_then(|extra| extra.downcast_ref::<ScriptContext>())
        .ok_or_else(|| anyhow::anyhow!("hook functions are not available in this context"))
}

fn register<'v>(
    phase: HookPhase,
    transaction_name: Option<&str>,
    hook: Value<'v>,
    eval: &mut Evaluator<'v, '_, '_>,
) -> anyhow::Result<NoneType> {
    if hook.get_type() != "function" {
        anyhow::bail!(
            "{}() expects a function, got a value of type '{}'",
            phase,
            hook.get_type()
        );
    }
    let context = context(eval)?;
    let slot = context.reserve_slot(phase, transaction_name)?;
    eval.module().set(&slot, hook);
    Ok(NoneType)
}

/// Registration DSL, available to every hook script
#[starlark_module]
pub(crate) fn registration_builtins(builder: &mut GlobalsBuilder) {
    fn before_all<'v>(hook: Value<'v>, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        register(HookPhase::BeforeAll, None, hook, eval)
    }

    fn after_all<'v>(hook: Value<'v>, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        register(HookPhase::AfterAll, None, hook, eval)
    }

    fn before_each<'v>(hook: Value<'v>, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        register(HookPhase::BeforeEach, None, hook, eval)
    }

    fn before_each_validation<'v>(
        hook: Value<'v>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<NoneType> {
        register(HookPhase::BeforeEachValidation, None, hook, eval)
    }

    fn after_each<'v>(hook: Value<'v>, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        register(HookPhase::AfterEach, None, hook, eval)
    }

    fn before<'v>(
        name: &str,
        hook: Value<'v>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<NoneType> {
        register(HookPhase::Before, Some(name), hook, eval)
    }

    fn before_validation<'v>(
        name: &str,
        hook: Value<'v>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<NoneType> {
        register(HookPhase::BeforeValidation, Some(name), hook, eval)
    }

    fn after<'v>(
        name: &str,
        hook: Value<'v>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<NoneType> {
        register(HookPhase::After, Some(name), hook, eval)
    }

    /// Append a message to the run's hook log.
    fn log<'v>(message: Value<'v>, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        context(eval)?.logs.push(message.to_str());
        Ok(NoneType)
    }
}

/// Host access, only bound for trusted hook scripts
#[starlark_module]
pub(crate) fn host_builtins(builder: &mut GlobalsBuilder) {
    fn read_file<'v>(path: &str, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<String> {
        let host = context(eval)?
            .host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("read_file() is not available in the sandbox"))?;
        host.read_file(path)
            .map_err(|err| anyhow::anyhow!("cannot read '{path}': {err}"))
    }

    fn getenv<'v>(
        name: &str,
        default: Option<&str>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<Value<'v>> {
        let host = context(eval)?
            .host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("getenv() is not available in the sandbox"))?;
        Ok(match host.env_var(name).as_deref().or(default) {
            Some(value) => eval.heap().alloc(value),
            None => Value::new_none(),
        })
    }
}
