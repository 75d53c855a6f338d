//! The built-in "core" native-module library: one module per native
//! operator (spec.md §3.8's operator list), each with a compile-time
//! implementation so the optimizer can constant-fold them (spec.md §4.9).
//! Grounded on `original_source/source/native_module/native_module_core.cpp`.

use super::value::{AccessMode, NativeValue};
use super::{ArgumentDirection, CompileTimeContext, NativeArgument, NativeModule, NativeModuleUid, NativeOperator, Registry};
use crate::diagnostics::DiagnosticCode;
use crate::types::{DataType, Mutability, Primitive, QualifiedType};

pub const LIBRARY_ID: u32 = 0;

fn arg(name: &str, direction: ArgumentDirection, data_type: QualifiedType, access_mode: AccessMode) -> NativeArgument {
    NativeArgument { name: name.to_string(), direction, data_type, access_mode }
}

fn real(mutability: Mutability) -> QualifiedType {
    QualifiedType::new(DataType::scalar(Primitive::Real), mutability)
}

fn boolean(mutability: Mutability) -> QualifiedType {
    QualifiedType::new(DataType::scalar(Primitive::Bool), mutability)
}

fn binary_real_module(module_id: u32, name: &str, implementation: super::CompileTimeImplementation) -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, module_id),
        name: name.to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg("a", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("b", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, real(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(2),
        compile_time_implementation: Some(implementation),
    }
}

fn comparison_module(module_id: u32, name: &str, implementation: super::CompileTimeImplementation) -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, module_id),
        name: name.to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg("a", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("b", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, boolean(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(2),
        compile_time_implementation: Some(implementation),
    }
}

fn logical_module(module_id: u32, name: &str, implementation: super::CompileTimeImplementation) -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, module_id),
        name: name.to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg("a", ArgumentDirection::In, boolean(Mutability::Variable), AccessMode::Value),
            arg("b", ArgumentDirection::In, boolean(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, boolean(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(2),
        compile_time_implementation: Some(implementation),
    }
}

fn unary_real_module(module_id: u32, name: &str, implementation: super::CompileTimeImplementation) -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, module_id),
        name: name.to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg("a", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, real(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(1),
        compile_time_implementation: Some(implementation),
    }
}

fn unary_bool_module(module_id: u32, name: &str, implementation: super::CompileTimeImplementation) -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, module_id),
        name: name.to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg("a", ArgumentDirection::In, boolean(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, boolean(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(1),
        compile_time_implementation: Some(implementation),
    }
}

fn impl_add(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) + args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::RealRef(result);
}

fn impl_sub(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) - args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::RealRef(result);
}

fn impl_mul(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) * args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::RealRef(result);
}

fn impl_div(ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let a = args[0].as_real().unwrap_or(0.0);
    let b = args[1].as_real().unwrap_or(0.0);
    if b == 0.0 {
        ctx.sink.error(DiagnosticCode::NativeModuleError, "division by zero in constant-folded expression", None);
        args[2] = NativeValue::RealRef(0.0);
        return;
    }
    args[2] = NativeValue::RealRef(a / b);
}

fn impl_mod(ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let a = args[0].as_real().unwrap_or(0.0);
    let b = args[1].as_real().unwrap_or(0.0);
    if b == 0.0 {
        ctx.sink.error(DiagnosticCode::NativeModuleError, "modulo by zero in constant-folded expression", None);
        args[2] = NativeValue::RealRef(0.0);
        return;
    }
    args[2] = NativeValue::RealRef(a % b);
}

fn impl_neg(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = -args[0].as_real().unwrap_or(0.0);
    args[1] = NativeValue::RealRef(result);
}

fn impl_not(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = !args[0].as_bool().unwrap_or(false);
    args[1] = NativeValue::BoolRef(result);
}

fn impl_eq(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) == args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_neq(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) != args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_lt(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) < args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_gt(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) > args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_le(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) <= args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_ge(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0) >= args[1].as_real().unwrap_or(0.0);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_and(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_bool().unwrap_or(false) && args[1].as_bool().unwrap_or(false);
    args[2] = NativeValue::BoolRef(result);
}

fn impl_or(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_bool().unwrap_or(false) || args[1].as_bool().unwrap_or(false);
    args[2] = NativeValue::BoolRef(result);
}

/// `noop(a) -> a`: the optimizer splices every call to this module out of
/// the graph directly (spec.md §4.9) rather than ever invoking this, but a
/// compile-time implementation is still provided for completeness and for
/// any other evaluator that might call it directly.
fn impl_noop(_ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let result = args[0].as_real().unwrap_or(0.0);
    args[1] = NativeValue::RealRef(result);
}

fn subscript_module() -> NativeModule {
    NativeModule {
        uid: NativeModuleUid::new(LIBRARY_ID, 16),
        name: "subscript".to_string(),
        library_id: LIBRARY_ID,
        arguments: vec![
            arg(
                "array",
                ArgumentDirection::In,
                QualifiedType::new(DataType::array(Primitive::Real), Mutability::Variable),
                AccessMode::Value,
            ),
            arg("index", ArgumentDirection::In, real(Mutability::Variable), AccessMode::Value),
            arg("result", ArgumentDirection::Out, real(Mutability::Variable), AccessMode::Reference),
        ],
        return_argument: Some(2),
        compile_time_implementation: Some(impl_subscript),
    }
}

fn impl_subscript(ctx: &mut CompileTimeContext, args: &mut [NativeValue]) {
    let array = match &args[0] {
        NativeValue::RealValueArray(v) | NativeValue::RealRefArray(v) => v.clone(),
        _ => Vec::new(),
    };
    let index = args[1].as_real().unwrap_or(0.0) as usize;
    match array.get(index) {
        Some(&value) => args[2] = NativeValue::RealRef(value),
        None => {
            ctx.sink.error(DiagnosticCode::ArrayOutOfBounds, format!("array index {} out of bounds", index), None);
            args[2] = NativeValue::RealRef(0.0);
        }
    }
}

/// Registers every operator module and binds it to its [`NativeOperator`].
/// Must run while the registry is in the `registering` state.
pub fn register(registry: &mut Registry) -> Result<(), DiagnosticCode> {
    let bindings: Vec<(NativeModule, NativeOperator)> = vec![
        (unary_real_module(0, "noop", impl_noop), NativeOperator::Noop),
        (unary_real_module(1, "neg", impl_neg), NativeOperator::Neg),
        (binary_real_module(2, "add", impl_add), NativeOperator::Add),
        (binary_real_module(3, "sub", impl_sub), NativeOperator::Sub),
        (binary_real_module(4, "mul", impl_mul), NativeOperator::Mul),
        (binary_real_module(5, "div", impl_div), NativeOperator::Div),
        (binary_real_module(6, "mod", impl_mod), NativeOperator::Mod),
        (unary_bool_module(7, "not", impl_not), NativeOperator::Not),
        (comparison_module(8, "eq", impl_eq), NativeOperator::Eq),
        (comparison_module(9, "neq", impl_neq), NativeOperator::Neq),
        (comparison_module(10, "lt", impl_lt), NativeOperator::Lt),
        (comparison_module(11, "gt", impl_gt), NativeOperator::Gt),
        (comparison_module(12, "le", impl_le), NativeOperator::Le),
        (comparison_module(13, "ge", impl_ge), NativeOperator::Ge),
        (logical_module(14, "and", impl_and), NativeOperator::And),
        (logical_module(15, "or", impl_or), NativeOperator::Or),
        (subscript_module(), NativeOperator::Subscript),
    ];
    for (module, operator) in bindings {
        let uid = module.uid;
        registry.register_module(module)?;
        registry.register_operator(operator, uid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::globals::InstrumentGlobals;

    fn fresh_registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        register(&mut registry).expect("core library registers cleanly");
        registry.finalize().expect("every operator slot is bound");
        registry
    }

    #[test]
    fn core_library_finalizes() {
        let registry = fresh_registry();
        assert!(registry.iter_all().count() >= NativeOperator::ALL.len());
    }

    #[test]
    fn add_folds_at_compile_time() {
        let registry = fresh_registry();
        let module = registry.operator_module(NativeOperator::Add).unwrap();
        let implementation = module.compile_time_implementation.unwrap();
        let mut sink = DiagnosticSink::new();
        let globals = InstrumentGlobals::default();
        let mut ctx = CompileTimeContext { sink: &mut sink, globals: &globals };
        let mut args = vec![NativeValue::RealValue(2.0), NativeValue::RealValue(3.0), NativeValue::RealRef(0.0)];
        implementation(&mut ctx, &mut args);
        assert_eq!(args[2].as_real(), Some(5.0));
    }

    #[test]
    fn div_by_zero_reports_and_does_not_panic() {
        let registry = fresh_registry();
        let module = registry.operator_module(NativeOperator::Div).unwrap();
        let implementation = module.compile_time_implementation.unwrap();
        let mut sink = DiagnosticSink::new();
        let globals = InstrumentGlobals::default();
        let mut ctx = CompileTimeContext { sink: &mut sink, globals: &globals };
        let mut args = vec![NativeValue::RealValue(1.0), NativeValue::RealValue(0.0), NativeValue::RealRef(0.0)];
        implementation(&mut ctx, &mut args);
        assert!(!sink.is_ok());
    }
}
