//! Native modules: the primitives and operators WaveLang programs are built
//! from. Grounded on `original_source/source/native_module/native_module.h`
//! (the UID split, formal-argument table, compile-time implementation
//! pointer) and `native_module_registry.cpp` (the registration lifecycle).

pub mod library_core;
pub mod value;

use crate::diagnostics::DiagnosticCode;
use crate::globals::InstrumentGlobals;
use crate::types::QualifiedType;
use std::collections::HashMap;
use value::{AccessMode, NativeValue};

/// `library_id << 32 | module_id` (spec.md §3.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeModuleUid(pub u64);

impl NativeModuleUid {
    pub fn new(library_id: u32, module_id: u32) -> Self {
        NativeModuleUid(((library_id as u64) << 32) | module_id as u64)
    }

    pub fn library_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn module_id(self) -> u32 {
        self.0 as u32
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgumentDirection {
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct NativeArgument {
    pub name: String,
    pub direction: ArgumentDirection,
    pub data_type: QualifiedType,
    pub access_mode: AccessMode,
}

/// The closed set of operators the language's infix/prefix syntax binds to
/// by name, independent of which library provides their implementation
/// (spec.md §3.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NativeOperator {
    Noop,
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Subscript,
}

impl NativeOperator {
    pub const ALL: &'static [NativeOperator] = &[
        NativeOperator::Noop,
        NativeOperator::Neg,
        NativeOperator::Add,
        NativeOperator::Sub,
        NativeOperator::Mul,
        NativeOperator::Div,
        NativeOperator::Mod,
        NativeOperator::Not,
        NativeOperator::Eq,
        NativeOperator::Neq,
        NativeOperator::Lt,
        NativeOperator::Gt,
        NativeOperator::Le,
        NativeOperator::Ge,
        NativeOperator::And,
        NativeOperator::Or,
        NativeOperator::Subscript,
    ];
}

/// A compile-time native-module implementation's view of the world: its
/// diagnostic sink and the instrument globals in effect for the variant
/// currently being folded (spec.md §6.3).
pub struct CompileTimeContext<'a> {
    pub sink: &'a mut crate::diagnostics::DiagnosticSink,
    pub globals: &'a InstrumentGlobals,
}

/// Writes out-argument values into `arguments` in place, given already
/// the resolved in-argument values. Return type is always void; failures
/// go through `ctx.sink`.
pub type CompileTimeImplementation = fn(&mut CompileTimeContext, &mut [NativeValue]);

pub struct NativeModule {
    pub uid: NativeModuleUid,
    pub name: String,
    pub library_id: u32,
    pub arguments: Vec<NativeArgument>,
    /// Index of the out-argument treated as this module's "return value"
    /// for overload-key purposes (spec.md §4.7), if any.
    pub return_argument: Option<usize>,
    pub compile_time_implementation: Option<CompileTimeImplementation>,
}

impl NativeModule {
    pub fn overload_key(&self) -> Vec<QualifiedType> {
        self.arguments
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.return_argument)
            .map(|(_, a)| a.data_type)
            .collect()
    }

    pub fn in_arguments(&self) -> impl Iterator<Item = &NativeArgument> {
        self.arguments.iter().filter(|a| a.direction == ArgumentDirection::In)
    }

    pub fn out_arguments(&self) -> impl Iterator<Item = &NativeArgument> {
        self.arguments.iter().filter(|a| a.direction == ArgumentDirection::Out)
    }
}

/// One linear serialization token of an optimization-rule pattern
/// (spec.md §4.9's "Optimization rules"). Rules live on the registry so
/// native-module libraries can register their own algebraic identities
/// alongside the operators they provide.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternToken {
    ModuleCallOpen(NativeModuleUid),
    ModuleCallClose,
    VariableSlot(u8),
    ConstantSlot(u8),
    LiteralReal(f32),
    LiteralBool(bool),
}

#[derive(Debug, Clone)]
pub struct OptimizationRule {
    pub source: Vec<PatternToken>,
    pub target: Vec<PatternToken>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RegistryState {
    Uninitialized,
    Initialized,
    Registering,
    Finalized,
}

/// Owns every registered native module, the operator → UID bindings, and
/// the optimization rules contributed by libraries. Lifecycle:
/// `uninitialized → initialized → registering → finalized` (spec.md §3.8);
/// registration is rejected after finalization, queries before it.
pub struct Registry {
    state: RegistryState,
    modules: HashMap<NativeModuleUid, NativeModule>,
    by_library: HashMap<u32, Vec<NativeModuleUid>>,
    by_name: HashMap<String, Vec<NativeModuleUid>>,
    operators: HashMap<NativeOperator, NativeModuleUid>,
    optimization_rules: Vec<OptimizationRule>,
    optimizations_enabled: bool,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            state: RegistryState::Uninitialized,
            modules: HashMap::new(),
            by_library: HashMap::new(),
            by_name: HashMap::new(),
            operators: HashMap::new(),
            optimization_rules: Vec::new(),
            optimizations_enabled: false,
        }
    }

    pub fn initialize(&mut self) {
        debug_assert_eq!(self.state, RegistryState::Uninitialized);
        self.state = RegistryState::Initialized;
    }

    pub fn begin_registration(&mut self) {
        debug_assert_eq!(self.state, RegistryState::Initialized);
        self.state = RegistryState::Registering;
    }

    pub fn set_optimizations_enabled(&mut self, enabled: bool) {
        self.optimizations_enabled = enabled;
    }

    pub fn register_module(&mut self, module: NativeModule) -> Result<(), DiagnosticCode> {
        if self.state != RegistryState::Registering {
            return Err(DiagnosticCode::InvalidNativeModuleImplementation);
        }
        if self.modules.contains_key(&module.uid) {
            return Err(DiagnosticCode::DuplicateDeclaration);
        }
        let key = module.overload_key();
        if let Some(existing) = self.by_name.get(&module.name) {
            for uid in existing {
                if self.modules[uid].overload_key() == key {
                    return Err(DiagnosticCode::DeclarationConflict);
                }
            }
        }
        self.by_library.entry(module.library_id).or_default().push(module.uid);
        self.by_name.entry(module.name.clone()).or_default().push(module.uid);
        self.modules.insert(module.uid, module);
        Ok(())
    }

    pub fn register_operator(&mut self, operator: NativeOperator, uid: NativeModuleUid) -> Result<(), DiagnosticCode> {
        if self.state != RegistryState::Registering {
            return Err(DiagnosticCode::InvalidNativeModuleImplementation);
        }
        if !self.modules.contains_key(&uid) {
            return Err(DiagnosticCode::InvalidNativeModuleImplementation);
        }
        self.operators.insert(operator, uid);
        Ok(())
    }

    /// Registers an optimization rule, dropped silently if optimizations
    /// are disabled (spec.md §4.8).
    pub fn register_optimization_rule(&mut self, rule: OptimizationRule) {
        if self.optimizations_enabled {
            self.optimization_rules.push(rule);
        }
    }

    pub fn finalize(&mut self) -> Result<(), DiagnosticCode> {
        if self.state != RegistryState::Registering {
            return Err(DiagnosticCode::InvalidNativeModuleImplementation);
        }
        for operator in NativeOperator::ALL {
            if !self.operators.contains_key(operator) {
                return Err(DiagnosticCode::InvalidNativeModuleImplementation);
            }
        }
        self.state = RegistryState::Finalized;
        Ok(())
    }

    fn require_finalized(&self) {
        debug_assert_eq!(self.state, RegistryState::Finalized, "native-module registry queried before finalization");
    }

    pub fn get(&self, uid: NativeModuleUid) -> Option<&NativeModule> {
        self.require_finalized();
        self.modules.get(&uid)
    }

    pub fn iter_library(&self, library_id: u32) -> impl Iterator<Item = &NativeModule> {
        self.require_finalized();
        self.by_library.get(&library_id).into_iter().flatten().filter_map(move |uid| self.modules.get(uid))
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &NativeModule> {
        self.require_finalized();
        self.modules.values()
    }

    pub fn operator_module(&self, operator: NativeOperator) -> Option<&NativeModule> {
        self.require_finalized();
        self.operators.get(&operator).and_then(|uid| self.modules.get(uid))
    }

    pub fn is_operator(&self, uid: NativeModuleUid, operator: NativeOperator) -> bool {
        self.operators.get(&operator) == Some(&uid)
    }

    pub fn is_noop(&self, uid: NativeModuleUid) -> bool {
        self.is_operator(uid, NativeOperator::Noop)
    }

    pub fn optimization_rules(&self) -> &[OptimizationRule] {
        &self.optimization_rules
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthesizes one `Declaration::Module` (`ModuleBody::Native`) per
/// registered native module directly into `scope`, and records each one's
/// backing UID in `program.native_bindings` (spec.md §4.5's "Native-module
/// libraries are imported by synthesizing module-declaration AST nodes from
/// the registry entries"). Call once per compilation, into every file's root
/// scope that should see the library (operator modules are implicitly
/// available everywhere; other libraries only where explicitly imported).
pub fn declare_into_program(
    registry: &Registry,
    program: &mut crate::ast::source::Program,
    scope: crate::ast::source::ScopeId,
    file: crate::source::SourceHandle,
) {
    use crate::ast::source::{Argument, ArgumentDirection as AstArgumentDirection, Declaration, ModuleBody, ModuleDeclaration, Visibility};
    use crate::span::Span;

    let span = Span::synthetic(file);
    for module in registry.iter_all() {
        let arguments = module
            .arguments
            .iter()
            .map(|a| Argument {
                name: a.name.clone(),
                direction: match a.direction {
                    ArgumentDirection::In => AstArgumentDirection::In,
                    ArgumentDirection::Out => AstArgumentDirection::Out,
                },
                data_type: a.data_type,
                initializer: None,
                span,
            })
            .collect();
        let return_type = module.return_argument.map(|i| module.arguments[i].data_type);
        let library_name = match module.library_id {
            library_core::LIBRARY_ID => "core".to_string(),
            id => format!("library_{id}"),
        };
        let decl = program.add_declaration(
            scope,
            Declaration::Module(ModuleDeclaration {
                name: module.name.clone(),
                visibility: Visibility::Public,
                return_type,
                arguments,
                body: ModuleBody::Native { library_name },
                span,
            }),
        );
        program.native_bindings.insert(decl, module.uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_round_trips_library_and_module_id() {
        let uid = NativeModuleUid::new(7, 42);
        assert_eq!(uid.library_id(), 7);
        assert_eq!(uid.module_id(), 42);
    }

    #[test]
    fn finalize_fails_until_every_operator_is_bound() {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        assert!(registry.finalize().is_err());
    }

    #[test]
    fn duplicate_uid_registration_is_rejected() {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        let module = |uid| NativeModule {
            uid,
            name: "m".to_string(),
            library_id: 0,
            arguments: Vec::new(),
            return_argument: None,
            compile_time_implementation: None,
        };
        assert!(registry.register_module(module(NativeModuleUid::new(0, 0))).is_ok());
        assert!(registry.register_module(module(NativeModuleUid::new(0, 0))).is_err());
    }
}
