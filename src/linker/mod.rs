//! Two-level import bindings.
//!
//! The [`Linker`] collects host values under `namespace.name` keys and
//! resolves them against a module's declared imports during
//! instantiation.

use std::collections::HashMap;

use crate::func::Caller;
use crate::interpreter::Trap;
use crate::types::{ExternType, FuncType, MemoryType};
use crate::{Engine, Error, Func, Instance, Memory, Module, Val};

/// A host value that can satisfy an import.
#[derive(Debug, Clone)]
pub enum Extern {
    Func(Func),
    Memory(Memory),
    /// Value of an immutable global.
    Global(Val),
}

impl Extern {
    fn kind(&self) -> &'static str {
        match self {
            Extern::Func(_) => "func",
            Extern::Memory(_) => "memory",
            Extern::Global(_) => "global",
        }
    }
}

impl From<Func> for Extern {
    fn from(func: Func) -> Self {
        Extern::Func(func)
    }
}

impl From<Memory> for Extern {
    fn from(memory: Memory) -> Self {
        Extern::Memory(memory)
    }
}

impl From<Val> for Extern {
    fn from(val: Val) -> Self {
        Extern::Global(val)
    }
}

/// Import bindings resolved for one module, in index order.
pub(crate) struct Imports {
    pub(crate) funcs: Vec<Func>,
    pub(crate) memory: Option<Memory>,
    pub(crate) globals: Vec<Val>,
}

/// A named import registry that resolves module imports during
/// instantiation.
///
/// # Examples
///
/// ```ignore
/// let mut linker = Linker::new();
/// linker.define("js", "mem", memory.clone());
/// let instance = linker.instantiate(&engine, &module)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Linker {
    namespaces: HashMap<String, HashMap<String, Extern>>,
}

impl Linker {
    /// Create an empty linker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `module`.`name` to a host value, replacing any earlier binding.
    pub fn define(&mut self, module: &str, name: &str, item: impl Into<Extern>) -> &mut Self {
        self.namespaces
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), item.into());
        self
    }

    /// Bind a host closure with the given signature.
    pub fn func_new(
        &mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        host: impl Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + 'static,
    ) -> &mut Self {
        self.define(module, name, Func::new(ty, host))
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&Extern> {
        self.namespaces.get(module)?.get(name)
    }

    /// Check whether an import name is already registered.
    pub fn has(&self, module: &str, name: &str) -> bool {
        self.get(module, name).is_some()
    }

    /// Resolve `module`'s imports and instantiate it.
    ///
    /// Fails with [`Error::Link`] if an import is missing or its binding
    /// has the wrong kind or type, and with [`Error::Instantiation`] if a
    /// data segment or the start function traps.
    pub fn instantiate(&self, engine: &Engine, module: &Module) -> Result<Instance, Error> {
        let imports = self.resolve(module)?;
        Instance::new(engine, module, imports)
    }

    fn resolve(&self, module: &Module) -> Result<Imports, Error> {
        let mut imports = Imports {
            funcs: Vec::new(),
            memory: None,
            globals: Vec::new(),
        };

        for import in module.imports() {
            let (ns, name) = (import.module(), import.name());
            let Some(item) = self.get(ns, name) else {
                return Err(Error::missing_import(ns, name));
            };
            let mismatch =
                |detail: String| Error::Link(format!("import `{ns}`.`{name}`: {detail}"));

            match (import.ty(), item) {
                (ExternType::Func(expected), Extern::Func(func)) => {
                    if func.ty() != expected {
                        return Err(mismatch(format!(
                            "expected func {expected}, found func {}",
                            func.ty()
                        )));
                    }
                    imports.funcs.push(func.clone());
                }
                (ExternType::Memory(expected), Extern::Memory(memory)) => {
                    let actual = memory.ty();
                    if !memory_fits(expected, &actual) {
                        return Err(mismatch(format!(
                            "incompatible limits: expected {expected}, found {actual}"
                        )));
                    }
                    imports.memory = Some(memory.clone());
                }
                (ExternType::Global(expected), Extern::Global(val)) => {
                    if expected.mutable {
                        return Err(mismatch("mutable global imports are not supported".into()));
                    }
                    if val.ty() != expected.content {
                        return Err(mismatch(format!(
                            "expected global {}, found global {}",
                            expected.content,
                            val.ty()
                        )));
                    }
                    imports.globals.push(*val);
                }
                (expected, item) => {
                    return Err(mismatch(format!(
                        "expected {}, found {}",
                        expected.kind(),
                        item.kind()
                    )));
                }
            }
            tracing::debug!(module = ns, name, kind = item.kind(), "resolved import");
        }

        Ok(imports)
    }
}

/// A provided memory satisfies a declared one if it is at least as large
/// and its maximum is no looser.
fn memory_fits(expected: &MemoryType, actual: &MemoryType) -> bool {
    if actual.initial < expected.initial {
        return false;
    }
    match (expected.maximum, actual.maximum) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(actual)) => actual <= expected,
    }
}
