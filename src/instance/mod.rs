use std::fmt;

use crate::interpreter::{Context, Executor, Limits, Trap};
use crate::linker::Imports;
use crate::module::ExportType;
use crate::parse::ExternKind;
use crate::types::{FuncType, TypeList};
use crate::value::{WasmArgs, WasmResults};
use crate::{Engine, Error, Func, Memory, Module, Val};

/// An instantiated WASM module.
///
/// Owns its globals and (unless imported) its memory. Dropping the
/// instance releases them; there is no explicit teardown.
pub struct Instance {
    module: Module,
    /// Imported functions, indexed by function index.
    host_funcs: Vec<Func>,
    memory: Option<Memory>,
    globals: Vec<Val>,
    limits: Limits,
}

impl Instance {
    /// Initialise globals and memory, copy data segments, then run the
    /// start function.
    pub(crate) fn new(engine: &Engine, module: &Module, imports: Imports) -> Result<Self, Error> {
        let parsed = module.parsed();

        let memory = if parsed.memory_imported {
            imports.memory
        } else {
            parsed.memory.map(Memory::new)
        };

        let mut globals = imports.globals;
        for def in &parsed.globals {
            let val = def.init.eval(&globals).ok_or_else(|| {
                Error::Compile("global initializer refers to an unknown global".into())
            })?;
            globals.push(val);
        }

        for segment in &parsed.data {
            let Some(Val::I32(offset)) = segment.offset.eval(&globals) else {
                return Err(Error::Compile("data segment offset is not an i32".into()));
            };
            let memory = memory
                .as_ref()
                .ok_or(Error::Instantiation(Trap::MemoryOutOfBounds))?;
            memory
                .write(offset as u32 as usize, &segment.bytes)
                .map_err(Error::Instantiation)?;
        }

        let mut instance = Self {
            module: module.clone(),
            host_funcs: imports.funcs,
            memory,
            globals,
            limits: engine.limits(),
        };

        if let Some(start) = parsed.start {
            tracing::debug!(func = start, "running start function");
            instance.run(start, &[]).map_err(Error::Instantiation)?;
        }
        Ok(instance)
    }

    fn run(&mut self, func_idx: u32, args: &[Val]) -> Result<Vec<Val>, Trap> {
        let Instance {
            module,
            host_funcs,
            memory,
            globals,
            limits,
        } = self;
        let ctx = Context {
            module: module.parsed(),
            host_funcs,
            memory: memory.as_ref(),
            globals,
        };
        Executor::new(ctx, *limits).invoke(func_idx, args)
    }

    /// Call an exported function by name (typed API).
    pub fn call<A: WasmArgs, R: WasmResults>(&mut self, name: &str, args: A) -> Result<R, Error> {
        let vals = self.call_dynamic(name, &args.to_vals())?;
        R::from_vals(&vals)
    }

    /// Call an exported function by name (dynamic API).
    pub fn call_dynamic(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, Error> {
        let func_idx = self.resolve_export_func_idx(name)?;
        let ty = self
            .module
            .parsed()
            .func_type(func_idx)
            .ok_or_else(|| Error::export_not_found(name))?;
        check_args(name, ty, args)?;

        tracing::trace!(export = name, args = args.len(), "invoking export");
        self.run(func_idx, args).map_err(Error::Trap)
    }

    /// Signature of an exported function.
    pub fn get_func_type(&self, name: &str) -> Option<&FuncType> {
        let idx = self.resolve_export(name, ExternKind::Func)?;
        self.module.parsed().func_type(idx)
    }

    /// The memory exported under `name`.
    pub fn get_memory(&self, name: &str) -> Option<Memory> {
        self.resolve_export(name, ExternKind::Memory)?;
        self.memory.clone()
    }

    /// The instance's linear memory, whether imported or defined.
    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    /// Current value of an exported global.
    pub fn get_global(&self, name: &str) -> Option<Val> {
        let idx = self.resolve_export(name, ExternKind::Global)?;
        self.globals.get(idx as usize).copied()
    }

    pub fn exports(&self) -> impl Iterator<Item = ExportType<'_>> {
        self.module.exports()
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    fn resolve_export(&self, name: &str, kind: ExternKind) -> Option<u32> {
        self.module
            .parsed()
            .exports
            .iter()
            .find(|export| export.name == name && export.kind == kind)
            .map(|export| export.index)
    }

    pub(crate) fn resolve_export_func_idx(&self, name: &str) -> Result<u32, Error> {
        self.resolve_export(name, ExternKind::Func)
            .ok_or_else(|| Error::export_not_found(name))
    }
}

fn check_args(name: &str, ty: &FuncType, args: &[Val]) -> Result<(), Error> {
    let matches = args.len() == ty.params().len()
        && args
            .iter()
            .zip(ty.params())
            .all(|(arg, param)| arg.ty() == *param);
    if !matches {
        let got: Vec<_> = args.iter().map(Val::ty).collect();
        return Err(Error::TypeMismatch(format!(
            "export `{name}` expects {}, got {}",
            TypeList(ty.params()),
            TypeList(&got)
        )));
    }
    Ok(())
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exports: Vec<_> = self.exports().map(|export| export.name()).collect();
        f.debug_struct("Instance")
            .field("exports", &exports)
            .field("memory", &self.memory)
            .finish()
    }
}
