//! Import bindings and drivers for the `add`, `mem` and `start` modules.
//!
//! Each driver validates the image, instantiates it, reports the instance
//! and its exports on the loader's console, then invokes the exports the
//! module is known for.

use std::rc::Rc;

use crate::console::Console;
use crate::loader::{ModuleImage, ModuleLoader};
use crate::types::{FuncType, MemoryType};
use crate::{Error, Instance, Linker, Memory, Trap, Val, ValType};

/// `add` needs no imports.
pub fn add_linker() -> Linker {
    Linker::new()
}

/// `js.mem`, a one page memory shared with the module, and `console.log`,
/// which prints `len` bytes at `offset` of that memory as UTF-8.
pub fn mem_linker(console: Rc<dyn Console>) -> (Linker, Memory) {
    let memory = Memory::new(MemoryType {
        initial: 1,
        maximum: None,
    });
    let shared = memory.clone();

    let mut linker = Linker::new();
    linker.define("js", "mem", memory.clone()).func_new(
        "console",
        "log",
        FuncType::new([ValType::I32, ValType::I32], []),
        move |_caller, args| {
            let [Val::I32(offset), Val::I32(len)] = args else {
                return Err(Trap::Host("console.log expects (i32, i32)".into()));
            };
            let text = shared.read_utf8(*offset as u32 as usize, *len as u32 as usize)?;
            console.log(&text);
            Ok(Vec::new())
        },
    );
    (linker, memory)
}

/// `imports.imported_func`, which prints its single `i32` argument.
pub fn start_linker(console: Rc<dyn Console>) -> Linker {
    let mut linker = Linker::new();
    linker.func_new(
        "imports",
        "imported_func",
        FuncType::new([ValType::I32], []),
        move |_caller, args| {
            let arg = args.first().map_or_else(String::new, Val::to_string);
            console.log(&format!("imported_func: {arg}"));
            Ok(Vec::new())
        },
    );
    linker
}

pub fn run_add(loader: &ModuleLoader, image: &ModuleImage) -> Result<Instance, Error> {
    let mut instance = prepare(loader, image, &add_linker())?;
    let console = loader.console();

    let three = loader.invoke(&mut instance, "add", &[Val::I32(1), Val::I32(2)])?;
    console.log(&join(&three));
    let five = loader.invoke(&mut instance, "addTwo", &[Val::I32(2), Val::I32(3)])?;
    console.log(&join(&five));
    Ok(instance)
}

pub fn run_mem(loader: &ModuleLoader, image: &ModuleImage) -> Result<Instance, Error> {
    let (linker, _memory) = mem_linker(loader.console());
    let mut instance = prepare(loader, image, &linker)?;
    loader.invoke(&mut instance, "hi", &[])?;
    Ok(instance)
}

pub fn run_start(loader: &ModuleLoader, image: &ModuleImage) -> Result<Instance, Error> {
    let mut instance = prepare(loader, image, &start_linker(loader.console()))?;
    loader.invoke(&mut instance, "exported_func", &[])?;
    Ok(instance)
}

fn prepare(loader: &ModuleLoader, image: &ModuleImage, linker: &Linker) -> Result<Instance, Error> {
    let console = loader.console();
    console.log(&format!("valid: {}", loader.validate(image)));

    let instance = loader.instantiate(image, linker)?;
    console.log(&format!("{instance:?}"));
    let names: Vec<_> = instance.exports().map(|export| export.name()).collect();
    console.log(&format!("exports: {}", names.join(", ")));
    Ok(instance)
}

fn join(vals: &[Val]) -> String {
    vals.iter()
        .map(Val::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
