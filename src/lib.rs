mod engine;
mod error;
mod func;
mod instance;
mod interpreter;
mod linker;
mod memory;
mod module;
mod parse;
mod value;

pub mod console;
pub mod demos;
pub mod loader;
pub mod logging;
pub mod storage;
pub mod types;

pub use console::{BufferConsole, Console, StdoutConsole};
pub use engine::{Config, DEFAULT_MAX_CALL_DEPTH, Engine};
pub use error::Error;
pub use func::{Caller, Func};
pub use instance::Instance;
pub use interpreter::Trap;
pub use linker::{Extern, Linker};
pub use loader::{Instantiation, ModuleImage, ModuleLoader};
pub use memory::{MAX_PAGES, Memory, PAGE_SIZE};
pub use module::{ExportType, ImportType, Module};
pub use parse::ExternKind;
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use value::{Val, WasmArgs, WasmResults, WasmVal};
pub use wasmparser::ValType;
