use wload::demos::{self, mem_linker};
use wload::{BufferConsole, Engine, Linker, MemoryStorage, ModuleLoader};

const ADD_WAT: &str = include_str!("../demos/add.wat");
const MEM_WAT: &str = include_str!("../demos/mem.wat");
const START_WAT: &str = include_str!("../demos/start.wat");

fn loader_for(path: &str, wat: &str) -> (ModuleLoader, BufferConsole) {
    let mut storage = MemoryStorage::new();
    storage.insert(path, wat::parse_str(wat).unwrap());
    let console = BufferConsole::new();
    (
        ModuleLoader::new(Engine::default(), storage, console.clone()),
        console,
    )
}

#[test]
fn add_demo_reports_both_sums() -> Result<(), anyhow::Error> {
    let (loader, console) = loader_for("add.wasm", ADD_WAT);
    let image = loader.load("add.wasm")?;
    demos::run_add(&loader, &image)?;

    let lines = console.lines();
    assert_eq!(lines[0], "valid: true");
    assert!(lines[1].starts_with("Instance {"), "{}", lines[1]);
    assert_eq!(lines[2], "exports: add, addTwo");
    assert_eq!(lines[3..], ["3", "5"]);
    Ok(())
}

#[test]
fn mem_demo_logs_from_shared_memory() -> Result<(), anyhow::Error> {
    let (loader, console) = loader_for("mem.wasm", MEM_WAT);
    let image = loader.load("mem.wasm")?;
    demos::run_mem(&loader, &image)?;

    let lines = console.lines();
    assert_eq!(lines[0], "valid: true");
    assert_eq!(lines[2], "exports: hi");
    assert_eq!(lines.last().map(String::as_str), Some("hi"));
    Ok(())
}

#[test]
fn mem_writes_are_visible_to_the_host() -> Result<(), anyhow::Error> {
    let (loader, console) = loader_for("mem.wasm", MEM_WAT);
    let image = loader.load("mem.wasm")?;
    let (linker, memory) = mem_linker(loader.console());
    let mut instance = loader.instantiate(&image, &linker)?;

    assert_eq!(memory.data()[..2], [0, 0]);
    assert!(loader.invoke(&mut instance, "hi", &[])?.is_empty());
    assert_eq!(memory.data()[..2], *b"hi");
    assert_eq!(console.lines(), ["hi"]);
    Ok(())
}

#[test]
fn mem_demo_without_bindings_fails_to_link() -> Result<(), anyhow::Error> {
    let (loader, _) = loader_for("mem.wasm", MEM_WAT);
    let image = loader.load("mem.wasm")?;
    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert!(matches!(err, wload::Error::Link(_)), "{err}");
    Ok(())
}

#[test]
fn start_demo_calls_import_from_start_and_export() -> Result<(), anyhow::Error> {
    let (loader, console) = loader_for("start.wasm", START_WAT);
    let image = loader.load("start.wasm")?;
    let mut instance = demos::run_start(&loader, &image)?;

    let lines = console.lines();
    assert_eq!(lines[0], "valid: true");
    assert_eq!(lines[1], "imported_func: 42");
    assert_eq!(lines[3], "exports: exported_func");
    assert_eq!(lines[4], "imported_func: 42");

    assert!(loader.invoke(&mut instance, "exported_func", &[])?.is_empty());
    assert_eq!(console.lines().len(), 6);
    Ok(())
}
