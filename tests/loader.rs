use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use wload::types::FuncType;
use wload::{
    BufferConsole, Config, Console, Engine, Error, Instance, Linker, MemoryStorage, ModuleImage,
    ModuleLoader, Trap, Val, ValType,
};

const ADD: &str = r#"
    (module
        (func $add (export "add") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add)
        (func (export "addTwo") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            call $add))
"#;

fn loader_with(config: Config, files: &[(&str, &str)]) -> (ModuleLoader, BufferConsole) {
    let mut storage = MemoryStorage::new();
    for (path, wat) in files {
        storage.insert(*path, wat::parse_str(wat).unwrap());
    }
    let console = BufferConsole::new();
    let loader = ModuleLoader::new(Engine::new(config), storage, console.clone());
    (loader, console)
}

fn loader(files: &[(&str, &str)]) -> (ModuleLoader, BufferConsole) {
    loader_with(Config::default(), files)
}

fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(output) => output,
        Poll::Pending => panic!("instantiation did not complete on first poll"),
    }
}

#[test]
fn module_without_imports_validates_and_instantiates() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[("add.wasm", ADD)]);
    let image = loader.load("add.wasm")?;
    assert!(loader.validate(&image));
    let instance = loader.instantiate(&image, &Linker::new())?;
    let exports: Vec<_> = instance.exports().map(|e| e.name()).collect();
    assert_eq!(exports, ["add", "addTwo"]);
    Ok(())
}

#[test]
fn add_then_add_two() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[("add.wasm", ADD)]);
    let image = loader.load("add.wasm")?;
    let mut instance = loader.instantiate(&image, &Linker::new())?;

    let sum = loader.invoke(&mut instance, "add", &[Val::I32(1), Val::I32(2)])?;
    assert_eq!(sum, [Val::I32(3)]);
    let sum = loader.invoke(&mut instance, "addTwo", &[Val::I32(2), Val::I32(3)])?;
    assert_eq!(sum, [Val::I32(5)]);

    let (typed,): (i32,) = instance.call("add", (40, 2))?;
    assert_eq!(typed, 42);
    Ok(())
}

#[test]
fn unknown_export_leaves_instance_usable() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[("add.wasm", ADD)]);
    let image = loader.load("add.wasm")?;
    let mut instance = loader.instantiate(&image, &Linker::new())?;

    let err = loader.invoke(&mut instance, "sub", &[]).unwrap_err();
    assert!(matches!(err, Error::ExportNotFound(_)), "{err}");
    assert_eq!(err.to_string(), "export not found: export `sub` not found");

    let sum = loader.invoke(&mut instance, "add", &[Val::I32(1), Val::I32(2)])?;
    assert_eq!(sum, [Val::I32(3)]);
    Ok(())
}

#[test]
fn argument_mismatch_is_type_error() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[("add.wasm", ADD)]);
    let image = loader.load("add.wasm")?;
    let mut instance = loader.instantiate(&image, &Linker::new())?;

    let err = loader.invoke(&mut instance, "add", &[Val::I32(1)]).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");
    let err = loader
        .invoke(&mut instance, "add", &[Val::I32(1), Val::I64(2)])
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");

    let err = instance.call::<(i32, i32), (i64,)>("add", (1, 2)).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)), "{err}");
    Ok(())
}

#[test]
fn missing_import_is_link_error() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "needs.wasm",
        r#"(module (import "env" "f" (func (param i32))))"#,
    )]);
    let image = loader.load("needs.wasm")?;
    assert!(loader.validate(&image));

    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert!(matches!(err, Error::Link(_)), "{err}");
    assert!(err.to_string().contains("`env`.`f`"), "{err}");
    Ok(())
}

#[test]
fn mismatched_import_signature_is_link_error() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "needs.wasm",
        r#"(module (import "env" "f" (func (param i32))))"#,
    )]);
    let image = loader.load("needs.wasm")?;

    let mut linker = Linker::new();
    linker.func_new("env", "f", FuncType::new([ValType::I64], []), |_, _| {
        Ok(Vec::new())
    });
    let err = loader.instantiate(&image, &linker).unwrap_err();
    assert!(matches!(err, Error::Link(_)), "{err}");

    let mut linker = Linker::new();
    linker.define("env", "f", Val::I32(1));
    let err = loader.instantiate(&image, &linker).unwrap_err();
    assert!(matches!(err, Error::Link(_)), "{err}");
    Ok(())
}

#[test]
fn start_function_runs_during_instantiation() -> Result<(), anyhow::Error> {
    let (loader, console) = loader(&[(
        "start.wasm",
        r#"
        (module
            (import "env" "note" (func $note (param i32)))
            (func $main i32.const 7 call $note)
            (start $main))
        "#,
    )]);
    let image = loader.load("start.wasm")?;

    let log = loader.console();
    let mut linker = Linker::new();
    linker.func_new("env", "note", FuncType::new([ValType::I32], []), move |_, args| {
        log.log(&format!("note {}", args[0]));
        Ok(Vec::new())
    });
    loader.instantiate(&image, &linker)?;
    assert_eq!(console.lines(), ["note 7"]);
    Ok(())
}

#[test]
fn start_trap_is_instantiation_error() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "trap.wasm",
        r#"(module (func $boom unreachable) (start $boom))"#,
    )]);
    let image = loader.load("trap.wasm")?;
    assert!(loader.validate(&image));

    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert!(
        matches!(err, Error::Instantiation(Trap::Unreachable)),
        "{err}"
    );
    Ok(())
}

#[test]
fn out_of_bounds_data_segment_is_instantiation_error() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "data.wasm",
        r#"(module (memory 1) (data (i32.const 65535) "ab"))"#,
    )]);
    let image = loader.load("data.wasm")?;
    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert!(
        matches!(err, Error::Instantiation(Trap::MemoryOutOfBounds)),
        "{err}"
    );
    Ok(())
}

#[test]
fn trap_in_export_is_reported_and_instance_survives() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "div.wasm",
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s))
        "#,
    )]);
    let image = loader.load("div.wasm")?;
    let mut instance = loader.instantiate(&image, &Linker::new())?;

    let err = loader
        .invoke(&mut instance, "div", &[Val::I32(1), Val::I32(0)])
        .unwrap_err();
    assert!(
        matches!(err, Error::Trap(Trap::IntegerDivideByZero)),
        "{err}"
    );
    assert_eq!(err.to_string(), "trap: integer divide by zero");

    let quotient = loader.invoke(&mut instance, "div", &[Val::I32(9), Val::I32(3)])?;
    assert_eq!(quotient, [Val::I32(3)]);
    Ok(())
}

#[test]
fn malformed_bytes_fail_validation_and_compile() -> Result<(), anyhow::Error> {
    let mut storage = MemoryStorage::new();
    storage.insert("junk.wasm", b"\0asm\x02\0\0\0garbage".to_vec());
    let loader = ModuleLoader::new(Engine::default(), storage, BufferConsole::new());
    let image = loader.load("junk.wasm")?;

    assert!(!loader.validate(&image));
    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert!(matches!(err, Error::Compile(_)), "{err}");
    Ok(())
}

#[test]
fn strict_validation_reports_the_image_path() -> Result<(), anyhow::Error> {
    let mut storage = MemoryStorage::new();
    storage.insert("junk.wasm", b"not wasm".to_vec());
    let config = Config {
        strict_validation: true,
        ..Config::default()
    };
    let loader = ModuleLoader::new(Engine::new(config), storage, BufferConsole::new());
    let image = loader.load("junk.wasm")?;

    let err = loader.instantiate(&image, &Linker::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "compile error: junk.wasm: module failed validation"
    );
    Ok(())
}

#[test]
fn missing_file_is_storage_error() {
    let (loader, _) = loader(&[]);
    let err = loader.load("absent.wasm").unwrap_err();
    assert!(matches!(err, Error::Storage { .. }), "{err}");
    assert!(err.to_string().contains("absent.wasm"), "{err}");
}

#[test]
fn loads_from_the_filesystem() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("add.wasm");
    std::fs::write(&path, wat::parse_str(ADD)?)?;

    let loader = ModuleLoader::with_fs(Engine::default());
    let image = loader.load(&path)?;
    assert_eq!(image.path(), path);
    let mut instance = loader.instantiate(&image, &Linker::new())?;
    assert_eq!(instance.call::<_, (i32,)>("add", (2, 2))?, (4,));
    Ok(())
}

#[test]
fn text_images_assemble_before_instantiation() -> Result<(), anyhow::Error> {
    let image = ModuleImage::new("add.wat", ADD.as_bytes().to_vec());
    let loader = ModuleLoader::new(Engine::default(), MemoryStorage::new(), BufferConsole::new());
    assert!(!loader.validate(&image));

    let image = image.assemble()?;
    assert!(loader.validate(&image));
    loader.instantiate(&image, &Linker::new())?;

    let err = ModuleImage::new("bad.wat", b"(module (func".to_vec())
        .assemble()
        .unwrap_err();
    assert!(matches!(err, Error::Compile(_)), "{err}");
    Ok(())
}

#[test]
fn future_and_callback_forms_match_sync() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[("add.wasm", ADD)]);
    let image = loader.load("add.wasm")?;
    let linker = Linker::new();

    let mut from_future = block_on(loader.instantiate_async(image.clone(), &linker))?;
    assert_eq!(from_future.call::<_, (i32,)>("addTwo", (2, 3))?, (5,));

    let mut from_callback: Option<Result<Instance, Error>> = None;
    loader.instantiate_then(&image, &linker, |result| from_callback = Some(result));
    let mut instance = from_callback.expect("callback ran")?;
    assert_eq!(instance.call::<_, (i32,)>("addTwo", (2, 3))?, (5,));

    let mut failed = None;
    loader.instantiate_then(&image, &linker, |result| failed = Some(result.is_err()));
    assert_eq!(failed, Some(false));
    Ok(())
}

#[test]
fn future_reports_errors() -> Result<(), anyhow::Error> {
    let (loader, _) = loader(&[(
        "needs.wasm",
        r#"(module (import "env" "f" (func)))"#,
    )]);
    let image = loader.load("needs.wasm")?;
    let linker = Linker::new();
    let err = block_on(loader.instantiate_async(image, &linker)).unwrap_err();
    assert!(matches!(err, Error::Link(_)), "{err}");
    Ok(())
}

#[test]
fn fuel_bounds_each_call() -> Result<(), anyhow::Error> {
    let config = Config {
        fuel: Some(1_000),
        ..Config::default()
    };
    let (loader, _) = loader_with(
        config,
        &[(
            "spin.wasm",
            r#"
            (module
                (func (export "spin") (loop $l br $l))
                (func (export "one") (result i32) i32.const 1))
            "#,
        )],
    );
    let image = loader.load("spin.wasm")?;
    let mut instance = loader.instantiate(&image, &Linker::new())?;

    let err = loader.invoke(&mut instance, "spin", &[]).unwrap_err();
    assert!(matches!(err, Error::Trap(Trap::OutOfFuel)), "{err}");
    assert_eq!(loader.invoke(&mut instance, "one", &[])?, [Val::I32(1)]);
    Ok(())
}
