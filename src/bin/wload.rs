use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use wload::logging::{LogFormat, LogLevel, LogOptions, init_logging};
use wload::{Config, Engine, Linker, ModuleImage, ModuleLoader, Val, demos};

#[derive(Parser)]
#[command(name = "wload", about = "Load, instantiate and invoke WebAssembly modules")]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalOptions {
    /// Refuse to instantiate modules that fail validation.
    #[arg(long, global = true)]
    validate_strict: bool,
    /// Instruction budget per call.
    #[arg(long, global = true)]
    fuel: Option<u64>,
    /// Deepest allowed wasm call nesting.
    #[arg(long, global = true)]
    max_call_depth: Option<u32>,
    /// Treat the input as WebAssembly text (implied by a `.wat` extension).
    #[arg(long, global = true)]
    text: bool,
    /// error, warn, info, debug, trace or off. Defaults to $WLOAD_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// text or json. Defaults to $WLOAD_LOG_FORMAT.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke an exported function.
    Run {
        file: PathBuf,
        export: String,
        /// Arguments such as `1`, `2i64`, `1.5f32` or `0.25`.
        args: Vec<String>,
    },
    /// List a module's imports and exports.
    Inspect { file: PathBuf },
    /// Run `add(1, 2)` and `addTwo(2, 3)`.
    Add { file: PathBuf },
    /// Run `hi` with a shared memory and a logging import.
    Mem { file: PathBuf },
    /// Instantiate a module whose start function calls an import.
    Start { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = &cli.options;
    init_logging(&LogOptions::from_env().with(options.log_format, options.log_level));

    let defaults = Config::default();
    let engine = Engine::new(Config {
        strict_validation: options.validate_strict,
        max_call_depth: options.max_call_depth.unwrap_or(defaults.max_call_depth),
        fuel: options.fuel,
    });
    let loader = ModuleLoader::with_fs(engine);

    match &cli.command {
        Command::Run { file, export, args } => {
            let image = read_image(&loader, file, options.text)?;
            run(&loader, &image, export, args)
        }
        Command::Inspect { file } => inspect(&loader, &read_image(&loader, file, options.text)?),
        Command::Add { file } => {
            demos::run_add(&loader, &read_image(&loader, file, options.text)?)?;
            Ok(())
        }
        Command::Mem { file } => {
            demos::run_mem(&loader, &read_image(&loader, file, options.text)?)?;
            Ok(())
        }
        Command::Start { file } => {
            demos::run_start(&loader, &read_image(&loader, file, options.text)?)?;
            Ok(())
        }
    }
}

fn read_image(loader: &ModuleLoader, path: &Path, text: bool) -> anyhow::Result<ModuleImage> {
    let image = loader.load(path)?;
    let is_wat = path.extension().is_some_and(|ext| ext == "wat");
    if text || is_wat {
        return Ok(image.assemble()?);
    }
    Ok(image)
}

fn run(
    loader: &ModuleLoader,
    image: &ModuleImage,
    export: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let args = args
        .iter()
        .map(|arg| Val::parse_literal(arg).with_context(|| format!("invalid argument `{arg}`")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let linker = Linker::new();
    let mut instance = loader.instantiate(image, &linker)?;
    let results = loader.invoke(&mut instance, export, &args)?;
    for val in results {
        println!("{val}");
    }
    Ok(())
}

fn inspect(loader: &ModuleLoader, image: &ModuleImage) -> anyhow::Result<()> {
    println!("valid: {}", loader.validate(image));
    let module = match loader.compile(image) {
        Ok(module) => module,
        Err(err) => bail!("{}: {err}", image.path().display()),
    };
    for import in module.imports() {
        println!(
            "import {}.{}: {}",
            import.module(),
            import.name(),
            import.ty()
        );
    }
    for export in module.exports() {
        println!("export {}: {}", export.name(), export.ty());
    }
    if module.has_start() {
        println!("start function present");
    }
    Ok(())
}
