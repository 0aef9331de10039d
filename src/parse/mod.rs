pub(crate) mod instr;

use wasmparser::{
    DataKind, Encoding, ExternalKind, FunctionBody, Operator, Parser, Payload, TypeRef, ValType,
};

use crate::types::{ExternType, FuncType, GlobalType, MemoryType};
use crate::{Engine, Error, Val};
use instr::{Instruction, decode_op, resolve_block_targets};

/// A declared import.
#[derive(Debug, Clone)]
pub(crate) struct Import {
    pub(crate) module: String,
    pub(crate) name: String,
    pub(crate) ty: ExternType,
}

/// What an export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Func,
    Memory,
    Global,
}

#[derive(Debug, Clone)]
pub(crate) struct Export {
    pub(crate) name: String,
    pub(crate) kind: ExternKind,
    pub(crate) index: u32,
}

/// A constant initializer expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    GlobalGet(u32),
}

impl ConstExpr {
    pub(crate) fn eval(&self, globals: &[Val]) -> Option<Val> {
        Some(match *self {
            ConstExpr::I32(v) => Val::I32(v),
            ConstExpr::I64(v) => Val::I64(v),
            ConstExpr::F32(bits) => Val::F32(f32::from_bits(bits)),
            ConstExpr::F64(bits) => Val::F64(f64::from_bits(bits)),
            ConstExpr::GlobalGet(idx) => *globals.get(idx as usize)?,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GlobalDef {
    pub(crate) init: ConstExpr,
}

#[derive(Debug, Clone)]
pub(crate) struct DataSegment {
    pub(crate) offset: ConstExpr,
    pub(crate) bytes: Box<[u8]>,
}

/// A module-defined function.
#[derive(Debug, Clone)]
pub(crate) struct FuncBody {
    /// Params followed by body-declared locals.
    pub(crate) locals: Box<[ValType]>,
    pub(crate) code: Box<[Instruction]>,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedModule {
    pub(crate) types: Vec<FuncType>,
    pub(crate) imports: Vec<Import>,
    /// Type index of every function, imports first.
    pub(crate) func_types: Vec<u32>,
    pub(crate) num_func_imports: u32,
    pub(crate) bodies: Vec<FuncBody>,
    /// Limits of the single memory, imported or defined.
    pub(crate) memory: Option<MemoryType>,
    pub(crate) memory_imported: bool,
    /// Type of every global, imports first.
    pub(crate) global_types: Vec<GlobalType>,
    pub(crate) globals: Vec<GlobalDef>,
    pub(crate) exports: Vec<Export>,
    pub(crate) data: Vec<DataSegment>,
    pub(crate) start: Option<u32>,
}

impl ParsedModule {
    pub(crate) fn func_type(&self, func_idx: u32) -> Option<&FuncType> {
        let type_idx = *self.func_types.get(func_idx as usize)?;
        self.types.get(type_idx as usize)
    }

    pub(crate) fn body(&self, func_idx: u32) -> Option<&FuncBody> {
        let local = func_idx.checked_sub(self.num_func_imports)?;
        self.bodies.get(local as usize)
    }
}

pub(crate) fn parse(engine: &Engine, bytes: &[u8]) -> Result<ParsedModule, Error> {
    engine.new_validator().validate_all(bytes)?;

    let mut module = ParsedModule::default();
    for payload in Parser::new(0).parse_all(bytes) {
        process_payload(&mut module, payload?)?;
    }
    Ok(module)
}

fn process_payload(module: &mut ParsedModule, payload: Payload) -> Result<(), Error> {
    match payload {
        Payload::Version {
            encoding: Encoding::Component,
            ..
        } => return Err(Error::Compile("components are not supported".into())),
        Payload::TypeSection(reader) => {
            for ty in reader.into_iter_err_on_gc_types() {
                let ty = ty?;
                for val_ty in ty.params().iter().chain(ty.results()) {
                    supported(*val_ty)?;
                }
                module.types.push(FuncType::from(&ty));
            }
        }
        Payload::ImportSection(reader) => {
            for import in reader {
                let import = import?;
                let ty = match import.ty {
                    TypeRef::Func(type_idx) => {
                        module.func_types.push(type_idx);
                        module.num_func_imports += 1;
                        let ty = module.types.get(type_idx as usize).ok_or_else(|| {
                            Error::Compile(format!("type index {type_idx} out of bounds"))
                        })?;
                        ExternType::Func(ty.clone())
                    }
                    TypeRef::Memory(ty) => {
                        let ty = memory_type(module, ty)?;
                        module.memory_imported = true;
                        ExternType::Memory(ty)
                    }
                    TypeRef::Global(ty) => {
                        let ty = GlobalType {
                            content: supported(ty.content_type)?,
                            mutable: ty.mutable,
                        };
                        module.global_types.push(ty);
                        ExternType::Global(ty)
                    }
                    other => {
                        return Err(Error::Compile(format!(
                            "import `{}`.`{}`: unsupported import kind {other:?}",
                            import.module, import.name
                        )));
                    }
                };
                module.imports.push(Import {
                    module: import.module.to_string(),
                    name: import.name.to_string(),
                    ty,
                });
            }
        }
        Payload::FunctionSection(reader) => {
            for type_idx in reader {
                module.func_types.push(type_idx?);
            }
        }
        Payload::MemorySection(reader) => {
            for ty in reader {
                memory_type(module, ty?)?;
            }
        }
        Payload::GlobalSection(reader) => {
            for global in reader {
                let global = global?;
                let ty = GlobalType {
                    content: supported(global.ty.content_type)?,
                    mutable: global.ty.mutable,
                };
                module.global_types.push(ty);
                module.globals.push(GlobalDef {
                    init: const_expr(&global.init_expr)?,
                });
            }
        }
        Payload::ExportSection(reader) => {
            for export in reader {
                let export = export?;
                let kind = match export.kind {
                    ExternalKind::Func => ExternKind::Func,
                    ExternalKind::Memory => ExternKind::Memory,
                    ExternalKind::Global => ExternKind::Global,
                    // Tables are never read by the interpreter.
                    _ => continue,
                };
                module.exports.push(Export {
                    name: export.name.to_string(),
                    kind,
                    index: export.index,
                });
            }
        }
        Payload::StartSection { func, .. } => module.start = Some(func),
        Payload::DataSection(reader) => {
            for data in reader {
                let data = data?;
                // Passive segments are only reachable through memory.init,
                // which is rejected at decode time.
                if let DataKind::Active { offset_expr, .. } = data.kind {
                    module.data.push(DataSegment {
                        offset: const_expr(&offset_expr)?,
                        bytes: data.data.into(),
                    });
                }
            }
        }
        Payload::CodeSectionEntry(body) => {
            let func_idx = module.num_func_imports as usize + module.bodies.len();
            let body = parse_body(module, func_idx, body)?;
            module.bodies.push(body);
        }
        _ => {}
    }
    Ok(())
}

fn parse_body(
    module: &ParsedModule,
    func_idx: usize,
    body: FunctionBody,
) -> Result<FuncBody, Error> {
    let type_idx = *module
        .func_types
        .get(func_idx)
        .ok_or_else(|| Error::Compile(format!("function {func_idx} has no type")))?;
    let ty = module
        .types
        .get(type_idx as usize)
        .ok_or_else(|| Error::Compile(format!("type index {type_idx} out of bounds")))?;

    let mut locals: Vec<ValType> = ty.params().to_vec();
    for local in body.get_locals_reader()? {
        let (count, ty) = local?;
        let ty = supported(ty)?;
        locals.extend(std::iter::repeat_n(ty, count as usize));
    }

    let mut code = Vec::new();
    for op in body.get_operators_reader()? {
        code.push(decode_op(&op?, &module.types)?);
    }
    resolve_block_targets(&mut code);

    Ok(FuncBody {
        locals: locals.into(),
        code: code.into(),
    })
}

fn memory_type(
    module: &mut ParsedModule,
    ty: wasmparser::MemoryType,
) -> Result<MemoryType, Error> {
    if module.memory.is_some() {
        return Err(Error::Compile("multiple memories are not supported".into()));
    }
    if ty.memory64 || ty.shared {
        return Err(Error::Compile(
            "64-bit and shared memories are not supported".into(),
        ));
    }
    let ty = MemoryType {
        initial: ty.initial as u32,
        maximum: ty.maximum.map(|max| max as u32),
    };
    module.memory = Some(ty);
    Ok(ty)
}

fn const_expr(expr: &wasmparser::ConstExpr) -> Result<ConstExpr, Error> {
    let mut reader = expr.get_operators_reader();
    Ok(match reader.read()? {
        Operator::I32Const { value } => ConstExpr::I32(value),
        Operator::I64Const { value } => ConstExpr::I64(value),
        Operator::F32Const { value } => ConstExpr::F32(value.bits()),
        Operator::F64Const { value } => ConstExpr::F64(value.bits()),
        Operator::GlobalGet { global_index } => ConstExpr::GlobalGet(global_index),
        op => {
            return Err(Error::Compile(format!(
                "unsupported constant expression {op:?}"
            )));
        }
    })
}

fn supported(ty: ValType) -> Result<ValType, Error> {
    match ty {
        ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64 => Ok(ty),
        other => Err(Error::Compile(format!("unsupported value type {other}"))),
    }
}
