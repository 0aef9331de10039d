use std::sync::Arc;

use crate::parse::{ExternKind, ParsedModule, parse};
use crate::types::ExternType;
use crate::{Engine, Error};

/// A parsed and validated WASM module (immutable).
#[derive(Debug, Clone)]
pub struct Module {
    inner: Arc<ParsedModule>,
}

impl Module {
    /// Parse a WAT string into a module.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, Error> {
        let bytes = wat::parse_str(wat).map_err(|err| Error::Compile(err.to_string()))?;
        Self::from_bytes(engine, &bytes)
    }

    /// Create a module from raw WASM bytes.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, Error> {
        let parsed = parse(engine, bytes)?;
        tracing::debug!(
            imports = parsed.imports.len(),
            exports = parsed.exports.len(),
            functions = parsed.func_types.len(),
            has_start = parsed.start.is_some(),
            "compiled module"
        );
        Ok(Module {
            inner: Arc::new(parsed),
        })
    }

    pub(crate) fn parsed(&self) -> &ParsedModule {
        &self.inner
    }

    /// Imports in declaration order.
    pub fn imports(&self) -> impl Iterator<Item = ImportType<'_>> {
        self.inner.imports.iter().map(|import| ImportType {
            module: &import.module,
            name: &import.name,
            ty: &import.ty,
        })
    }

    /// Exports in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = ExportType<'_>> {
        let module = &*self.inner;
        module.exports.iter().filter_map(move |export| {
            let ty = match export.kind {
                ExternKind::Func => ExternType::Func(module.func_type(export.index)?.clone()),
                ExternKind::Memory => ExternType::Memory(module.memory?),
                ExternKind::Global => {
                    ExternType::Global(*module.global_types.get(export.index as usize)?)
                }
            };
            Some(ExportType {
                name: &export.name,
                ty,
            })
        })
    }

    /// Whether instantiation runs a start function.
    pub fn has_start(&self) -> bool {
        self.inner.start.is_some()
    }
}

/// A declared import: namespace, name and expected type.
#[derive(Debug, Clone)]
pub struct ImportType<'a> {
    module: &'a str,
    name: &'a str,
    ty: &'a ExternType,
}

impl<'a> ImportType<'a> {
    pub fn module(&self) -> &'a str {
        self.module
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn ty(&self) -> &'a ExternType {
        self.ty
    }
}

/// An export name and its type.
#[derive(Debug, Clone)]
pub struct ExportType<'a> {
    name: &'a str,
    ty: ExternType,
}

impl<'a> ExportType<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn ty(&self) -> &ExternType {
        &self.ty
    }
}
