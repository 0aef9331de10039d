use std::path::PathBuf;

use crate::interpreter::Trap;

/// Errors surfaced while loading, linking, instantiating or invoking a
/// module.
#[derive(Debug)]
pub enum Error {
    /// The module file is missing or unreadable.
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The bytes are not a module this runtime can compile.
    Compile(String),
    /// An import is missing or does not fit its binding.
    Link(String),
    /// The start function or a data segment trapped.
    Instantiation(Trap),
    ExportNotFound(String),
    /// Arguments or results disagree with a function signature.
    TypeMismatch(String),
    /// An invoked export trapped.
    Trap(Trap),
}

impl Error {
    pub(crate) fn export_not_found(name: &str) -> Self {
        Self::ExportNotFound(format!("export `{name}` not found"))
    }

    pub(crate) fn missing_import(module: &str, name: &str) -> Self {
        Self::Link(format!("import `{module}`.`{name}` was not found"))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage { path, source } => {
                write!(f, "storage error: {}: {source}", path.display())
            }
            Error::Compile(msg) => write!(f, "compile error: {msg}"),
            Error::Link(msg) => write!(f, "link error: {msg}"),
            Error::Instantiation(trap) => write!(f, "instantiation error: {trap}"),
            Error::ExportNotFound(msg) => write!(f, "export not found: {msg}"),
            Error::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Error::Trap(trap) => write!(f, "trap: {trap}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage { source, .. } => Some(source),
            Error::Instantiation(trap) | Error::Trap(trap) => Some(trap),
            _ => None,
        }
    }
}

impl From<wasmparser::BinaryReaderError> for Error {
    fn from(err: wasmparser::BinaryReaderError) -> Self {
        Error::Compile(err.to_string())
    }
}
