mod exec;
mod ops;

use std::fmt;

pub(crate) use exec::{Context, Executor, Limits};

/// Abnormal termination of WASM execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    Unreachable,
    MemoryOutOfBounds,
    IntegerDivideByZero,
    IntegerOverflow,
    InvalidConversionToInteger,
    CallStackExhausted,
    OutOfFuel,
    /// Raised by a host function.
    Host(String),
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::Unreachable => f.write_str("unreachable"),
            Trap::MemoryOutOfBounds => f.write_str("out of bounds memory access"),
            Trap::IntegerDivideByZero => f.write_str("integer divide by zero"),
            Trap::IntegerOverflow => f.write_str("integer overflow"),
            Trap::InvalidConversionToInteger => f.write_str("invalid conversion to integer"),
            Trap::CallStackExhausted => f.write_str("call stack exhausted"),
            Trap::OutOfFuel => f.write_str("all fuel consumed"),
            Trap::Host(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Trap {}
