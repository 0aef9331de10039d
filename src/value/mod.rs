use std::fmt;

use wasmparser::ValType;

use crate::Error;

/// Dynamic WASM value for untyped function calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Val {
    pub fn ty(&self) -> ValType {
        match self {
            Val::I32(_) => ValType::I32,
            Val::I64(_) => ValType::I64,
            Val::F32(_) => ValType::F32,
            Val::F64(_) => ValType::F64,
        }
    }

    /// Pack into a raw u64 slot of the untyped operand stack.
    #[inline(always)]
    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Val::I32(v) => v as u32 as u64,
            Val::I64(v) => v as u64,
            Val::F32(v) => v.to_bits() as u64,
            Val::F64(v) => v.to_bits(),
        }
    }

    /// Interpret a raw stack slot according to `ty`.
    #[inline(always)]
    pub(crate) fn from_bits(bits: u64, ty: ValType) -> Val {
        match ty {
            ValType::I32 => Val::I32(bits as i32),
            ValType::I64 => Val::I64(bits as i64),
            ValType::F32 => Val::F32(f32::from_bits(bits as u32)),
            // Validation rejects modules using other types.
            _ => Val::F64(f64::from_bits(bits)),
        }
    }

    /// Parse a CLI literal: `7`, `7i64`, `1.5f32`, `1.5f64`. Plain
    /// integers are i32, plain decimals are f64.
    pub fn parse_literal(text: &str) -> Option<Val> {
        if let Some(v) = text.strip_suffix("i32") {
            return v.parse().ok().map(Val::I32);
        }
        if let Some(v) = text.strip_suffix("i64") {
            return v.parse().ok().map(Val::I64);
        }
        if let Some(v) = text.strip_suffix("f32") {
            return v.parse().ok().map(Val::F32);
        }
        if let Some(v) = text.strip_suffix("f64") {
            return v.parse().ok().map(Val::F64);
        }
        if let Ok(v) = text.parse::<i32>() {
            return Some(Val::I32(v));
        }
        text.parse().ok().map(Val::F64)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::I32(v) => write!(f, "{v}"),
            Val::I64(v) => write!(f, "{v}"),
            Val::F32(v) => write!(f, "{v}"),
            Val::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Convert a single Rust value to/from a `Val`.
pub trait WasmVal: Sized {
    fn to_val(&self) -> Val;
    fn from_val(val: &Val) -> Result<Self, Error>;
}

macro_rules! impl_wasm_val {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl WasmVal for $ty {
                fn to_val(&self) -> Val {
                    Val::$variant(*self)
                }
                fn from_val(val: &Val) -> Result<Self, Error> {
                    match val {
                        Val::$variant(v) => Ok(*v),
                        _ => Err(Error::TypeMismatch(format!(
                            "expected {}, got {}",
                            stringify!($ty),
                            val.ty()
                        ))),
                    }
                }
            }
        )*
    };
}

impl_wasm_val!(i32 => I32, i64 => I64, f32 => F32, f64 => F64);

/// Convert Rust types into WASM call arguments.
pub trait WasmArgs {
    fn to_vals(&self) -> Vec<Val>;
}

/// Convert WASM results back into Rust types.
pub trait WasmResults: Sized {
    fn from_vals(vals: &[Val]) -> Result<Self, Error>;
}

impl WasmArgs for () {
    fn to_vals(&self) -> Vec<Val> {
        vec![]
    }
}

impl WasmResults for () {
    fn from_vals(vals: &[Val]) -> Result<Self, Error> {
        if !vals.is_empty() {
            return Err(Error::TypeMismatch(format!(
                "expected no results, got {}",
                vals.len()
            )));
        }
        Ok(())
    }
}

macro_rules! impl_wasm_tuples {
    ($(($($T:ident),+)),* $(,)?) => {
        $(
            impl<$($T: WasmVal),+> WasmArgs for ($($T,)+) {
                #[allow(non_snake_case)]
                fn to_vals(&self) -> Vec<Val> {
                    let ($($T,)+) = self;
                    vec![$($T.to_val()),+]
                }
            }

            impl<$($T: WasmVal),+> WasmResults for ($($T,)+) {
                #[allow(non_snake_case)]
                fn from_vals(vals: &[Val]) -> Result<Self, Error> {
                    impl_wasm_tuples!(@destructure vals, $($T),+)
                }
            }
        )*
    };

    (@destructure $vals:ident, $($T:ident),+) => {{
        let expected = impl_wasm_tuples!(@count $($T),+);
        if $vals.len() != expected {
            return Err(Error::TypeMismatch(format!(
                "expected {} results, got {}",
                expected,
                $vals.len()
            )));
        }
        let mut _i = 0;
        Ok(($({
            let v = $T::from_val(&$vals[_i])?;
            _i += 1;
            v
        },)+))
    }};

    (@count $($T:ident),+) => {
        <[()]>::len(&[$(impl_wasm_tuples!(@unit $T)),+])
    };

    (@unit $T:ident) => { () };
}

impl_wasm_tuples!(
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
    (A, B, C, D, E),
    (A, B, C, D, E, F),
    (A, B, C, D, E, F, G),
    (A, B, C, D, E, F, G, H),
);
